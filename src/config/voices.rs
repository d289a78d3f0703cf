//! Well-known VOICEVOX speaker styles.
//!
//! Used to label speaker ids when the service is unreachable. The live
//! `/speakers` listing always takes precedence.

use crate::tts::VoiceInfo;

/// A speaker style shipped with stock VOICEVOX.
#[derive(Debug, Clone, Copy)]
pub struct SpeakerStyle {
    pub speaker: &'static str,
    pub style: &'static str,
}

/// Styles sorted by id for binary search.
const SPEAKERS: &[(i64, SpeakerStyle)] = &[
    (0, SpeakerStyle { speaker: "四国めたん", style: "あまあま" }),
    (1, SpeakerStyle { speaker: "ずんだもん", style: "あまあま" }),
    (2, SpeakerStyle { speaker: "四国めたん", style: "ノーマル" }),
    (3, SpeakerStyle { speaker: "ずんだもん", style: "ノーマル" }),
    (4, SpeakerStyle { speaker: "四国めたん", style: "セクシー" }),
    (5, SpeakerStyle { speaker: "ずんだもん", style: "セクシー" }),
    (6, SpeakerStyle { speaker: "四国めたん", style: "ツンツン" }),
    (7, SpeakerStyle { speaker: "ずんだもん", style: "ツンツン" }),
    (8, SpeakerStyle { speaker: "春日部つむぎ", style: "ノーマル" }),
    (9, SpeakerStyle { speaker: "波音リツ", style: "ノーマル" }),
    (10, SpeakerStyle { speaker: "雨晴はう", style: "ノーマル" }),
    (11, SpeakerStyle { speaker: "玄野武宏", style: "ノーマル" }),
    (12, SpeakerStyle { speaker: "白上虎太郎", style: "ふつう" }),
    (13, SpeakerStyle { speaker: "青山龍星", style: "ノーマル" }),
    (14, SpeakerStyle { speaker: "冥鳴ひまり", style: "ノーマル" }),
    (15, SpeakerStyle { speaker: "九州そら", style: "あまあま" }),
    (16, SpeakerStyle { speaker: "九州そら", style: "ノーマル" }),
    (17, SpeakerStyle { speaker: "九州そら", style: "セクシー" }),
    (18, SpeakerStyle { speaker: "九州そら", style: "ツンツン" }),
    (19, SpeakerStyle { speaker: "九州そら", style: "ささやき" }),
    (20, SpeakerStyle { speaker: "もち子さん", style: "ノーマル" }),
    (21, SpeakerStyle { speaker: "剣崎雌雄", style: "ノーマル" }),
    (22, SpeakerStyle { speaker: "ずんだもん", style: "ささやき" }),
    (23, SpeakerStyle { speaker: "WhiteCUL", style: "ノーマル" }),
];

/// Get a well-known style by id using binary search.
pub fn get_speaker(id: i64) -> Option<&'static SpeakerStyle> {
    SPEAKERS.binary_search_by_key(&id, |(i, _)| *i).ok().map(|idx| &SPEAKERS[idx].1)
}

/// "Speaker (Style)" label for a well-known id.
pub fn speaker_label(id: i64) -> Option<String> {
    get_speaker(id).map(|s| format!("{} ({})", s.speaker, s.style))
}

/// The built-in table as voice listings.
pub fn builtin_voices() -> Vec<VoiceInfo> {
    SPEAKERS.iter().map(|(id, s)| VoiceInfo { id: id.to_string(), name: s.speaker.to_string(), style: Some(s.style.to_string()) }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_is_sorted() {
        assert!(SPEAKERS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_speaker_label() {
        assert_eq!(speaker_label(3).as_deref(), Some("ずんだもん (ノーマル)"));
        assert_eq!(speaker_label(8).as_deref(), Some("春日部つむぎ (ノーマル)"));
        assert!(speaker_label(9999).is_none());
        assert_eq!(builtin_voices().len(), SPEAKERS.len());
    }
}
