//! Chat message normalizer.
//!
//! Replaces links and mention tokens with short spoken placeholders, folds line
//! breaks into sentence breaks and strips emoji so speech engines never read
//! markup aloud. Pure and deterministic: no I/O, no shared state.

use std::sync::LazyLock;

use regex::Regex;

/// Messages starting with this marker are never spoken.
pub const COMMENT_MARKER: char = '#';

/// Spoken in place of any link.
pub const URL_PLACEHOLDER: &str = "URL";

/// Spoken in place of a user mention (`<@123>`, `<@!123>`).
pub const USER_PLACEHOLDER: &str = "mention";

/// Spoken in place of a role mention (`<@&123>`).
pub const ROLE_PLACEHOLDER: &str = "role";

/// Spoken in place of a channel reference (`<#123>`).
pub const CHANNEL_PLACEHOLDER: &str = "channel";

/// Inserted where one or more line breaks separated two segments.
pub const SENTENCE_BREAK: &str = ". ";

/// A segment ending in one of these needs no inserted terminator.
const SENTENCE_END: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Appended when a message is cut at the length limit.
const TRUNCATION_SUFFIX: &str = " and so on";

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid url regex"));
static USER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@!?\d+>").expect("valid user mention regex"));
static ROLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@&\d+>").expect("valid role mention regex"));
static CHANNEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<#\d+>").expect("valid channel regex"));
static CUSTOM_EMOJI_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<a?:\w+:\d+>").expect("valid custom emoji regex"));
static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]*(?:\r\n|\r|\n)[ \t\r\n]*").expect("valid line break regex"));
static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid spaces regex"));

/// Result of normalizing one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Text ready for a speech engine (never empty).
    Speak(String),
    /// Nothing worth speaking.
    Skip,
}

impl Normalized {
    pub fn into_text(self) -> Option<String> {
        match self {
            Normalized::Speak(text) => Some(text),
            Normalized::Skip => None,
        }
    }
}

/// Message normalizer with an optional length limit.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    max_chars: Option<usize>, // Cut longer messages (None = unlimited)
}

impl Normalizer {
    /// Create a normalizer.
    ///
    /// # Arguments
    /// * `max_chars` - Maximum characters to speak, `None` or `Some(0)` for no limit
    pub fn new(max_chars: Option<usize>) -> Self {
        Self { max_chars: max_chars.filter(|&n| n > 0) }
    }

    /// Convert a raw chat message into speakable text.
    ///
    /// # Returns
    /// `Normalized::Skip` for blank messages, comments, or messages that are
    /// empty once markup and emoji are removed.
    pub fn normalize(&self, raw: &str) -> Normalized {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            return Normalized::Skip;
        }

        let text = URL_RE.replace_all(trimmed, URL_PLACEHOLDER);
        let text = CUSTOM_EMOJI_RE.replace_all(&text, "");
        let text = ROLE_RE.replace_all(&text, ROLE_PLACEHOLDER);
        let text = USER_RE.replace_all(&text, USER_PLACEHOLDER);
        let text = CHANNEL_RE.replace_all(&text, CHANNEL_PLACEHOLDER);

        let text: String = text.chars().filter(|&c| !is_emoji(c)).collect();
        let text = fold_line_breaks(&text);
        let text = SPACES_RE.replace_all(&text, " ");
        let text = text.trim();

        if text.is_empty() {
            return Normalized::Skip;
        }

        Normalized::Speak(self.truncate(text))
    }

    fn truncate(&self, text: &str) -> String {
        match self.max_chars {
            Some(limit) if text.chars().count() > limit => {
                let cut: String = text.chars().take(limit).collect();
                format!("{}{}", cut.trim_end(), TRUNCATION_SUFFIX)
            }
            _ => text.to_string(),
        }
    }
}

/// Join the non-blank lines of `text` into sentences.
fn fold_line_breaks(text: &str) -> String {
    let mut folded = String::with_capacity(text.len());
    for segment in LINE_BREAK_RE.split(text).map(str::trim).filter(|s| !s.is_empty()) {
        if !folded.is_empty() {
            folded.push_str(if folded.ends_with(&SENTENCE_END[..]) { " " } else { SENTENCE_BREAK });
        }
        folded.push_str(segment);
    }
    folded
}

/// Whether a character falls in one of the stripped emoji ranges.
fn is_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F300..=0x1F5FF   // Miscellaneous symbols and pictographs
            | 0x1F600..=0x1F64F // Emoticons
            | 0x1F680..=0x1F6FF // Transport and map
            | 0x1F900..=0x1F9FF // Supplemental symbols and pictographs
            | 0x1FA70..=0x1FAFF // Symbols and pictographs extended-A
            | 0x1F1E6..=0x1F1FF // Regional indicators (flags)
            | 0x2600..=0x26FF   // Miscellaneous symbols
            | 0x2700..=0x27BF   // Dingbats
            | 0xFE0F            // Emoji presentation selector
            | 0x200D // Zero width joiner
    )
}
