//! Fallback engine: the host operating system's built-in voice.
//!
//! Audio is captured from the speech command's stdout; nothing touches disk.
//! - Linux: `espeak-ng --stdout` (WAV stream, unwrapped to raw PCM)
//! - macOS: `say -o /dev/stdout` (AIFF)
//! - Windows: PowerShell `System.Speech` into a `MemoryStream` (WAV)

use async_trait::async_trait;
use tracing::debug;

use super::{AudioFormat, EngineKind, SpeechRequest, SynthesisResult, SynthesizeVoice, VoiceInfo, VoiceParams};
use crate::audio::util::parse_wav_header;
use crate::error::SynthesisError;
use crate::platform::{CommandSpec, Platform};

/// Sample format requested from `say`.
const SAY_DATA_FORMAT: &str = "BEI16@22050";

/// Words per minute that map to SAPI rate 0.
const SAPI_NEUTRAL_WPM: i64 = 180;

/// OS speech command wrapper.
#[derive(Debug, Clone)]
pub struct SystemEngine {
    platform: Platform,
}

impl Default for SystemEngine {
    fn default() -> Self {
        Self::new(Platform::current())
    }
}

impl SystemEngine {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Build the synthesis command for a request. Text is always sent on stdin.
    ///
    /// # Errors
    /// Returns an error on platforms without a supported speech command.
    pub fn command(&self, request: &SpeechRequest) -> Result<CommandSpec, SynthesisError> {
        let voice = request.voice();
        let text = request.text();

        let spec = match self.platform {
            Platform::Linux => {
                let amplitude = (voice.volume.clamp(0.0, 1.0) * 100.0).round() as u32;
                let mut args = vec!["--stdout".to_string(), "--stdin".into(), "-s".into(), voice.rate.to_string(), "-a".into(), amplitude.to_string()];
                if let Some(id) = &voice.voice_id {
                    args.extend(["-v".to_string(), id.clone()]);
                }
                CommandSpec::new("espeak-ng", args).with_stdin(text.as_bytes().to_vec())
            }
            Platform::MacOs => {
                let mut args = vec![
                    "-r".to_string(),
                    voice.rate.to_string(),
                    "--file-format=AIFF".into(),
                    format!("--data-format={SAY_DATA_FORMAT}"),
                    "-o".into(),
                    "/dev/stdout".into(),
                    "-f".into(),
                    "-".into(),
                ];
                if let Some(id) = &voice.voice_id {
                    args.extend(["-v".to_string(), id.clone()]);
                }
                // `say` has no volume flag; the embedded command applies to the whole utterance
                let input = if voice.volume < 1.0 { format!("[[volm {:.2}]] {}", voice.volume.clamp(0.0, 1.0), text) } else { text.to_string() };
                CommandSpec::new("say", args).with_stdin(input.into_bytes())
            }
            Platform::Windows => {
                let script = sapi_script(voice);
                CommandSpec::new("powershell", ["-NoProfile", "-NonInteractive", "-Command", script.as_str()]).with_stdin(text.as_bytes().to_vec())
            }
            Platform::Other => return Err(fail(format!("no OS speech command on {}", self.platform))),
        };

        Ok(spec)
    }

    /// Command that lists installed voices (also used as the availability probe).
    fn voices_command(&self) -> Option<CommandSpec> {
        match self.platform {
            Platform::Linux => Some(CommandSpec::new("espeak-ng", ["--voices"])),
            Platform::MacOs => Some(CommandSpec::new("say", ["-v", "?"])),
            Platform::Windows => Some(CommandSpec::new(
                "powershell",
                [
                    "-NoProfile",
                    "-NonInteractive",
                    "-Command",
                    "Add-Type -AssemblyName System.Speech; (New-Object System.Speech.Synthesis.SpeechSynthesizer).GetInstalledVoices() | ForEach-Object { $_.VoiceInfo.Name + '|' + $_.VoiceInfo.Culture }",
                ],
            )),
            Platform::Other => None,
        }
    }

    /// Wrap captured stdout into a result in the platform's output format.
    fn into_result(&self, stdout: Vec<u8>) -> Result<SynthesisResult, SynthesisError> {
        match self.platform {
            Platform::Linux => {
                // espeak-ng cannot seek stdout, so the WAV sizes are placeholders: keep only the PCM
                let layout = parse_wav_header(&stdout).map_err(|e| fail(format!("unreadable espeak-ng output: {e}")))?;
                if layout.bits_per_sample != 16 {
                    return Err(fail(format!("unexpected {}-bit espeak-ng output", layout.bits_per_sample)));
                }
                let pcm = stdout[layout.data_offset..].to_vec();
                Ok(SynthesisResult::raw_pcm(pcm, layout.sample_rate, layout.channels, EngineKind::Fallback))
            }
            Platform::MacOs => Ok(SynthesisResult::container(stdout, AudioFormat::Aiff, EngineKind::Fallback)),
            _ => Ok(SynthesisResult::container(stdout, AudioFormat::Wav, EngineKind::Fallback)),
        }
    }

    fn parse_voices(&self, listing: &str) -> Vec<VoiceInfo> {
        match self.platform {
            Platform::Linux => parse_espeak_voices(listing),
            Platform::MacOs => parse_say_voices(listing),
            _ => parse_sapi_voices(listing),
        }
    }
}

#[async_trait]
impl SynthesizeVoice for SystemEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Fallback
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SynthesisResult, SynthesisError> {
        let spec = self.command(request)?;
        debug!("Fallback engine: {}", spec.display());

        let output = spec.run().await.map_err(|e| fail(format!("failed to run {}: {e}", spec.program)))?;
        if !output.success {
            return Err(fail(format!("{} exited with an error: {}", spec.program, output.stderr)));
        }
        if output.stdout.is_empty() {
            return Err(fail(format!("{} produced no audio", spec.program)));
        }

        debug!("Fallback engine produced {} bytes", output.stdout.len());
        self.into_result(output.stdout)
    }

    async fn list_voices(&self) -> Result<Vec<VoiceInfo>, SynthesisError> {
        let spec = self.voices_command().ok_or_else(|| fail(format!("no OS speech command on {}", self.platform)))?;
        let output = spec.run().await.map_err(|e| fail(format!("failed to run {}: {e}", spec.program)))?;
        if !output.success {
            return Err(fail(format!("{} exited with an error: {}", spec.display(), output.stderr)));
        }
        Ok(self.parse_voices(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn is_available(&self) -> bool {
        match self.voices_command() {
            Some(spec) => spec.run().await.map(|out| out.success).unwrap_or(false),
            None => false,
        }
    }
}

/// PowerShell script rendering stdin text to WAV on stdout via System.Speech.
fn sapi_script(voice: &VoiceParams) -> String {
    let rate = ((voice.rate as i64 - SAPI_NEUTRAL_WPM) / 20).clamp(-10, 10);
    let volume = (voice.volume.clamp(0.0, 1.0) * 100.0).round() as u32;
    let select = match &voice.voice_id {
        Some(name) => format!("$s.SelectVoice('{}'); ", name.replace('\'', "''")),
        None => String::new(),
    };
    format!(
        "$ErrorActionPreference = 'Stop'; Add-Type -AssemblyName System.Speech; \
         $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; $s.Rate = {rate}; $s.Volume = {volume}; {select}\
         $m = New-Object System.IO.MemoryStream; $s.SetOutputToWaveStream($m); $s.Speak([Console]::In.ReadToEnd()); $s.Dispose(); \
         $o = [Console]::OpenStandardOutput(); $o.Write($m.ToArray(), 0, [int]$m.Length); $o.Flush()"
    )
}

/// Parse `espeak-ng --voices`: `Pty Language Age/Gender VoiceName File Other`.
fn parse_espeak_voices(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            (fields.len() >= 4).then(|| VoiceInfo { id: fields[1].to_string(), name: fields[3].to_string(), style: None })
        })
        .collect()
}

/// Parse `say -v ?`: `<name with spaces> <locale> # <sample sentence>`.
fn parse_say_voices(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .filter_map(|line| {
            let head = line.split('#').next()?.trim_end();
            let (name, locale) = head.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            (!name.is_empty()).then(|| VoiceInfo { id: name.to_string(), name: name.to_string(), style: Some(locale.to_string()) })
        })
        .collect()
}

/// Parse `Name|Culture` lines printed by the PowerShell listing script.
fn parse_sapi_voices(listing: &str) -> Vec<VoiceInfo> {
    listing
        .lines()
        .filter_map(|line| {
            let (name, culture) = line.trim().split_once('|')?;
            Some(VoiceInfo { id: name.to_string(), name: name.to_string(), style: Some(culture.to_string()) })
        })
        .collect()
}

fn fail(message: impl Into<String>) -> SynthesisError {
    SynthesisError::engine(EngineKind::Fallback, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(voice_id: Option<&str>, volume: f32) -> SpeechRequest {
        SpeechRequest::new("hello there", VoiceParams { voice_id: voice_id.map(String::from), rate: 200, volume }).unwrap()
    }

    #[test]
    fn test_linux_command_streams_text_on_stdin() {
        let spec = SystemEngine::new(Platform::Linux).command(&request(Some("en-us"), 0.5)).unwrap();
        assert_eq!(spec.program, "espeak-ng");
        assert_eq!(spec.args, ["--stdout", "--stdin", "-s", "200", "-a", "50", "-v", "en-us"]);
        assert_eq!(spec.stdin.as_deref(), Some(&b"hello there"[..]));
    }

    #[test]
    fn test_macos_command_writes_aiff_to_stdout() {
        let spec = SystemEngine::new(Platform::MacOs).command(&request(None, 0.25)).unwrap();
        assert_eq!(spec.program, "say");
        assert!(spec.args.windows(2).any(|w| w == ["-o", "/dev/stdout"]));
        assert!(spec.args.contains(&"--file-format=AIFF".to_string()));
        assert_eq!(spec.stdin.as_deref(), Some(&b"[[volm 0.25]] hello there"[..]));
    }

    #[test]
    fn test_windows_script_maps_rate_and_quotes_voice() {
        let spec = SystemEngine::new(Platform::Windows).command(&request(Some("Microsoft Zira's"), 1.0)).unwrap();
        assert_eq!(spec.program, "powershell");
        let script = spec.args.last().unwrap();
        assert!(script.contains("$s.Rate = 1;"), "{}", script);
        assert!(script.contains("$s.Volume = 100;"));
        assert!(script.contains("SelectVoice('Microsoft Zira''s')"));
        assert!(script.contains("SetOutputToWaveStream"));
    }

    #[test]
    fn test_unsupported_platform_fails() {
        assert!(matches!(
            SystemEngine::new(Platform::Other).command(&request(None, 1.0)),
            Err(SynthesisError::Engine { engine: EngineKind::Fallback, .. })
        ));
    }

    #[test]
    fn test_espeak_stream_becomes_raw_pcm() {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&u32::MAX.to_le_bytes());
        wav.extend_from_slice(b"WAVEfmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&1u16.to_le_bytes()); // mono
        wav.extend_from_slice(&22050u32.to_le_bytes());
        wav.extend_from_slice(&44100u32.to_le_bytes());
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&u32::MAX.to_le_bytes());
        wav.extend_from_slice(&[1, 0, 2, 0]);

        let result = SystemEngine::new(Platform::Linux).into_result(wav).unwrap();
        assert_eq!(result.format, AudioFormat::RawPcm);
        assert_eq!(result.sample_rate, Some(22050));
        assert_eq!(result.channels, Some(1));
        assert_eq!(result.audio, vec![1, 0, 2, 0]);
        assert_eq!(result.engine, EngineKind::Fallback);
    }

    #[test]
    fn test_voice_listings_are_parsed() {
        let espeak = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n 5  af              --/M      Afrikaans          gmw/af\n 5  en-us           --/M      English_(America)  gmw/en-US\n";
        let voices = parse_espeak_voices(espeak);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[1].id, "en-us");
        assert_eq!(voices[1].name, "English_(America)");

        let say = "Alex                en_US    # Most people recognize me by my voice.\nBad News            en_US    # The light you see at the end of the tunnel is the headlamp of a fast approaching train.\n";
        let voices = parse_say_voices(say);
        assert_eq!(voices[1].id, "Bad News");
        assert_eq!(voices[1].style.as_deref(), Some("en_US"));

        let sapi = "Microsoft David Desktop|en-US\r\nMicrosoft Zira Desktop|en-US\r\n";
        assert_eq!(parse_sapi_voices(sapi).len(), 2);
    }
}
