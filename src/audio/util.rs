//! Shared audio utilities for players and engines.

use std::io::Cursor;

use anyhow::Result;
use cpal::traits::DeviceTrait;
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

use crate::error::DeliveryError;
use crate::tts::{AudioFormat, SynthesisResult};

/// Layout of a RIFF/WAVE stream as far as the start of its `data` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavLayout {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub data_offset: usize, // Byte offset of the first sample
}

/// Decoded interleaved samples ready for an output stream.
#[derive(Debug)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Get a human-readable device name.
///
/// # Returns
/// Device name string, or "Unknown" if the name cannot be retrieved.
pub fn get_device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Find an output configuration that plays `sample_rate` natively.
///
/// Only F32 configurations are considered (universally supported on modern
/// hardware). A configuration with the requested channel count is preferred,
/// then any mono or stereo one.
///
/// # Errors
/// Returns an error when no configuration supports the exact sample rate.
pub fn find_best_config(
    configs: impl Iterator<Item = SupportedStreamConfigRange>,
    sample_rate: u32,
    channels: u16,
) -> Result<SupportedStreamConfig> {
    let candidates: Vec<SupportedStreamConfigRange> = configs
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| sample_rate >= c.min_sample_rate() && sample_rate <= c.max_sample_rate())
        .collect();

    let config = candidates
        .iter()
        .find(|c| c.channels() == channels)
        .or_else(|| candidates.iter().find(|c| c.channels() <= 2))
        .ok_or_else(|| anyhow::anyhow!("no F32 output configuration supports {} Hz", sample_rate))?;

    Ok((*config).with_sample_rate(sample_rate))
}

/// Map interleaved samples from one channel count to another.
///
/// - Same count: copied
/// - Mono source: duplicated into every output channel
/// - Mono target: channels averaged
/// - Otherwise: leading channels kept, missing ones repeat the last source channel
pub fn map_channels(data: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return data.to_vec();
    }
    if from == 1 {
        return data.iter().flat_map(|&s| std::iter::repeat_n(s, to)).collect();
    }
    if to == 1 {
        return data.chunks(from).map(|frame| frame.iter().sum::<f32>() / frame.len() as f32).collect();
    }
    data.chunks(from).flat_map(|frame| (0..to).map(move |ch| frame[ch.min(frame.len() - 1)])).collect()
}

/// Parse the header of a WAV stream without trusting its size fields.
///
/// Streams written to a pipe carry placeholder RIFF/data sizes, so only the
/// `fmt ` chunk and the position of the `data` chunk are used.
///
/// # Errors
/// Returns an error if the stream is not RIFF/WAVE or lacks `fmt `/`data` chunks.
pub fn parse_wav_header(bytes: &[u8]) -> Result<WavLayout> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        anyhow::bail!("not a RIFF/WAVE stream");
    }

    let mut pos = 12;
    let mut format: Option<(u32, u16, u16)> = None;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32::from_le_bytes([bytes[pos + 4], bytes[pos + 5], bytes[pos + 6], bytes[pos + 7]]) as usize;
        let body = pos + 8;

        match id {
            b"fmt " => {
                if body + 16 > bytes.len() {
                    anyhow::bail!("truncated fmt chunk");
                }
                let channels = u16::from_le_bytes([bytes[body + 2], bytes[body + 3]]);
                let sample_rate = u32::from_le_bytes([bytes[body + 4], bytes[body + 5], bytes[body + 6], bytes[body + 7]]);
                let bits = u16::from_le_bytes([bytes[body + 14], bytes[body + 15]]);
                format = Some((sample_rate, channels, bits));
            }
            b"data" => {
                let (sample_rate, channels, bits_per_sample) = format.ok_or_else(|| anyhow::anyhow!("data chunk before fmt chunk"))?;
                return Ok(WavLayout { sample_rate, channels, bits_per_sample, data_offset: body });
            }
            _ => {}
        }

        // Chunks are word aligned
        pos = body.saturating_add(size).saturating_add(size & 1);
    }

    anyhow::bail!("no data chunk found")
}

/// Decode a synthesized buffer into f32 samples.
///
/// # Errors
/// Returns `DeliveryError::UnsupportedFormat` for AIFF, malformed WAV, or raw
/// PCM without its sample rate and channel count.
pub fn decode(audio: &SynthesisResult) -> Result<DecodedAudio, DeliveryError> {
    match audio.format {
        AudioFormat::Wav => {
            let reader = hound::WavReader::new(Cursor::new(&audio.audio)).map_err(|e| DeliveryError::UnsupportedFormat(format!("invalid WAV: {e}")))?;
            let spec = reader.spec();
            let samples: Result<Vec<f32>, hound::Error> = match spec.sample_format {
                hound::SampleFormat::Float => reader.into_samples::<f32>().collect(),
                hound::SampleFormat::Int => {
                    let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                    reader.into_samples::<i32>().map(|s| s.map(|v| v as f32 / scale)).collect()
                }
            };
            let samples = samples.map_err(|e| DeliveryError::UnsupportedFormat(format!("invalid WAV samples: {e}")))?;
            Ok(DecodedAudio { samples, sample_rate: spec.sample_rate, channels: spec.channels })
        }
        AudioFormat::RawPcm => {
            let (sample_rate, channels) = raw_parameters(audio)?;
            let samples = audio.audio.chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0).collect();
            Ok(DecodedAudio { samples, sample_rate, channels })
        }
        AudioFormat::Aiff => Err(DeliveryError::UnsupportedFormat("AIFF cannot be streamed in-process".into())),
    }
}

/// Wrap raw s16le PCM into a WAV container with the same rate and channel count.
///
/// # Errors
/// Returns an error when the buffer lacks its PCM parameters or encoding fails.
pub fn wrap_raw_pcm(audio: &SynthesisResult) -> Result<Vec<u8>, DeliveryError> {
    let (sample_rate, channels) = raw_parameters(audio)?;
    let spec = hound::WavSpec { channels, sample_rate, bits_per_sample: 16, sample_format: hound::SampleFormat::Int };

    let encode_error = |e: hound::Error| DeliveryError::Player { player: "wav encoder".into(), message: e.to_string() };

    let mut buffer = Vec::with_capacity(audio.audio.len() + 44);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buffer), spec).map_err(encode_error)?;
        for chunk in audio.audio.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]])).map_err(encode_error)?;
        }
        writer.finalize().map_err(encode_error)?;
    }
    Ok(buffer)
}

fn raw_parameters(audio: &SynthesisResult) -> Result<(u32, u16), DeliveryError> {
    match (audio.sample_rate, audio.channels) {
        (Some(rate), Some(channels)) if rate > 0 && channels > 0 => Ok((rate, channels)),
        _ => Err(DeliveryError::UnsupportedFormat("raw PCM without sample rate and channel count".into())),
    }
}
