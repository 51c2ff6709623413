//! Waveform representation and sample-level helpers.

use std::io::Read;
use std::path::Path;

use crate::error::PodcastError;

/// Audio returned by an engine, before canonicalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: channels.max(1),
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Collapse to mono and resample to `sample_rate`.
    pub fn into_canonical(self, sample_rate: u32) -> Vec<f32> {
        let mono = downmix(self.samples, self.channels);
        resample_linear(mono, self.sample_rate, sample_rate)
    }
}

/// Average interleaved channels into a single channel.
pub fn downmix(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono audio using linear interpolation.
///
/// Output length is `round(len * to / from)`, so duration is kept within
/// one sample.
pub fn resample_linear(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || samples.is_empty() {
        return samples;
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio).round() as usize;
    let mut result = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        if src_idx + 1 < samples.len() {
            result.push(samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac);
        } else {
            result.push(samples[samples.len() - 1]);
        }
    }

    result
}

/// Read every sample of a WAV stream as normalized `f32`.
pub fn decode_wav<R: Read>(reader: hound::WavReader<R>) -> Result<Waveform, PodcastError> {
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(Waveform::new(samples, spec.channels, spec.sample_rate))
}

/// Decode raw little-endian 16-bit mono PCM.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32) -> Waveform {
    let samples = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();
    Waveform::mono(samples, sample_rate)
}

/// Write mono samples to a 32-bit float WAV file.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), PodcastError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
