//! Concatenation of synthesized segments into one podcast file.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::audio::{downmix, resample_linear, write_wav};
use crate::error::PodcastError;
use crate::synthesizer::AudioSegment;

/// Fixed name of the combined output file.
pub const COMBINED_FILE_NAME: &str = "complete_podcast.wav";

/// Peak level after normalization of a clipping buffer.
pub const NORMALIZED_PEAK: f32 = 0.95;

/// The written podcast audio.
#[derive(Debug, Clone)]
pub struct CombinedAudio {
    pub path: PathBuf,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl CombinedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

#[derive(Debug, Clone)]
pub struct AudioCombiner {
    sample_rate: u32,
    pause_seconds: f32,
}

impl AudioCombiner {
    pub fn new(sample_rate: u32, pause_seconds: f32) -> Self {
        Self {
            sample_rate,
            pause_seconds,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Join segments with silence between consecutive ones and
    /// normalize the peak.
    pub fn concatenate(&self, segments: &[AudioSegment]) -> Result<Vec<f32>, PodcastError> {
        if segments.is_empty() {
            return Err(PodcastError::EmptySegmentSet);
        }

        let gap_samples = (self.pause_seconds * self.sample_rate as f32) as usize;
        let total: usize = segments.iter().map(|s| s.samples.len()).sum::<usize>()
            + gap_samples * (segments.len() - 1);
        let mut combined = Vec::with_capacity(total);

        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                combined.extend(std::iter::repeat_n(0.0, gap_samples));
            }

            let mut samples = downmix(segment.samples.clone(), segment.channels);
            if segment.sample_rate != self.sample_rate {
                samples = resample_linear(samples, segment.sample_rate, self.sample_rate);
            }

            debug!(
                segment = i + 1,
                speaker = segment.speaker.label(),
                seconds = segment.duration_seconds(),
                "Added segment"
            );
            combined.extend(samples);
        }

        if normalize_peak(&mut combined) {
            debug!("Normalized combined audio to avoid clipping");
        }

        Ok(combined)
    }

    /// Concatenate and write `complete_podcast.wav` inside `output_dir`.
    pub fn combine(&self, segments: &[AudioSegment], output_dir: &Path) -> Result<CombinedAudio, PodcastError> {
        info!(segments = segments.len(), "Combining audio segments into one file");

        let samples = self.concatenate(segments)?;
        let path = output_dir.join(COMBINED_FILE_NAME);
        write_wav(&path, &samples, self.sample_rate)?;

        let combined = CombinedAudio {
            path,
            samples,
            sample_rate: self.sample_rate,
        };
        info!(
            path = %combined.path.display(),
            seconds = combined.duration_seconds(),
            minutes = combined.duration_seconds() / 60.0,
            "Combined podcast saved"
        );

        Ok(combined)
    }
}

/// Scale by `0.95 / peak` when the peak exceeds 1.0. Returns whether the
/// buffer was changed.
pub fn normalize_peak(samples: &mut [f32]) -> bool {
    let peak = samples.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    if peak <= 1.0 {
        return false;
    }

    let scale = NORMALIZED_PEAK / peak;
    for sample in samples.iter_mut() {
        *sample *= scale;
    }
    true
}

/// Order output files so the combined file comes first.
///
/// `files` is in production order. Without a combined file, the most
/// recently produced one is moved to the front.
pub fn order_outputs(mut files: Vec<PathBuf>) -> Vec<PathBuf> {
    let combined = files
        .iter()
        .position(|f| f.file_name().is_some_and(|n| n == COMBINED_FILE_NAME));

    match combined {
        Some(idx) => {
            let path = files.remove(idx);
            files.insert(0, path);
        }
        None => {
            if let Some(latest) = files.pop() {
                warn!(
                    file = %latest.display(),
                    "Combined audio file missing, falling back to most recent output"
                );
                files.insert(0, latest);
            }
        }
    }

    files
}
