//! Per-line speech synthesis and podcast rendering.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::audio::write_wav;
use crate::combiner::{order_outputs, AudioCombiner};
use crate::config::AudioConfig;
use crate::engines::{EngineBinding, EngineKind};
use crate::error::PodcastError;
use crate::script::{ensure_terminal_punctuation, PodcastScript, Speaker};

/// Synthesized audio for one dialogue line, at the canonical rate.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub speaker: Speaker,
    pub text: String,
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioSegment {
    pub fn duration_seconds(&self) -> f64 {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        frames as f64 / self.sample_rate as f64
    }
}

/// A line that produced no audio.
#[derive(Debug, Clone)]
pub struct SkippedSegment {
    /// 1-based position in the script.
    pub index: usize,
    pub speaker: Speaker,
    pub reason: String,
}

impl SkippedSegment {
    pub fn to_error(&self) -> PodcastError {
        PodcastError::SegmentSynthesis {
            index: self.index,
            reason: self.reason.clone(),
        }
    }
}

/// Result of rendering a whole script.
#[derive(Debug, Clone)]
pub struct AudioReport {
    /// Every file written, combined file first.
    pub files: Vec<PathBuf>,
    pub combined: PathBuf,
    pub total_segments: usize,
    pub synthesized: usize,
    pub skipped: Vec<SkippedSegment>,
    /// Length of the combined audio.
    pub duration_seconds: f64,
}

/// Owns the bound engine; all calls are made one at a time through `&mut self`.
pub struct SegmentSynthesizer {
    binding: EngineBinding,
    sample_rate: u32,
    keep_segments: bool,
    combiner: AudioCombiner,
}

impl SegmentSynthesizer {
    pub fn new(binding: EngineBinding, audio: &AudioConfig) -> Self {
        Self {
            binding,
            sample_rate: audio.sample_rate,
            keep_segments: audio.keep_segments,
            combiner: AudioCombiner::new(audio.sample_rate, audio.pause_seconds),
        }
    }

    pub fn engine_kind(&self) -> EngineKind {
        self.binding.kind()
    }

    pub fn binding(&self) -> &EngineBinding {
        &self.binding
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Override whether individual segment files are written.
    pub fn set_keep_segments(&mut self, keep: bool) {
        self.keep_segments = keep;
    }

    /// Synthesize one line as mono audio at the canonical sample rate.
    pub async fn synthesize_segment(&mut self, speaker: Speaker, text: &str) -> Result<AudioSegment, PodcastError> {
        let clean_text = clean_text_for_speech(text);
        let waveform = self.binding.synthesize(&clean_text, speaker).await?;

        if waveform.samples.is_empty() {
            return Err(PodcastError::Engine("Engine returned no audio".to_string()));
        }

        let samples = waveform.into_canonical(self.sample_rate);
        Ok(AudioSegment {
            speaker,
            text: clean_text,
            samples,
            channels: 1,
            sample_rate: self.sample_rate,
        })
    }

    /// Render every line of `script` and combine into `output_dir`.
    ///
    /// A failing line is logged and skipped. Combination failure is returned
    /// with the list of segment files that were already written.
    pub async fn render(&mut self, script: &PodcastScript, output_dir: &Path) -> Result<AudioReport, PodcastError> {
        fs::create_dir_all(output_dir)?;

        let total = script.line_count();
        info!(
            segments = total,
            engine = %self.engine_kind(),
            output_dir = %output_dir.display(),
            keep_segments = self.keep_segments,
            "Generating podcast audio"
        );

        let mut segments = Vec::with_capacity(total);
        let mut segment_files = Vec::new();
        let mut skipped = Vec::new();

        for (i, line) in script.lines().iter().enumerate() {
            let position = i + 1;
            if i == 0 || position % 5 == 0 || position == total {
                info!(
                    "Processing segment {}/{}: {} ({} chars)",
                    position,
                    total,
                    line.speaker.label(),
                    line.text.len()
                );
            }

            let segment = match self.synthesize_segment(line.speaker, &line.text).await {
                Ok(segment) => segment,
                Err(e) => {
                    error!(segment = position, speaker = line.speaker.label(), error = %e, "Skipping segment");
                    skipped.push(SkippedSegment {
                        index: position,
                        speaker: line.speaker,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            if self.keep_segments {
                let path = output_dir.join(segment_file_name(position, line.speaker));
                match write_wav(&path, &segment.samples, self.sample_rate) {
                    Ok(()) => segment_files.push(path),
                    Err(e) => warn!(segment = position, error = %e, "Failed to write segment file"),
                }
            }

            segments.push(segment);
        }

        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), total, "Some segments were skipped");
        }

        let combined = match self.combiner.combine(&segments, output_dir) {
            Ok(combined) => combined,
            Err(e) => {
                error!(error = %e, "Failed to combine audio segments");
                return Err(PodcastError::Combination {
                    source: Box::new(e),
                    segment_files: order_outputs(segment_files),
                    skipped,
                });
            }
        };

        let mut files = segment_files;
        files.push(combined.path.clone());
        let files = order_outputs(files);

        info!(files = files.len(), "Podcast generation complete");

        Ok(AudioReport {
            files,
            combined: combined.path.clone(),
            total_segments: total,
            synthesized: segments.len(),
            skipped,
            duration_seconds: combined.duration_seconds(),
        })
    }
}

/// File name for an individually written segment.
pub fn segment_file_name(position: usize, speaker: Speaker) -> String {
    format!("segment_{:03}_{}.wav", position, speaker.slug())
}

/// Collapse runs of `...`, `!!`, `??` and ensure terminal punctuation.
///
/// Idempotent, so it is safe to apply to text that was already cleaned.
pub fn clean_text_for_speech(text: &str) -> String {
    let mut clean_text = text.trim().to_string();

    for (pattern, replacement) in [(r"\.{3,}", "."), (r"!{2,}", "!"), (r"\?{2,}", "?")] {
        if let Ok(re) = regex::Regex::new(pattern) {
            clean_text = re.replace_all(&clean_text, replacement).to_string();
        }
    }

    ensure_terminal_punctuation(&clean_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VoicesConfig;
    use crate::engines::testing::FakeEngine;
    use crate::script::DialogueLine;
    use std::sync::Arc;

    fn script(texts: &[&str]) -> PodcastScript {
        let mut speaker = Speaker::One;
        let lines = texts
            .iter()
            .map(|t| {
                let line = DialogueLine::new(speaker, *t);
                speaker = speaker.next();
                line
            })
            .collect();
        PodcastScript::new(lines, "test").unwrap()
    }

    fn synthesizer(engine: FakeEngine, keep_segments: bool) -> SegmentSynthesizer {
        let binding = EngineBinding::new(Box::new(engine), &VoicesConfig::default());
        let audio = AudioConfig {
            keep_segments,
            ..AudioConfig::default()
        };
        SegmentSynthesizer::new(binding, &audio)
    }

    #[test]
    fn test_clean_text_for_speech() {
        assert_eq!(clean_text_for_speech("  Wait...  "), "Wait.");
        assert_eq!(clean_text_for_speech("Wow!! Really??"), "Wow! Really?");
        assert_eq!(clean_text_for_speech("No punctuation"), "No punctuation.");
        assert_eq!(clean_text_for_speech("Hmm..... ok!!!"), "Hmm. ok!");
    }

    #[test]
    fn test_clean_text_is_idempotent() {
        for text in ["Wait... what?? Yes!!", "Plain", "Done."] {
            let once = clean_text_for_speech(text);
            assert_eq!(clean_text_for_speech(&once), once);
        }
    }

    #[test]
    fn test_segment_file_name() {
        assert_eq!(segment_file_name(7, Speaker::Two), "segment_007_speaker_2.wav");
    }

    #[tokio::test]
    async fn test_segment_is_resampled_to_mono_canonical_rate() {
        let mut engine = FakeEngine::new(EngineKind::Neural, 24000);
        engine.channels = 2;
        engine.seconds_per_call = 2.0;
        let mut synth = synthesizer(engine, false);

        let segment = synth.synthesize_segment(Speaker::One, "Hello there").await.unwrap();
        assert_eq!(segment.channels, 1);
        assert_eq!(segment.sample_rate, 22050);
        assert_eq!(segment.samples.len(), 44100);
        assert_eq!(segment.text, "Hello there.");
        assert!((segment.duration_seconds() - 2.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_render_skips_failed_segments() {
        let mut engine = FakeEngine::new(EngineKind::Offline, 22050);
        engine.fail_on = vec!["broken".to_string()];
        let calls = Arc::clone(&engine.calls);
        let mut synth = synthesizer(engine, false);
        let dir = tempfile::tempdir().unwrap();

        let report = synth
            .render(&script(&["First.", "A broken line.", "Third."]), dir.path())
            .await
            .unwrap();

        assert_eq!(calls.lock().unwrap().len(), 3);
        assert_eq!(report.total_segments, 3);
        assert_eq!(report.synthesized, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 2);
        assert_eq!(report.files, vec![dir.path().join("complete_podcast.wav")]);
        // Two one-second segments and one pause.
        assert!((report.duration_seconds - 2.5).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_render_keeps_segment_files_when_requested() {
        let engine = FakeEngine::new(EngineKind::Cloud, 24000);
        let mut synth = synthesizer(engine, true);
        let dir = tempfile::tempdir().unwrap();

        let report = synth.render(&script(&["One.", "Two."]), dir.path()).await.unwrap();

        assert_eq!(report.files.len(), 3);
        assert_eq!(report.files[0], report.combined);
        assert!(dir.path().join("segment_001_speaker_1.wav").exists());
        assert!(dir.path().join("segment_002_speaker_2.wav").exists());
    }

    #[tokio::test]
    async fn test_render_with_no_surviving_segments_is_combination_error() {
        let mut engine = FakeEngine::new(EngineKind::Offline, 22050);
        engine.fail_on = vec![".".to_string()];
        let mut synth = synthesizer(engine, false);
        let dir = tempfile::tempdir().unwrap();

        match synth.render(&script(&["One.", "Two."]), dir.path()).await {
            Err(PodcastError::Combination {
                source,
                segment_files,
                skipped,
            }) => {
                assert!(matches!(*source, PodcastError::EmptySegmentSet));
                assert!(segment_files.is_empty());
                assert_eq!(skipped.iter().map(|s| s.index).collect::<Vec<_>>(), vec![1, 2]);
                assert_eq!(skipped[1].speaker, Speaker::Two);
                assert!(skipped[0].reason.contains("refused to speak"));
                assert!(matches!(
                    skipped[0].to_error(),
                    PodcastError::SegmentSynthesis { index: 1, .. }
                ));
            }
            other => panic!("expected combination error, got {:?}", other.map(|r| r.files)),
        }
        assert!(!dir.path().join("complete_podcast.wav").exists());
    }

    #[tokio::test]
    async fn test_render_passes_speaker_voices() {
        let engine = FakeEngine::new(EngineKind::Offline, 22050);
        let calls = Arc::clone(&engine.calls);
        let mut synth = synthesizer(engine, false);
        let dir = tempfile::tempdir().unwrap();

        synth.render(&script(&["One.", "Two.", "Three."]), dir.path()).await.unwrap();

        let voices: Vec<_> = calls.lock().unwrap().iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(
            voices,
            vec![
                Some("en-us".to_string()),
                Some("en-gb".to_string()),
                Some("en-us".to_string()),
            ]
        );
    }
}
