//! Error types for the podcast pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::engines::EngineInitError;
use crate::synthesizer::SkippedSegment;

#[derive(Error, Debug)]
pub enum PodcastError {
    /// The model output could not be turned into a usable script.
    #[error("Script format error: {0}")]
    ScriptFormat(String),

    #[error("No speech synthesis engine available ({})", summarize_attempts(.attempts))]
    NoSynthesisEngineAvailable { attempts: Vec<EngineInitError> },

    #[error("Failed to synthesize segment {index}: {reason}")]
    SegmentSynthesis { index: usize, reason: String },

    #[error("No audio segments to combine")]
    EmptySegmentSet,

    /// Combination failed. Individual segment files written before the
    /// failure are still listed and usable, and skipped lines are kept.
    #[error("Failed to combine audio segments: {source}")]
    Combination {
        #[source]
        source: Box<PodcastError>,
        segment_files: Vec<PathBuf>,
        skipped: Vec<SkippedSegment>,
    },

    #[error("Speech engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
}

impl PodcastError {
    /// True when the failure happened before a script existed.
    pub fn is_script_error(&self) -> bool {
        matches!(
            self,
            PodcastError::ScriptFormat(_) | PodcastError::OpenAIError(_)
        )
    }

    /// True when a script may exist but audio could not be produced.
    pub fn is_audio_error(&self) -> bool {
        matches!(
            self,
            PodcastError::NoSynthesisEngineAvailable { .. }
                | PodcastError::SegmentSynthesis { .. }
                | PodcastError::EmptySegmentSet
                | PodcastError::Combination { .. }
                | PodcastError::Engine(_)
                | PodcastError::Wav(_)
        )
    }
}

fn summarize_attempts(attempts: &[EngineInitError]) -> String {
    if attempts.is_empty() {
        return "no engines enabled".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
