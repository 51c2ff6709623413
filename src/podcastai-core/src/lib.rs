//! PodcastAI Core Library
//!
//! Turns source text into a two-speaker podcast script with a chat model,
//! then renders the script to a single audio file with whichever speech
//! engine is available.

pub mod audio;
pub mod combiner;
pub mod config;
pub mod engines;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod script;
pub mod synthesizer;

pub use combiner::{AudioCombiner, CombinedAudio};
pub use config::{default_config, Config};
pub use engines::{default_providers, select_engine, EngineBinding, EngineKind};
pub use error::PodcastError;
pub use generator::{OpenAiScriptModel, ScriptGenerator, ScriptModel, ScriptRequest};
pub use pipeline::{AudioOutcome, PodcastContext, PodcastOutput, SourceKind};
pub use script::{DialogueLine, PodcastScript, Speaker};
pub use synthesizer::{AudioReport, AudioSegment, SegmentSynthesizer, SkippedSegment};
