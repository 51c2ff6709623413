//! Speech synthesis engines and engine selection.
//!
//! Engines are probed in a fixed priority order:
//! - `neural` - kokoro-tiny, high fidelity, single default voice
//! - `cloud` - OpenAI-compatible speech endpoint, one voice per speaker
//! - `offline` - local espeak-ng, one voice per speaker
//!
//! The first provider whose initialization succeeds is bound for the
//! lifetime of the synthesizer. Later candidates are never touched.

pub mod cloud;
pub mod neural;
pub mod offline;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::audio::Waveform;
use crate::config::{Config, VoicePair, VoicesConfig};
use crate::error::PodcastError;
use crate::script::Speaker;

pub use cloud::CloudEngineProvider;
pub use neural::NeuralEngineProvider;
pub use offline::OfflineEngineProvider;

/// Identifies a synthesis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Neural,
    Cloud,
    Offline,
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Neural => "neural",
            EngineKind::Cloud => "cloud",
            EngineKind::Offline => "offline",
        }
    }

    /// Whether the engine can speak with a distinct voice per speaker.
    pub fn supports_voices(&self) -> bool {
        !matches!(self, EngineKind::Neural)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Coarse category of an initialization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitFailureKind {
    /// A required binary, model, or credential is absent.
    MissingDependency,
    /// The dependency exists but conflicts with another installed component.
    DependencyConflict,
    Failed,
}

impl fmt::Display for InitFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitFailureKind::MissingDependency => "missing dependency",
            InitFailureKind::DependencyConflict => "dependency conflict",
            InitFailureKind::Failed => "initialization failed",
        })
    }
}

/// Why a provider could not produce an engine.
#[derive(Error, Debug, Clone)]
#[error("{engine}: {kind} ({message})")]
pub struct EngineInitError {
    pub engine: String,
    pub kind: InitFailureKind,
    pub message: String,
}

impl EngineInitError {
    pub fn new(engine: impl Into<String>, kind: InitFailureKind, message: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            kind,
            message: message.into(),
        }
    }

    /// Build an error whose category is inferred from the message.
    pub fn classified(engine: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify_init_failure(&message);
        Self::new(engine, kind, message)
    }
}

const CONFLICT_MARKERS: [&str; 5] = [
    "conflict",
    "incompatible",
    "version mismatch",
    "undefined symbol",
    "cannot import",
];

const MISSING_MARKERS: [&str; 4] = ["not found", "no such file", "missing", "not installed"];

/// Sort a free-form failure message into a coarse category.
pub fn classify_init_failure(message: &str) -> InitFailureKind {
    let lower = message.to_lowercase();
    if CONFLICT_MARKERS.iter().any(|m| lower.contains(m)) {
        InitFailureKind::DependencyConflict
    } else if MISSING_MARKERS.iter().any(|m| lower.contains(m)) {
        InitFailureKind::MissingDependency
    } else {
        InitFailureKind::Failed
    }
}

/// An initialized synthesis backend.
#[async_trait]
pub trait SpeechEngine: Send {
    fn kind(&self) -> EngineKind;

    /// Synthesize `text`. `voice` is ignored by engines without voice support.
    async fn synthesize(&mut self, text: &str, voice: Option<&str>) -> Result<Waveform, PodcastError>;
}

/// A candidate backend that may or may not be usable in this process.
#[async_trait]
pub trait EngineProvider: Send + Sync {
    fn kind(&self) -> EngineKind;

    async fn initialize(&self) -> Result<Box<dyn SpeechEngine>, EngineInitError>;
}

/// The one engine bound for a synthesizer, with its per-speaker voices.
pub struct EngineBinding {
    engine: Box<dyn SpeechEngine>,
    voices: Option<VoicePair>,
    skipped: Vec<EngineInitError>,
}

impl EngineBinding {
    pub fn new(engine: Box<dyn SpeechEngine>, voices: &VoicesConfig) -> Self {
        let voices = voices_for(engine.kind(), voices);
        Self {
            engine,
            voices,
            skipped: Vec::new(),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// Higher-priority candidates that failed before this one bound.
    pub fn skipped(&self) -> &[EngineInitError] {
        &self.skipped
    }

    pub fn voice_for(&self, speaker: Speaker) -> Option<&str> {
        self.voices.as_ref().map(|v| v.voice_for(speaker))
    }

    pub async fn synthesize(&mut self, text: &str, speaker: Speaker) -> Result<Waveform, PodcastError> {
        let voice = self.voices.as_ref().map(|v| v.voice_for(speaker).to_string());
        self.engine.synthesize(text, voice.as_deref()).await
    }
}

fn voices_for(kind: EngineKind, voices: &VoicesConfig) -> Option<VoicePair> {
    match kind {
        EngineKind::Neural => None,
        EngineKind::Cloud => Some(voices.cloud.clone()),
        EngineKind::Offline => Some(voices.offline.clone()),
    }
}

/// Bind the first provider that initializes successfully.
pub async fn select_engine(
    providers: Vec<Box<dyn EngineProvider>>,
    voices: &VoicesConfig,
) -> Result<EngineBinding, PodcastError> {
    let mut attempts = Vec::new();

    for provider in providers {
        let kind = provider.kind();
        info!(engine = %kind, "Probing speech engine");

        match provider.initialize().await {
            Ok(engine) => {
                info!(engine = %kind, skipped = attempts.len(), "Speech engine bound");
                let mut binding = EngineBinding::new(engine, voices);
                binding.skipped = attempts;
                return Ok(binding);
            }
            Err(e) => {
                match e.kind {
                    InitFailureKind::DependencyConflict => {
                        warn!(engine = %kind, error = %e.message, "Engine has a dependency conflict, trying next")
                    }
                    _ => warn!(engine = %kind, category = %e.kind, error = %e.message, "Engine unavailable, trying next"),
                }
                attempts.push(e);
            }
        }
    }

    Err(PodcastError::NoSynthesisEngineAvailable { attempts })
}

/// The ranked provider list for a configuration, in fixed priority order.
pub fn default_providers(config: &Config) -> Vec<Box<dyn EngineProvider>> {
    let mut providers: Vec<Box<dyn EngineProvider>> = Vec::new();

    if config.engines.neural {
        providers.push(Box::new(NeuralEngineProvider::new()));
    }
    if config.engines.cloud {
        providers.push(Box::new(CloudEngineProvider::from_env(&config.engines)));
    }
    if config.engines.offline {
        providers.push(Box::new(OfflineEngineProvider::new(config.engines.offline_rate)));
    }

    providers
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::{Arc, Mutex};

    fn providers(
        outcomes: Vec<(EngineKind, FakeOutcome)>,
        probed: &Arc<Mutex<Vec<EngineKind>>>,
    ) -> Vec<Box<dyn EngineProvider>> {
        outcomes
            .into_iter()
            .map(|(kind, outcome)| {
                Box::new(FakeProvider {
                    kind,
                    outcome,
                    probed: Arc::clone(probed),
                }) as Box<dyn EngineProvider>
            })
            .collect()
    }

    #[tokio::test]
    async fn test_first_success_binds_and_stops_probing() {
        let probed = Arc::new(Mutex::new(Vec::new()));
        let list = providers(
            vec![
                (EngineKind::Neural, FakeOutcome::Succeed),
                (EngineKind::Cloud, FakeOutcome::Succeed),
                (EngineKind::Offline, FakeOutcome::Succeed),
            ],
            &probed,
        );

        let binding = select_engine(list, &VoicesConfig::default()).await.unwrap();
        assert_eq!(binding.kind(), EngineKind::Neural);
        assert!(binding.skipped().is_empty());
        assert_eq!(*probed.lock().unwrap(), vec![EngineKind::Neural]);
    }

    #[tokio::test]
    async fn test_falls_through_to_third_candidate() {
        let probed = Arc::new(Mutex::new(Vec::new()));
        let list = providers(
            vec![
                (EngineKind::Neural, FakeOutcome::Fail(InitFailureKind::DependencyConflict)),
                (EngineKind::Cloud, FakeOutcome::Fail(InitFailureKind::MissingDependency)),
                (EngineKind::Offline, FakeOutcome::Succeed),
            ],
            &probed,
        );

        let binding = select_engine(list, &VoicesConfig::default()).await.unwrap();
        assert_eq!(binding.kind(), EngineKind::Offline);
        assert_eq!(binding.skipped().len(), 2);
        assert_eq!(binding.skipped()[0].kind, InitFailureKind::DependencyConflict);
        assert_eq!(probed.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_no_candidate_is_fatal() {
        let probed = Arc::new(Mutex::new(Vec::new()));
        let list = providers(
            vec![
                (EngineKind::Neural, FakeOutcome::Fail(InitFailureKind::Failed)),
                (EngineKind::Offline, FakeOutcome::Fail(InitFailureKind::MissingDependency)),
            ],
            &probed,
        );

        match select_engine(list, &VoicesConfig::default()).await {
            Err(PodcastError::NoSynthesisEngineAvailable { attempts }) => assert_eq!(attempts.len(), 2),
            other => panic!("expected NoSynthesisEngineAvailable, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_voice_per_speaker_for_voiced_engines() {
        let engine = FakeEngine::new(EngineKind::Cloud, 24000);
        let calls = Arc::clone(&engine.calls);
        let mut binding = EngineBinding::new(Box::new(engine), &VoicesConfig::default());

        binding.synthesize("Hello.", Speaker::One).await.unwrap();
        binding.synthesize("Hi.", Speaker::Two).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].1.as_deref(), Some("alloy"));
        assert_eq!(calls[1].1.as_deref(), Some("onyx"));
    }

    #[tokio::test]
    async fn test_neural_engine_uses_default_voice() {
        let engine = FakeEngine::new(EngineKind::Neural, 24000);
        let calls = Arc::clone(&engine.calls);
        let mut binding = EngineBinding::new(Box::new(engine), &VoicesConfig::default());

        binding.synthesize("Hello.", Speaker::Two).await.unwrap();
        assert_eq!(calls.lock().unwrap()[0].1, None);
        assert_eq!(binding.voice_for(Speaker::One), None);
    }

    #[test]
    fn test_classify_init_failure() {
        assert_eq!(
            classify_init_failure("onnxruntime version mismatch: expected 1.20, found 1.16"),
            InitFailureKind::DependencyConflict
        );
        assert_eq!(
            classify_init_failure("espeak-ng: No such file or directory"),
            InitFailureKind::MissingDependency
        );
        assert_eq!(classify_init_failure("model download timed out"), InitFailureKind::Failed);
    }

    #[test]
    fn test_default_providers_respect_flags_and_order() {
        let mut config = Config::default();
        config.engines.cloud = false;
        let kinds: Vec<_> = default_providers(&config).iter().map(|p| p.kind()).collect();
        assert_eq!(kinds, vec![EngineKind::Neural, EngineKind::Offline]);
    }
}
