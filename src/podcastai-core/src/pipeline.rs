//! End-to-end podcast generation context.
//!
//! Built once per process and passed to whoever handles requests. Engine
//! availability is decided when the context is built and never re-probed.

use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::engines::{default_providers, select_engine, EngineKind, EngineProvider};
use crate::error::PodcastError;
use crate::generator::{ScriptGenerator, ScriptModel, ScriptRequest};
use crate::script::PodcastScript;
use crate::synthesizer::{AudioReport, SegmentSynthesizer, SkippedSegment};

/// File the script JSON is saved to in each podcast directory.
pub const SCRIPT_FILE_NAME: &str = "script.json";

/// Rough origin of the source text, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Document,
    Website,
    YouTubeVideo,
    Text,
}

impl SourceKind {
    pub fn detect(source_name: &str) -> Self {
        let lower = source_name.to_lowercase();
        if lower.contains("youtube") || lower.contains("youtu.be") {
            SourceKind::YouTubeVideo
        } else if source_name.starts_with("http") {
            SourceKind::Website
        } else if source_name.starts_with("Pasted Text") {
            SourceKind::Text
        } else {
            SourceKind::Document
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SourceKind::Document => "Document",
            SourceKind::Website => "Website",
            SourceKind::YouTubeVideo => "YouTube Video",
            SourceKind::Text => "Text",
        }
    }
}

/// What happened on the audio side of a generation.
#[derive(Debug)]
pub enum AudioOutcome {
    Ready(AudioReport),
    /// No engine was bound, or audio was not requested.
    Unavailable { reason: String },
    /// Audio was attempted and failed. Segment files written before the
    /// failure and the lines that were skipped are listed.
    Failed {
        error: String,
        segment_files: Vec<PathBuf>,
        skipped: Vec<SkippedSegment>,
    },
}

impl AudioOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, AudioOutcome::Ready(_))
    }

    /// The file a caller should present first.
    pub fn primary_file(&self) -> Option<&Path> {
        match self {
            AudioOutcome::Ready(report) => report.files.first().map(PathBuf::as_path),
            AudioOutcome::Failed { segment_files, .. } => segment_files.first().map(PathBuf::as_path),
            AudioOutcome::Unavailable { .. } => None,
        }
    }
}

/// Everything produced by one generation request.
#[derive(Debug)]
pub struct PodcastOutput {
    pub script: PodcastScript,
    pub output_dir: PathBuf,
    pub script_path: PathBuf,
    pub source_kind: SourceKind,
    pub style: String,
    pub length: String,
    pub audio: AudioOutcome,
}

pub struct PodcastContext {
    config: Config,
    generator: ScriptGenerator,
    synthesizer: Option<SegmentSynthesizer>,
    audio_unavailable: Option<String>,
}

impl PodcastContext {
    /// Build a context, probing the configured engines once.
    pub async fn build(config: Config, model: Box<dyn ScriptModel>) -> Self {
        let providers = default_providers(&config);
        Self::with_providers(config, model, providers).await
    }

    /// Build a context from an explicit ranked provider list.
    pub async fn with_providers(
        config: Config,
        model: Box<dyn ScriptModel>,
        providers: Vec<Box<dyn EngineProvider>>,
    ) -> Self {
        let (synthesizer, audio_unavailable) = match select_engine(providers, &config.voices).await {
            Ok(binding) => (Some(SegmentSynthesizer::new(binding, &config.audio)), None),
            Err(e) => {
                warn!(error = %e, "Audio generation disabled");
                (None, Some(e.to_string()))
            }
        };

        let generator = ScriptGenerator::new(model, config.clone());

        Self {
            config,
            generator,
            synthesizer,
            audio_unavailable,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn generator(&self) -> &ScriptGenerator {
        &self.generator
    }

    pub fn audio_available(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn engine_kind(&self) -> Option<EngineKind> {
        self.synthesizer.as_ref().map(SegmentSynthesizer::engine_kind)
    }

    /// Override the configured choice of writing individual segment files.
    pub fn set_keep_segments(&mut self, keep: bool) {
        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.set_keep_segments(keep);
        }
    }

    /// Generate a script and, when possible, its audio, in a new
    /// `podcast_<timestamp>` directory under `output_root`.
    ///
    /// Only script failures are returned as errors. Audio problems are
    /// reported through `PodcastOutput::audio`.
    pub async fn generate(
        &mut self,
        request: &ScriptRequest,
        output_root: &Path,
        with_audio: bool,
    ) -> Result<PodcastOutput, PodcastError> {
        let script = self.generator.generate(request).await?;

        let output_dir = create_podcast_dir(output_root, Local::now())?;
        let script_path = write_script(&script, &output_dir)?;

        let audio = if with_audio {
            self.render(&script, &output_dir).await
        } else {
            AudioOutcome::Unavailable {
                reason: "audio generation not requested".to_string(),
            }
        };

        Ok(PodcastOutput {
            source_kind: SourceKind::detect(&request.source_name),
            style: request.style.clone(),
            length: request.target_duration.clone(),
            script,
            output_dir,
            script_path,
            audio,
        })
    }

    /// Render an existing script into `output_dir`.
    pub async fn render(&mut self, script: &PodcastScript, output_dir: &Path) -> AudioOutcome {
        let Some(synthesizer) = self.synthesizer.as_mut() else {
            return AudioOutcome::Unavailable {
                reason: self
                    .audio_unavailable
                    .clone()
                    .unwrap_or_else(|| "no speech engine bound".to_string()),
            };
        };

        match synthesizer.render(script, output_dir).await {
            Ok(report) => AudioOutcome::Ready(report),
            Err(PodcastError::Combination {
                source,
                segment_files,
                skipped,
            }) => {
                error!(
                    error = %source,
                    kept = segment_files.len(),
                    skipped = skipped.len(),
                    "Podcast audio failed"
                );
                AudioOutcome::Failed {
                    error: source.to_string(),
                    segment_files,
                    skipped,
                }
            }
            Err(e) => {
                error!(error = %e, "Podcast audio failed");
                AudioOutcome::Failed {
                    error: e.to_string(),
                    segment_files: Vec::new(),
                    skipped: Vec::new(),
                }
            }
        }
    }
}

/// `podcast_YYYYMMDD_HHMMSS`
pub fn podcast_dir_name(now: DateTime<Local>) -> String {
    format!("podcast_{}", now.format("%Y%m%d_%H%M%S"))
}

fn create_podcast_dir(output_root: &Path, now: DateTime<Local>) -> Result<PathBuf, PodcastError> {
    let base = output_root.join(podcast_dir_name(now));

    // Two requests within the same second get distinct directories.
    let mut dir = base.clone();
    let mut suffix = 1;
    while dir.exists() {
        suffix += 1;
        dir = PathBuf::from(format!("{}_{}", base.display(), suffix));
    }

    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Save the script JSON next to the audio.
pub fn write_script(script: &PodcastScript, output_dir: &Path) -> Result<PathBuf, PodcastError> {
    let json = script
        .to_json()
        .map_err(|e| PodcastError::ScriptFormat(format!("Failed to serialize script: {}", e)))?;
    let path = output_dir.join(SCRIPT_FILE_NAME);
    fs::write(&path, json)?;
    info!(path = %path.display(), "Script saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_config;
    use crate::engines::testing::{FakeEngine, FakeOutcome, FakeProvider};
    use crate::engines::{EngineBinding, InitFailureKind};
    use crate::generator::testing::FakeModel;
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    const VALID: &str = r#"{"script": [
        {"Speaker 1": "Welcome to the show."},
        {"Speaker 2": "Glad to be here"},
        {"Speaker 1": "Let's begin!"}
    ]}"#;

    fn provider(kind: EngineKind, outcome: FakeOutcome) -> Box<dyn EngineProvider> {
        Box::new(FakeProvider {
            kind,
            outcome,
            probed: Arc::new(Mutex::new(Vec::new())),
        })
    }

    #[test]
    fn test_source_kind_detection() {
        assert_eq!(SourceKind::detect("https://example.com/post"), SourceKind::Website);
        assert_eq!(SourceKind::detect("YouTube Video dQw4w9WgXcQ"), SourceKind::YouTubeVideo);
        assert_eq!(SourceKind::detect("https://youtu.be/dQw4w9WgXcQ"), SourceKind::YouTubeVideo);
        assert_eq!(SourceKind::detect("Pasted Text 3"), SourceKind::Text);
        assert_eq!(SourceKind::detect("report.pdf"), SourceKind::Document);
        assert_eq!(SourceKind::YouTubeVideo.display_name(), "YouTube Video");
    }

    #[test]
    fn test_podcast_dir_name() {
        let now = Local.with_ymd_and_hms(2026, 3, 14, 9, 5, 7).unwrap();
        assert_eq!(podcast_dir_name(now), "podcast_20260314_090507");
    }

    #[test]
    fn test_podcast_dirs_do_not_collide() {
        let root = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2026, 3, 14, 9, 5, 7).unwrap();
        let first = create_podcast_dir(root.path(), now).unwrap();
        let second = create_podcast_dir(root.path(), now).unwrap();
        assert_ne!(first, second);
        assert!(second.ends_with("podcast_20260314_090507_2"));
    }

    #[tokio::test]
    async fn test_generate_with_audio() {
        let root = tempfile::tempdir().unwrap();
        let mut context = PodcastContext::with_providers(
            default_config(),
            Box::new(FakeModel::new(VALID)),
            vec![
                provider(EngineKind::Neural, FakeOutcome::Fail(InitFailureKind::DependencyConflict)),
                provider(EngineKind::Offline, FakeOutcome::Succeed),
            ],
        )
        .await;
        assert_eq!(context.engine_kind(), Some(EngineKind::Offline));

        let request = ScriptRequest::new("content", "https://example.com");
        let output = context.generate(&request, root.path(), true).await.unwrap();

        assert_eq!(output.source_kind, SourceKind::Website);
        assert!(output.script_path.exists());
        assert_eq!(output.script.lines()[1].text, "Glad to be here.");
        match &output.audio {
            AudioOutcome::Ready(report) => {
                assert_eq!(report.synthesized, 3);
                assert!(report.combined.starts_with(&output.output_dir));
                assert!(report.combined.ends_with("complete_podcast.wav"));
            }
            other => panic!("expected audio, got {:?}", other),
        }
        assert_eq!(
            output.audio.primary_file().and_then(|p| p.file_name()),
            Some(std::ffi::OsStr::new("complete_podcast.wav"))
        );
    }

    #[tokio::test]
    async fn test_script_ready_audio_unavailable() {
        let root = tempfile::tempdir().unwrap();
        let mut context = PodcastContext::with_providers(
            default_config(),
            Box::new(FakeModel::new(VALID)),
            vec![provider(EngineKind::Offline, FakeOutcome::Fail(InitFailureKind::MissingDependency))],
        )
        .await;
        assert!(!context.audio_available());

        let output = context
            .generate(&ScriptRequest::new("content", "notes.txt"), root.path(), true)
            .await
            .unwrap();

        assert_eq!(output.script.line_count(), 3);
        match output.audio {
            AudioOutcome::Unavailable { reason } => assert!(reason.contains("offline")),
            other => panic!("expected unavailable audio, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_script_failure_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let mut context = PodcastContext::with_providers(
            default_config(),
            Box::new(FakeModel::new(r#"{"script": [{"Speaker 1": "Alone."}]}"#)),
            vec![provider(EngineKind::Offline, FakeOutcome::Succeed)],
        )
        .await;

        let err = context
            .generate(&ScriptRequest::new("content", "notes.txt"), root.path(), true)
            .await
            .unwrap_err();
        assert!(err.is_script_error());
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_audio_reports_skipped_lines() {
        let root = tempfile::tempdir().unwrap();
        let mut context = PodcastContext::with_providers(
            default_config(),
            Box::new(FakeModel::new(VALID)),
            Vec::new(),
        )
        .await;

        let mut engine = FakeEngine::new(EngineKind::Offline, 22050);
        engine.fail_on = vec![" ".to_string()];
        let binding = EngineBinding::new(Box::new(engine), &context.config.voices);
        context.synthesizer = Some(SegmentSynthesizer::new(binding, &context.config.audio));

        let script = PodcastScript::from_response(VALID, "notes.txt").unwrap();
        match context.render(&script, root.path()).await {
            AudioOutcome::Failed {
                error,
                segment_files,
                skipped,
            } => {
                assert!(error.contains("No audio segments"));
                assert!(segment_files.is_empty());
                assert_eq!(skipped.len(), 3);
                assert_eq!(skipped[2].index, 3);
            }
            other => panic!("expected failed audio, got {:?}", other),
        }
    }
}
