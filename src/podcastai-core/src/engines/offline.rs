//! Offline engine driving a local espeak-ng binary.

use async_trait::async_trait;
use std::env;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{EngineInitError, EngineKind, EngineProvider, InitFailureKind, SpeechEngine};
use crate::audio::{decode_wav, Waveform};
use crate::error::PodcastError;

const DEFAULT_PROGRAM: &str = "espeak-ng";

#[derive(Debug, Clone)]
pub struct OfflineEngineProvider {
    program: String,
    rate: u32,
}

impl OfflineEngineProvider {
    pub fn new(rate: u32) -> Self {
        Self::with_program(DEFAULT_PROGRAM, rate)
    }

    pub fn with_program(program: impl Into<String>, rate: u32) -> Self {
        Self {
            program: program.into(),
            rate,
        }
    }
}

#[async_trait]
impl EngineProvider for OfflineEngineProvider {
    fn kind(&self) -> EngineKind {
        EngineKind::Offline
    }

    async fn initialize(&self) -> Result<Box<dyn SpeechEngine>, EngineInitError> {
        let name = self.kind().name();
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .await
            .map_err(|e| {
                let kind = if e.kind() == ErrorKind::NotFound {
                    InitFailureKind::MissingDependency
                } else {
                    InitFailureKind::Failed
                };
                EngineInitError::new(name, kind, format!("{}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(EngineInitError::classified(
                name,
                format!(
                    "{} --version failed: {}",
                    self.program,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        debug!(
            version = %String::from_utf8_lossy(&output.stdout).trim(),
            "espeak-ng available"
        );

        Ok(Box::new(OfflineEngine {
            program: self.program.clone(),
            rate: self.rate,
            active_voice: None,
            scratch_dir: env::temp_dir(),
        }))
    }
}

/// Stateful engine: the active voice is switched per call.
pub struct OfflineEngine {
    program: String,
    rate: u32,
    active_voice: Option<String>,
    /// Where per-call WAV files are created.
    scratch_dir: PathBuf,
}

impl OfflineEngine {
    fn switch_voice(&mut self, voice: Option<&str>) {
        let voice = voice.map(str::to_string);
        if self.active_voice != voice {
            debug!(voice = ?voice, "Switching offline voice");
            self.active_voice = voice;
        }
    }
}

#[async_trait]
impl SpeechEngine for OfflineEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Offline
    }

    async fn synthesize(&mut self, text: &str, voice: Option<&str>) -> Result<Waveform, PodcastError> {
        self.switch_voice(voice);

        // Removed when dropped, on success and on every error path.
        let temp_file = tempfile::Builder::new()
            .prefix("podcast_segment_")
            .suffix(".wav")
            .tempfile_in(&self.scratch_dir)?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("-s").arg(self.rate.to_string());
        if let Some(ref voice) = self.active_voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg("-w")
            .arg(temp_file.path())
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| PodcastError::Engine(format!("Failed to run {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(PodcastError::Engine(format!(
                "{} failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let reader = hound::WavReader::open(temp_file.path())?;
        decode_wav(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_missing_dependency() {
        let provider = OfflineEngineProvider::with_program("definitely-not-a-real-tts-binary", 150);
        match provider.initialize().await {
            Err(e) => {
                assert_eq!(e.kind, InitFailureKind::MissingDependency);
                assert_eq!(e.engine, "offline");
            }
            Ok(_) => panic!("initialization should fail without the binary"),
        }
    }

    fn engine(program: &str, scratch_dir: PathBuf) -> OfflineEngine {
        OfflineEngine {
            program: program.to_string(),
            rate: 150,
            active_voice: None,
            scratch_dir,
        }
    }

    fn leftover_segments(dir: &std::path::Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("podcast_segment_"))
            .collect()
    }

    #[tokio::test]
    async fn test_failed_run_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine("false", dir.path().to_path_buf());

        let result = engine.synthesize("Hello there.", Some("en-us")).await;
        assert!(result.is_err());
        assert!(leftover_segments(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = engine("definitely-not-a-real-tts-binary", dir.path().to_path_buf());

        let result = engine.synthesize("Hello there.", None).await;
        assert!(matches!(result, Err(PodcastError::Engine(_))));
        assert!(leftover_segments(dir.path()).is_empty());
    }

    #[test]
    fn test_switch_voice_tracks_active_voice() {
        let mut engine = engine(DEFAULT_PROGRAM, env::temp_dir());
        engine.switch_voice(Some("en-gb"));
        assert_eq!(engine.active_voice.as_deref(), Some("en-gb"));
        engine.switch_voice(None);
        assert_eq!(engine.active_voice, None);
    }
}
