//! Neural engine backed by kokoro-tiny.

use async_trait::async_trait;
use kokoro_tiny::TtsEngine;
use tracing::{debug, info};

use super::{EngineInitError, EngineKind, EngineProvider, SpeechEngine};
use crate::audio::Waveform;
use crate::error::PodcastError;

/// Native output rate of the kokoro model.
pub const NEURAL_SAMPLE_RATE: u32 = 24000;

/// Kokoro has a strict limit on input length per call.
const MAX_CHUNK_CHARS: usize = 200;

/// Silence between chunks of one line (0.3 seconds).
const CHUNK_GAP_SAMPLES: usize = (NEURAL_SAMPLE_RATE as usize * 3) / 10;

#[derive(Debug, Default)]
pub struct NeuralEngineProvider;

impl NeuralEngineProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EngineProvider for NeuralEngineProvider {
    fn kind(&self) -> EngineKind {
        EngineKind::Neural
    }

    /// Loads the model, downloading it on first run.
    async fn initialize(&self) -> Result<Box<dyn SpeechEngine>, EngineInitError> {
        let engine = TtsEngine::new()
            .await
            .map_err(|e| EngineInitError::classified(self.kind().name(), format!("{}", e)))?;

        info!(voices = engine.voices().len(), "Kokoro model loaded");
        Ok(Box::new(NeuralEngine { engine }))
    }
}

/// Uses the model's default voice for every speaker.
pub struct NeuralEngine {
    engine: TtsEngine,
}

#[async_trait]
impl SpeechEngine for NeuralEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Neural
    }

    async fn synthesize(&mut self, text: &str, _voice: Option<&str>) -> Result<Waveform, PodcastError> {
        let chunks = split_into_chunks(text, MAX_CHUNK_CHARS);
        debug!(chunks = chunks.len(), "Synthesizing with kokoro");

        let mut all_samples = Vec::new();

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                all_samples.extend(std::iter::repeat_n(0.0, CHUNK_GAP_SAMPLES));
            }

            let samples = self
                .engine
                .synthesize(chunk, None)
                .map_err(|e| PodcastError::Engine(format!("Kokoro synthesis failed: {}", e)))?;
            all_samples.extend(samples);
        }

        Ok(Waveform::mono(all_samples, NEURAL_SAMPLE_RATE))
    }
}

/// Split text into chunks that are safe for kokoro synthesis.
///
/// Sentences are packed together up to `max_chars`. A sentence longer than
/// that is split at commas, and a comma part still too long at spaces.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if sentence.len() <= max_chars {
            append_piece(&mut chunks, &mut current_chunk, sentence, max_chars);
            continue;
        }

        for part in sentence.split_inclusive(',') {
            let part = part.trim();
            if part.len() <= max_chars {
                append_piece(&mut chunks, &mut current_chunk, part, max_chars);
            } else {
                for word in part.split_whitespace() {
                    append_piece(&mut chunks, &mut current_chunk, word, max_chars);
                }
            }
        }
    }

    if !current_chunk.is_empty() {
        chunks.push(current_chunk);
    }

    chunks
}

fn append_piece(chunks: &mut Vec<String>, current_chunk: &mut String, piece: &str, max_chars: usize) {
    if piece.is_empty() {
        return;
    }
    if !current_chunk.is_empty() && current_chunk.len() + 1 + piece.len() > max_chars {
        chunks.push(std::mem::take(current_chunk));
    }
    if !current_chunk.is_empty() {
        current_chunk.push(' ');
    }
    current_chunk.push_str(piece);
}
