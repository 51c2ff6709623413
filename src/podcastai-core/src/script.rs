//! Podcast script model.
//!
//! Turns raw language-model output into an ordered, strictly alternating
//! two-speaker dialogue and serializes it back to the script JSON format.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PodcastError;

/// Minimum number of usable lines for a script to be accepted.
pub const MIN_SCRIPT_LINES: usize = 2;

/// Lines per estimated minute of audio.
const LINES_PER_MINUTE: usize = 30;

/// Tags whose content is model reasoning rather than script output.
const REASONING_TAGS: [&str; 6] = [
    "think",
    "thinking",
    "reasoning",
    "reflection",
    "analysis",
    "scratchpad",
];

/// One of the two fixed speaker roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    One,
    Two,
}

impl Speaker {
    /// Label used in the script JSON.
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::One => "Speaker 1",
            Speaker::Two => "Speaker 2",
        }
    }

    /// Lowercase form for file names.
    pub fn slug(&self) -> &'static str {
        match self {
            Speaker::One => "speaker_1",
            Speaker::Two => "speaker_2",
        }
    }

    /// The speaker who talks after this one.
    pub fn next(self) -> Self {
        match self {
            Speaker::One => Speaker::Two,
            Speaker::Two => Speaker::One,
        }
    }

    /// Interpret a free-form label from model output.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        match label {
            "Speaker 1" => return Some(Speaker::One),
            "Speaker 2" => return Some(Speaker::Two),
            _ => {}
        }

        let lower = label.to_lowercase();
        if lower.contains('1') || lower.contains("one") {
            Some(Speaker::One)
        } else if lower.contains('2') || lower.contains("two") {
            Some(Speaker::Two)
        } else {
            None
        }
    }
}

/// A single line of dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueLine {
    pub speaker: Speaker,
    /// Non-empty, ends in terminal punctuation.
    pub text: String,
}

impl DialogueLine {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

impl Serialize for DialogueLine {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.speaker.label(), &self.text)?;
        map.end()
    }
}

/// A validated two-speaker podcast script.
#[derive(Debug, Clone, PartialEq)]
pub struct PodcastScript {
    lines: Vec<DialogueLine>,
    source_name: String,
}

#[derive(Serialize)]
struct ScriptDocument<'a> {
    script: &'a [DialogueLine],
    metadata: ScriptMetadata<'a>,
}

#[derive(Serialize)]
struct ScriptMetadata<'a> {
    source_document: &'a str,
    total_lines: usize,
    estimated_duration: String,
}

impl PodcastScript {
    /// Build a script from already-normalized lines.
    ///
    /// Lines must alternate starting with Speaker 1 and carry non-empty,
    /// punctuated text.
    pub fn new(lines: Vec<DialogueLine>, source_name: impl Into<String>) -> Result<Self, PodcastError> {
        if lines.len() < MIN_SCRIPT_LINES {
            return Err(PodcastError::ScriptFormat(format!(
                "Generated script is too short or invalid ({} usable lines)",
                lines.len()
            )));
        }

        let mut expected = Speaker::One;
        for (i, line) in lines.iter().enumerate() {
            if line.speaker != expected {
                return Err(PodcastError::ScriptFormat(format!(
                    "Line {} is spoken by {} but {} was expected",
                    i + 1,
                    line.speaker.label(),
                    expected.label()
                )));
            }
            if line.text.trim().is_empty() {
                return Err(PodcastError::ScriptFormat(format!("Line {} is empty", i + 1)));
            }
            if !line.text.ends_with(['.', '!', '?']) {
                return Err(PodcastError::ScriptFormat(format!(
                    "Line {} does not end in terminal punctuation",
                    i + 1
                )));
            }
            expected = expected.next();
        }

        Ok(Self {
            lines,
            source_name: source_name.into(),
        })
    }

    /// Parse and normalize raw model output.
    pub fn from_response(raw: &str, source_name: impl Into<String>) -> Result<Self, PodcastError> {
        Self::new(parse_script_response(raw)?, source_name)
    }

    /// Load a saved script JSON, taking the source name from its metadata
    /// when present.
    pub fn from_json(text: &str, fallback_source: &str) -> Result<Self, PodcastError> {
        let value = parse_response_json(text)?;
        let source_name = value
            .get("metadata")
            .and_then(|m| m.get("source_document"))
            .and_then(Value::as_str)
            .unwrap_or(fallback_source)
            .to_string();
        Self::new(lines_from_value(&value)?, source_name)
    }

    pub fn lines(&self) -> &[DialogueLine] {
        &self.lines
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Coarse advisory estimate, not derived from synthesized audio.
    pub fn estimated_minutes(&self) -> usize {
        estimate_minutes(self.lines.len())
    }

    pub fn estimated_duration(&self) -> String {
        format!("{} minutes", self.estimated_minutes())
    }

    /// Serialize to the script JSON format.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&ScriptDocument {
            script: &self.lines,
            metadata: ScriptMetadata {
                source_document: &self.source_name,
                total_lines: self.lines.len(),
                estimated_duration: self.estimated_duration(),
            },
        })
    }
}

/// `max(1, line_count / 30)` minutes.
pub fn estimate_minutes(line_count: usize) -> usize {
    (line_count / LINES_PER_MINUTE).max(1)
}

/// Parse raw model output into normalized dialogue lines.
pub fn parse_script_response(raw: &str) -> Result<Vec<DialogueLine>, PodcastError> {
    let value = parse_response_json(raw)?;
    lines_from_value(&value)
}

/// Two-pass JSON parse: as-is, then once more with wrappers stripped.
fn parse_response_json(raw: &str) -> Result<Value, PodcastError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Ok(value),
        Err(first) => {
            warn!(error = %first, "Model response is not valid JSON, retrying after cleanup");
            debug!(raw = %preview(raw), "Raw model response");

            let cleaned = strip_response_wrappers(raw);
            serde_json::from_str::<Value>(&cleaned).map_err(|second| {
                debug!(cleaned = %preview(&cleaned), "Cleaned model response");
                PodcastError::ScriptFormat(format!(
                    "Could not parse model response as JSON: {}",
                    second
                ))
            })
        }
    }
}

fn lines_from_value(value: &Value) -> Result<Vec<DialogueLine>, PodcastError> {
    let entries = value
        .get("script")
        .and_then(Value::as_array)
        .ok_or_else(|| PodcastError::ScriptFormat("Response is missing a 'script' array".to_string()))?;

    let lines = normalize_lines(entries);
    if lines.len() < MIN_SCRIPT_LINES {
        return Err(PodcastError::ScriptFormat(format!(
            "Generated script is too short or invalid ({} usable lines)",
            lines.len()
        )));
    }
    Ok(lines)
}

/// Validate entries and force strict alternation starting at Speaker 1.
///
/// Speakers are assigned by position among the kept lines. A label that
/// names the other speaker is logged and overridden.
pub fn normalize_lines(entries: &[Value]) -> Vec<DialogueLine> {
    let mut lines = Vec::with_capacity(entries.len());
    let mut expected = Speaker::One;

    for (i, entry) in entries.iter().enumerate() {
        let Some((label, dialogue)) = entry
            .as_object()
            .filter(|obj| obj.len() == 1)
            .and_then(|obj| obj.iter().next())
        else {
            debug!(index = i, "Skipping script entry that is not a single-key object");
            continue;
        };

        let Some(dialogue) = dialogue.as_str() else {
            debug!(index = i, "Skipping script entry with non-string dialogue");
            continue;
        };

        let dialogue = dialogue.trim();
        if dialogue.is_empty() {
            continue;
        }

        match Speaker::from_label(label) {
            Some(labeled) if labeled != expected => {
                debug!(
                    index = i,
                    label = %label,
                    assigned = expected.label(),
                    "Reassigning speaker to keep alternation"
                );
            }
            None => {
                debug!(index = i, label = %label, "Unrecognized speaker label");
            }
            _ => {}
        }

        lines.push(DialogueLine::new(expected, ensure_terminal_punctuation(dialogue)));
        expected = expected.next();
    }

    lines
}

/// Append a period unless the text already ends in `.`, `!` or `?`.
pub fn ensure_terminal_punctuation(text: &str) -> String {
    let text = text.trim_end();
    if text.ends_with(['.', '!', '?']) {
        text.to_string()
    } else {
        format!("{}.", text)
    }
}

/// Remove reasoning blocks and a surrounding code fence.
fn strip_response_wrappers(raw: &str) -> String {
    let mut result = raw.to_string();

    for tag in &REASONING_TAGS {
        let pattern = format!(r"(?is)<{tag}[^>]*>.*?</{tag}>", tag = tag);
        if let Ok(re) = regex::Regex::new(&pattern) {
            result = re.replace_all(&result, "").to_string();
        }
    }

    strip_code_fence(&result)
}

/// Strip leading/trailing triple-backtick markers and an optional language tag.
fn strip_code_fence(text: &str) -> String {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(rest.len());
        let after_tag = rest[tag_len..].trim_start();
        // A tag may sit on its own line or run straight into the JSON.
        body = if tag_len > 0 && after_tag.starts_with(['{', '[']) {
            after_tag
        } else {
            rest
        };
        if let Some(inner) = body.trim_end().strip_suffix("```") {
            body = inner;
        }
    }

    body.trim().to_string()
}

/// Cut text to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_content(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

fn preview(text: &str) -> String {
    truncate_content(text, 500)
}
