//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::PodcastError;
use crate::script::Speaker;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub voices: VoicesConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl Default for Config {
    fn default() -> Self {
        default_config()
    }
}

/// Language model settings for script generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// OpenAI-compatible API base URL.
    pub api_base: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            api_base: "https://openrouter.ai/api/v1".to_string(),
        }
    }
}

/// Output audio settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Canonical sample rate every segment is normalized to.
    pub sample_rate: u32,
    /// Silence inserted between consecutive segments.
    pub pause_seconds: f32,
    /// Write each segment to its own WAV file before combining.
    pub keep_segments: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            pause_seconds: 0.5,
            keep_segments: false,
        }
    }
}

/// Which synthesis engines may be probed, plus their backend settings.
///
/// The probing order itself is fixed: neural, cloud, offline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub neural: bool,
    pub cloud: bool,
    pub offline: bool,
    pub cloud_api_base: String,
    pub cloud_model: String,
    /// Words per minute for the offline engine.
    pub offline_rate: u32,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            neural: true,
            cloud: true,
            offline: true,
            cloud_api_base: "https://api.openai.com/v1".to_string(),
            cloud_model: "tts-1".to_string(),
            offline_rate: 150,
        }
    }
}

/// One voice per speaker role.
#[derive(Debug, Clone, Deserialize)]
pub struct VoicePair {
    pub speaker_1: String,
    pub speaker_2: String,
}

impl VoicePair {
    pub fn new(speaker_1: impl Into<String>, speaker_2: impl Into<String>) -> Self {
        Self {
            speaker_1: speaker_1.into(),
            speaker_2: speaker_2.into(),
        }
    }

    pub fn voice_for(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::One => &self.speaker_1,
            Speaker::Two => &self.speaker_2,
        }
    }
}

/// Voice configuration for engines that support distinct voices.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub cloud: VoicePair,
    pub offline: VoicePair,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            cloud: VoicePair::new("alloy", "onyx"),
            offline: VoicePair::new("en-us", "en-gb"),
        }
    }
}

/// Prompt templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub script_template: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            script_template: DEFAULT_SCRIPT_PROMPT.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PodcastError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| PodcastError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, PodcastError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| PodcastError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PodcastError> {
        if self.audio.sample_rate == 0 {
            return Err(PodcastError::ConfigError(
                "audio.sample_rate must be greater than zero".to_string(),
            ));
        }
        if !(self.audio.pause_seconds >= 0.0) {
            return Err(PodcastError::ConfigError(
                "audio.pause_seconds must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Build the script-writing prompt, with placeholders replaced.
    pub fn script_prompt(
        &self,
        style: &str,
        source_name: &str,
        target_duration: &str,
        content: &str,
    ) -> String {
        // {content} goes last so source text containing braces is left alone.
        self.prompts
            .script_template
            .replace("{style_lower}", &style.to_lowercase())
            .replace("{style}", style)
            .replace("{source_name}", source_name)
            .replace("{target_duration}", target_duration)
            .replace("{content}", content)
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        llm: LlmConfig::default(),
        audio: AudioConfig::default(),
        engines: EnginesConfig::default(),
        voices: VoicesConfig::default(),
        prompts: PromptsConfig::default(),
    }
}

const DEFAULT_SCRIPT_PROMPT: &str = r#"You are a professional podcast script writer. Create a {style_lower} podcast script based on the following content.

Source: {source_name}
Style: {style}
Target Duration: {target_duration}

Content:
{content}

Create a dialogue between two speakers (Speaker 1 and Speaker 2) discussing the key points from the content. Make it engaging, informative, and natural.

Requirements:
- Use exactly two speakers: "Speaker 1" and "Speaker 2"
- Alternate between speakers
- Each dialogue should be a complete thought or sentence
- Keep responses concise but informative
- Aim for approximately {target_duration} of content
- Make it sound like a natural conversation

Respond with a valid JSON object containing a 'script' array. Each array element should be an object with either 'Speaker 1' or 'Speaker 2' as the key and their dialogue as the value.

Example format:
{
  "script": [
    {"Speaker 1": "Welcome to today's podcast. Let's discuss the key points from our source."},
    {"Speaker 2": "Absolutely! I found the content very interesting, especially..."},
    {"Speaker 1": "That's a great point. What do you think about..."}
  ]
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.audio.sample_rate, 22050);
        assert_eq!(config.audio.pause_seconds, 0.5);
        assert!(!config.audio.keep_segments);
        assert!(config.engines.neural && config.engines.cloud && config.engines.offline);
        assert_eq!(config.llm.max_tokens, 4000);
    }

    #[test]
    fn test_partial_config_overrides() {
        let config = Config::from_str(
            r#"
            [audio]
            sample_rate = 16000

            [engines]
            neural = false

            [voices.offline]
            speaker_1 = "en+m3"
            speaker_2 = "en+f3"
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.pause_seconds, 0.5);
        assert!(!config.engines.neural);
        assert!(config.engines.cloud);
        assert_eq!(config.voices.offline.voice_for(Speaker::Two), "en+f3");
        assert_eq!(config.voices.cloud.voice_for(Speaker::One), "alloy");
    }

    #[test]
    fn test_zero_sample_rate_rejected() {
        let result = Config::from_str("[audio]\nsample_rate = 0\n");
        assert!(matches!(result, Err(PodcastError::ConfigError(_))));
    }

    #[test]
    fn test_script_prompt_placeholders() {
        let config = default_config();
        let prompt = config.script_prompt("Educational", "notes.pdf", "5 minutes", "Body {text}");
        assert!(prompt.contains("Create a educational podcast script"));
        assert!(prompt.contains("Source: notes.pdf"));
        assert!(prompt.contains("Aim for approximately 5 minutes of content"));
        assert!(prompt.contains("Body {text}"));
        assert!(!prompt.contains("{source_name}"));
    }
}
