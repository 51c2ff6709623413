//! Script generation through an OpenAI-compatible chat model.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{Config, LlmConfig};
use crate::error::PodcastError;
use crate::script::{truncate_content, PodcastScript};

/// Source text beyond this many characters is cut before prompting.
pub const MAX_CONTENT_CHARS: usize = 8000;

const MAX_API_ATTEMPTS: u32 = 3;

/// Anything that can turn a prompt into a completion.
#[async_trait]
pub trait ScriptModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, PodcastError>;
}

/// Chat model reached through async-openai.
pub struct OpenAiScriptModel {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiScriptModel {
    pub fn new(llm: &LlmConfig, api_key: &str) -> Result<Self, PodcastError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                PodcastError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(&llm.api_base);

        info!(model = %llm.model, "Podcast script model initialized");

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            model: llm.model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
        })
    }
}

#[async_trait]
impl ScriptModel for OpenAiScriptModel {
    fn name(&self) -> &str {
        &self.model
    }

    /// Retries transport and API failures with exponential backoff.
    async fn complete(&self, prompt: &str) -> Result<String, PodcastError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens)
            .messages(vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: prompt.to_string().into(),
                    name: None,
                },
            )])
            .build()?;

        let mut last_error = None;

        for attempt in 0..MAX_API_ATTEMPTS {
            if attempt > 0 {
                // 2s, 4s
                let delay = Duration::from_secs(1 << attempt);
                warn!(attempt = attempt + 1, ?delay, "Retrying model request");
                tokio::time::sleep(delay).await;
            }

            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default();
                    return Ok(content);
                }
                Err(e) => {
                    warn!(error = %e, "Model request failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.map(PodcastError::from).unwrap_or_else(|| {
            PodcastError::ConfigError("Unknown API error after retries".to_string())
        }))
    }
}

/// Everything needed to write one script.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub text_content: String,
    pub source_name: String,
    pub style: String,
    pub target_duration: String,
}

impl ScriptRequest {
    pub fn new(text_content: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self {
            text_content: text_content.into(),
            source_name: source_name.into(),
            style: "Conversational".to_string(),
            target_duration: "10 minutes".to_string(),
        }
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = style.into();
        self
    }

    pub fn with_target_duration(mut self, target_duration: impl Into<String>) -> Self {
        self.target_duration = target_duration.into();
        self
    }
}

/// Prompts the model and validates its output into a `PodcastScript`.
pub struct ScriptGenerator {
    model: Box<dyn ScriptModel>,
    config: Config,
}

impl ScriptGenerator {
    pub fn new(model: Box<dyn ScriptModel>, config: Config) -> Self {
        Self { model, config }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Build the prompt for a request, truncating long source text.
    pub fn build_prompt(&self, request: &ScriptRequest) -> String {
        let original_chars = request.text_content.chars().count();
        if original_chars > MAX_CONTENT_CHARS {
            debug!(original_chars, "Truncating source text before prompting");
        }
        let content = truncate_content(&request.text_content, MAX_CONTENT_CHARS);

        self.config.script_prompt(
            &request.style,
            &request.source_name,
            &request.target_duration,
            &content,
        )
    }

    /// Generate a script. A response that cannot be parsed is a
    /// `ScriptFormat` error; the caller decides whether to ask again.
    pub async fn generate(&self, request: &ScriptRequest) -> Result<PodcastScript, PodcastError> {
        info!(source = %request.source_name, style = %request.style, "Generating podcast script");

        let prompt = self.build_prompt(request);
        let response = self.model.complete(&prompt).await?;

        match PodcastScript::from_response(&response, request.source_name.as_str()) {
            Ok(script) => {
                info!(
                    lines = script.line_count(),
                    estimated = %script.estimated_duration(),
                    "Generated podcast script"
                );
                Ok(script)
            }
            Err(e) => {
                error!(error = %e, "Error generating script");
                Err(e)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeModel;
    use super::*;
    use crate::config::default_config;
    use crate::script::Speaker;
    use std::sync::Arc;

    const VALID: &str = r#"{"script": [{"Speaker 1": "Hello."}, {"Speaker 2": "Hi there"}]}"#;

    #[tokio::test]
    async fn test_generate_valid_script() {
        let generator = ScriptGenerator::new(Box::new(FakeModel::new(VALID)), default_config());
        let request = ScriptRequest::new("Some content", "notes.md");

        let script = generator.generate(&request).await.unwrap();
        assert_eq!(script.line_count(), 2);
        assert_eq!(script.lines()[1].speaker, Speaker::Two);
        assert_eq!(script.lines()[1].text, "Hi there.");
        assert_eq!(script.source_name(), "notes.md");
    }

    #[tokio::test]
    async fn test_generate_fenced_response() {
        let fenced = format!("```json\n{}\n```", VALID);
        let generator = ScriptGenerator::new(Box::new(FakeModel::new(fenced)), default_config());
        let script = generator
            .generate(&ScriptRequest::new("x", "y"))
            .await
            .unwrap();
        assert_eq!(script.line_count(), 2);
    }

    #[tokio::test]
    async fn test_generate_garbage_is_format_error() {
        let generator = ScriptGenerator::new(Box::new(FakeModel::new("I can't do that")), default_config());
        let result = generator.generate(&ScriptRequest::new("x", "y")).await;
        assert!(matches!(result, Err(PodcastError::ScriptFormat(_))));
    }

    #[tokio::test]
    async fn test_prompt_carries_request_fields() {
        let model = FakeModel::new(VALID);
        let prompts = Arc::clone(&model.prompts);
        let generator = ScriptGenerator::new(Box::new(model), default_config());
        let request = ScriptRequest::new("The body text.", "paper.pdf")
            .with_style("Educational")
            .with_target_duration("5 minutes");

        generator.generate(&request).await.unwrap();

        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Source: paper.pdf"));
        assert!(prompts[0].contains("Style: Educational"));
        assert!(prompts[0].contains("Target Duration: 5 minutes"));
        assert!(prompts[0].contains("The body text."));
    }

    #[test]
    fn test_long_content_is_truncated() {
        let generator = ScriptGenerator::new(Box::new(FakeModel::new(VALID)), default_config());
        let long = "a".repeat(MAX_CONTENT_CHARS + 500);
        let prompt = generator.build_prompt(&ScriptRequest::new(long, "big.txt"));

        let run = format!("{}...", "a".repeat(MAX_CONTENT_CHARS));
        assert!(prompt.contains(&run));
        assert!(!prompt.contains(&"a".repeat(MAX_CONTENT_CHARS + 1)));
    }
}
