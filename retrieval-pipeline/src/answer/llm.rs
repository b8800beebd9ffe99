use std::{sync::Arc, time::Duration};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use common::error::AppError;

/// Generation knobs forwarded to the endpoint. `context_window` caps the
/// completion budget when the backend supports it.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub context_window: Option<u32>,
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            repetition_penalty: 1.1,
            context_window: None,
            timeout: Duration::from_millis(120_000),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub usage: ChatUsage,
}

/// Boundary to the external LLM endpoint, kept as a trait so synthesis can
/// run against scripted fakes in tests.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> Result<ChatOutcome, AppError>;
}

pub struct OpenAiChat {
    client: Arc<Client<OpenAIConfig>>,
    model: String,
}

impl OpenAiChat {
    pub fn new(client: Arc<Client<OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn generate(
        &self,
        system: &str,
        user: &str,
        options: &GenerationOptions,
    ) -> Result<ChatOutcome, AppError> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(self.model.clone())
            .messages([
                ChatCompletionRequestSystemMessage::from(system.to_owned()).into(),
                ChatCompletionRequestUserMessage::from(user.to_owned()).into(),
            ])
            .temperature(options.temperature)
            .top_p(options.top_p)
            .frequency_penalty((options.repetition_penalty - 1.0).clamp(-2.0, 2.0));
        if let Some(window) = options.context_window {
            builder.max_completion_tokens(window);
        }
        let request = builder.build()?;

        let response = tokio::time::timeout(options.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                AppError::Processing(format!(
                    "chat completion timed out after {}ms",
                    options.timeout.as_millis()
                ))
            })??;

        let text = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::Processing("No content found in LLM response".into()))?;

        let usage = response
            .usage
            .map(|usage| ChatUsage {
                prompt_tokens: Some(usage.prompt_tokens),
                completion_tokens: Some(usage.completion_tokens),
            })
            .unwrap_or_default();

        Ok(ChatOutcome { text, usage })
    }
}
