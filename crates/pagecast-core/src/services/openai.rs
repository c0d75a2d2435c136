//! OpenAI-backed generation adapter.

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::Engine;
use tracing::debug;

use super::{GenerationError, GenerationRequest, GenerationService, PromptPart};
use crate::config::Config;

/// Chat-completions client used for page analysis, summarization, and
/// script generation.
pub struct OpenAiGeneration {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiGeneration {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
        Self {
            client: Client::with_config(openai_config),
            model: config.openai_model.clone(),
        }
    }
}

#[async_trait]
impl GenerationService for OpenAiGeneration {
    async fn complete(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut messages = Vec::new();

        if let Some(system) = &request.system {
            let msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system.as_str())
                .build()
                .map_err(|e| GenerationError::Service(e.to_string()))?;
            messages.push(ChatCompletionRequestMessage::System(msg));
        }

        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        for part in &request.parts {
            match part {
                PromptPart::Text(text) => {
                    parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                        ChatCompletionRequestMessageContentPartText { text: text.clone() },
                    ));
                }
                PromptPart::PngImage(bytes) => {
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: format!("data:image/png;base64,{encoded}"),
                                detail: Some(ImageDetail::Auto),
                            },
                        },
                    ));
                }
            }
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(parts))
            .build()
            .map_err(|e| GenerationError::Service(e.to_string()))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(messages)
            .max_tokens(request.max_output_tokens);
        if let Some(temperature) = request.temperature {
            builder.temperature(temperature);
        }
        let chat_request = builder
            .build()
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        debug!(model = %self.model, "sending chat completion request");

        let response = tokio::time::timeout(
            request.timeout,
            self.client.chat().create(chat_request),
        )
        .await
        .map_err(|_| GenerationError::Timeout)?
        .map_err(classify_api_error)?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(content.trim().to_string())
    }
}

fn classify_api_error(err: async_openai::error::OpenAIError) -> GenerationError {
    let message = err.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("rate limit") || lowered.contains("429") {
        GenerationError::RateLimited
    } else {
        GenerationError::Service(message)
    }
}
