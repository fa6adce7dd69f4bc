//! services/api/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the text-generation LLM.
//! It implements the `GenerationService` port from the `core` crate.

use std::future::Future;
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
    },
    Client,
};
use async_trait::async_trait;
use manuscript_core::ports::{GenerationRequest, GenerationService, PortError, PortResult};
use tracing::{info, warn};

/// A timed-out call is sent once more; any other failure is final.
const ATTEMPTS_ON_TIMEOUT: u32 = 2;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerationService` using an OpenAI-compatible chat API.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String, timeout: Duration) -> Self {
        Self {
            client,
            model,
            timeout,
        }
    }

    async fn create_with_timeout(
        &self,
        request: CreateChatCompletionRequest,
    ) -> PortResult<CreateChatCompletionResponse> {
        retry_on_timeout(self.timeout, ATTEMPTS_ON_TIMEOUT, || {
            let request = request.clone();
            async move {
                // Call the API and manually map the error if it occurs, which respects the orphan rule.
                self.client
                    .chat()
                    .create(request)
                    .await
                    .map_err(|e: OpenAIError| PortError::Service(e.to_string()))
            }
        })
        .await
    }
}

/// Runs `call` under `timeout`, starting it again only when it timed out.
///
/// Any completed result, success or error, is returned as-is. After `attempts`
/// timeouts the call fails with `PortError::Timeout`.
async fn retry_on_timeout<T, F, Fut>(timeout: Duration, attempts: u32, mut call: F) -> PortResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PortResult<T>>,
{
    for attempt in 1..=attempts {
        match tokio::time::timeout(timeout, call()).await {
            Ok(result) => return result,
            Err(_) => warn!(
                "Generation request timed out after {}s (attempt {} of {}).",
                timeout.as_secs(),
                attempt,
                attempts
            ),
        }
    }
    Err(PortError::Timeout(timeout.as_secs()))
}

//=========================================================================================
// `GenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationService for OpenAiGenerationAdapter {
    /// Sends the prompt as a single user message and returns the first choice's text.
    async fn generate(&self, request: &GenerationRequest) -> PortResult<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.clone())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into()];

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_completion_tokens(request.max_output_tokens)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self.create_with_timeout(chat_request).await?;
        if let Some(usage) = &response.usage {
            info!(
                "Generation used {} prompt and {} completion tokens.",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        // Extract the text content from the first choice in the response.
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Service("The generation service returned no text content.".to_string())
            })
    }
}
