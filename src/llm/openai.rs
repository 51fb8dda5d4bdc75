//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；每个实例绑定一个档位与模型名。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{CompletionParams, LlmClient, LlmError, ModelTier};

/// 将 async-openai 错误归类为 LlmError（限流 / 超时 / 格式 / 其它）
pub(crate) fn classify_error(e: OpenAIError) -> LlmError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") {
        LlmError::RateLimited { retry_after_ms: 0 }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        LlmError::Timeout
    } else if lower.contains("deserialize") {
        LlmError::Malformed(msg)
    } else {
        LlmError::Api(msg)
    }
}

/// OpenAI 兼容客户端：prompt 作为单条 user 消息发送，取首条 choice 的 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    tier: ModelTier,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>, tier: ModelTier) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            tier,
            timeout: Duration::from_secs(60),
        }
    }

    /// 单次请求超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &str, params: CompletionParams) -> Result<String, LlmError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestMessage::User(message)])
            .temperature(params.temperature)
            .max_completion_tokens(params.max_tokens)
            .n(1)
            .build()
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        tracing::debug!(model = %self.model, tier = %self.tier, prompt_chars = prompt.len(), "chat completion");

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(classify_error)?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "usage"
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .ok_or(LlmError::EmptyResponse)
    }

    fn tier(&self) -> ModelTier {
        self.tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_keeps_tier_and_model() {
        let c = OpenAiClient::new(None, "gpt-4", Some("sk-test"), ModelTier::Capable);
        assert_eq!(c.tier(), ModelTier::Capable);
        assert_eq!(c.model(), "gpt-4");
    }

    #[test]
    fn test_classify_invalid_argument() {
        let e = classify_error(OpenAIError::InvalidArgument("bad".into()));
        assert!(matches!(e, LlmError::Api(_)));
    }
}
