//! 嵌入 API：供上下文索引使用，调用 OpenAI 兼容的 /embeddings 端点

use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::openai::classify_error;
use crate::llm::{with_retry, LlmError, RetryConfig};

/// 嵌入提供方：将文本编码为固定维度向量
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// 输出向量维度
    fn dimension(&self) -> usize;
}

/// 嵌入前的文本归一化：换行替换为空格
pub fn normalize_for_embedding(text: &str) -> String {
    text.replace('\n', " ")
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl OpenAiEmbedder {
    /// 从环境变量与可选 base_url 创建（与 LLM 共用 OPENAI_API_KEY / base_url）
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>, dimension: usize) -> Self {
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
            dimension,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let text = normalize_for_embedding(text);
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text))
            .build()
            .map_err(|e| LlmError::Malformed(e.to_string()))?;
        let response = tokio::time::timeout(self.timeout, self.client.embeddings().create(request))
            .await
            .map_err(|_| LlmError::Timeout)?
            .map_err(classify_error)?;
        let vec = response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or(LlmError::EmptyResponse)?;
        if vec.len() != self.dimension {
            return Err(LlmError::Malformed(format!(
                "embedding has {} dimensions, expected {}",
                vec.len(),
                self.dimension
            )));
        }
        Ok(vec)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 带重试的嵌入提供方包装
pub struct RetryingEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    config: RetryConfig,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        with_retry(&self.config, "embed", || self.inner.embed(text)).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// 从应用配置创建嵌入提供方；无可用 API Key 时返回 None
pub fn create_embedder_from_config(
    base_url: Option<&str>,
    model: &str,
    api_key: Option<&str>,
    dimension: usize,
    timeout: Duration,
) -> Option<OpenAiEmbedder> {
    let key = api_key
        .map(String::from)
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    if key.as_deref().unwrap_or("").is_empty() || key.as_deref() == Some("sk-placeholder") {
        tracing::debug!("embedding skipped: no OPENAI_API_KEY");
        return None;
    }
    Some(OpenAiEmbedder::new(base_url, model, key.as_deref(), dimension).with_timeout(timeout))
}
