//! LLM 客户端抽象
//!
//! 每个 LlmClient 实例在构造时绑定一个 ModelTier（Fast / Capable），调用时不再按字符串分支。
//! RetryingLlmClient 为任意客户端加上有界重试与指数退避。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// 模型档位：快速廉价 / 高能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Capable,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelTier::Fast => write!(f, "fast"),
            ModelTier::Capable => write!(f, "capable"),
        }
    }
}

/// 单次完成调用参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionParams {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self::new(0.5, 100)
    }
}

/// 模型调用错误（超时、限流、响应格式异常等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("model request timed out")]
    Timeout,

    #[error("rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("model API error: {0}")]
    Api(String),
}

impl LlmError {
    /// 超时、限流与空响应可重试；其余（鉴权、参数错误）重试无意义
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout
                | LlmError::RateLimited { .. }
                | LlmError::EmptyResponse
                | LlmError::Malformed(_)
        )
    }
}

/// LLM 客户端 trait：按构造时绑定的档位完成 prompt
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回去除首尾空白的文本
    async fn complete(&self, prompt: &str, params: CompletionParams) -> Result<String, LlmError>;

    /// 构造时选定的档位
    fn tier(&self) -> ModelTier;
}

/// 重试配置：最大重试次数与指数退避参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// 不重试（测试与离线模式用）
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// 第 attempt 次重试前的等待时间（attempt 从 0 开始），不超过 max_backoff_ms
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let ms = (self.initial_backoff_ms as f64 * factor).min(self.max_backoff_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// 以有界重试执行一个模型操作；不可重试的错误立即返回
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, label: &str, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let mut delay = config.backoff(attempt);
                if let LlmError::RateLimited { retry_after_ms } = &e {
                    delay = delay.max(Duration::from_millis(*retry_after_ms));
                }
                tracing::warn!(
                    op = label,
                    attempt = attempt + 1,
                    max = config.max_retries,
                    "{} failed ({}), retrying in {:?}",
                    label,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// 带重试的 LLM 客户端包装
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, prompt: &str, params: CompletionParams) -> Result<String, LlmError> {
        let label = format!("complete[{}]", self.inner.tier());
        with_retry(&self.config, &label, || self.inner.complete(prompt, params)).await
    }

    fn tier(&self) -> ModelTier {
        self.inner.tier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.backoff(0), Duration::from_millis(500));
        assert_eq!(cfg.backoff(1), Duration::from_millis(1000));
        assert_eq!(cfg.backoff(10), Duration::from_millis(8000));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::RateLimited { retry_after_ms: 1000 }.is_retryable());
        assert!(!LlmError::Api("invalid api key".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failures() {
        let mock = Arc::new(MockLlmClient::scripted(
            ModelTier::Fast,
            vec![Err(LlmError::Timeout), Err(LlmError::Timeout), Ok("done".into())],
        ));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry(3));
        let out = client.complete("p", CompletionParams::default()).await.unwrap();
        assert_eq!(out, "done");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let mock = Arc::new(MockLlmClient::scripted(
            ModelTier::Capable,
            vec![Err(LlmError::Timeout); 5],
        ));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry(2));
        let err = client.complete("p", CompletionParams::default()).await.unwrap_err();
        assert_eq!(err, LlmError::Timeout);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let mock = Arc::new(MockLlmClient::scripted(
            ModelTier::Fast,
            vec![Err(LlmError::Api("bad request".into())), Ok("never".into())],
        ));
        let client = RetryingLlmClient::new(mock.clone(), fast_retry(3));
        assert!(client.complete("p", CompletionParams::default()).await.is_err());
        assert_eq!(mock.call_count(), 1);
    }
}
