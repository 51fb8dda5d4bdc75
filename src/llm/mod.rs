//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock），档位、重试与嵌入

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{
    create_embedder_from_config, normalize_for_embedding, EmbeddingProvider, OpenAiEmbedder,
    RetryingEmbedder,
};
pub use mock::{HashingEmbedder, MockLlmClient};
pub use openai::OpenAiClient;
pub use traits::{
    with_retry, CompletionParams, LlmClient, LlmError, ModelTier, RetryConfig, RetryingLlmClient,
};
