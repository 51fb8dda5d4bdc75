//! 会话构建器：由配置统一创建模型、索引与通知通道，再组装 Orchestrator
//!
//! 命令行与 SessionHub 共用这一套初始化逻辑。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, RunConfig};
use crate::core::{AgentError, Orchestrator};
use crate::llm::{
    create_embedder_from_config, EmbeddingProvider, HashingEmbedder, LlmClient, MockLlmClient,
    ModelTier, OpenAiClient, RetryingEmbedder, RetryingLlmClient,
};
use crate::memory::{ContextIndex, InMemoryIndex, PineconeIndex, PineconeSettings};
use crate::notify::{NotificationSink, TracingSink};

/// 两档模型与嵌入提供方；可在多个会话间共享（客户端本身无会话状态）
#[derive(Clone)]
pub struct ModelSet {
    pub fast: Arc<dyn LlmClient>,
    pub capable: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
}

impl ModelSet {
    pub fn for_tier(&self, tier: ModelTier) -> Arc<dyn LlmClient> {
        match tier {
            ModelTier::Fast => self.fast.clone(),
            ModelTier::Capable => self.capable.clone(),
        }
    }

    /// 离线 Mock 组合
    pub fn mock(dimension: usize) -> Self {
        Self {
            fast: Arc::new(MockLlmClient::new(ModelTier::Fast)),
            capable: Arc::new(MockLlmClient::new(ModelTier::Capable)),
            embedder: Arc::new(HashingEmbedder::new(dimension)),
        }
    }

    /// 根据配置与环境变量选择后端（OpenAI 兼容 / Mock），真实客户端外包一层重试
    pub fn from_config(cfg: &AppConfig) -> Self {
        let provider = cfg.llm.provider.to_lowercase();
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        let timeout = Duration::from_secs(cfg.llm.request_timeout_secs);
        let embedder = if provider == "openai" {
            create_embedder_from_config(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.embedding_model,
                api_key.as_deref(),
                cfg.index.dimension,
                timeout,
            )
        } else {
            None
        };

        let Some(embedder) = embedder else {
            tracing::warn!("No API key set or provider is not openai, using Mock LLM");
            return Self::mock(cfg.index.dimension);
        };

        let client = |model: &str, tier: ModelTier| -> Arc<dyn LlmClient> {
            let inner = OpenAiClient::new(cfg.llm.base_url.as_deref(), model, api_key.as_deref(), tier)
                .with_timeout(timeout);
            Arc::new(RetryingLlmClient::new(Arc::new(inner), cfg.llm.retry.clone()))
        };
        tracing::info!(
            fast = %cfg.llm.fast_model,
            capable = %cfg.llm.capable_model,
            "Using OpenAI LLM"
        );
        Self {
            fast: client(&cfg.llm.fast_model, ModelTier::Fast),
            capable: client(&cfg.llm.capable_model, ModelTier::Capable),
            embedder: Arc::new(RetryingEmbedder::new(Arc::new(embedder), cfg.llm.retry.clone())),
        }
    }
}

/// 为一个会话创建索引句柄；远程索引以会话 id 作为默认 namespace，避免并发会话的记录互相覆盖
pub async fn create_index(
    cfg: &AppConfig,
    run: &RunConfig,
    session_id: &str,
) -> Result<Arc<dyn ContextIndex>, AgentError> {
    match cfg.index.backend.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new(
            run.index_name.clone(),
            run.dimension,
            run.metric,
        ))),
        "pinecone" => {
            let api_key = std::env::var("PINECONE_API_KEY").unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!("PINECONE_API_KEY not set, using in-memory index");
                return Ok(Arc::new(InMemoryIndex::new(
                    run.index_name.clone(),
                    run.dimension,
                    run.metric,
                )));
            }
            let host = cfg
                .index
                .host
                .clone()
                .ok_or_else(|| AgentError::config("index.host is required for the pinecone backend"))?;
            let index = PineconeIndex::new(PineconeSettings {
                name: run.index_name.clone(),
                host,
                api_key,
                environment: cfg.index.environment.clone(),
                dimension: run.dimension,
                metric: run.metric,
                pod_type: cfg.index.pod_type.clone(),
                namespace: Some(
                    cfg.index
                        .namespace
                        .clone()
                        .unwrap_or_else(|| session_id.to_string()),
                ),
                timeout_secs: cfg.index.timeout_secs,
            })?;
            if cfg.index.create_if_missing {
                if let Err(e) = index.ensure_exists().await {
                    tracing::warn!(index = %run.index_name, "could not verify remote index: {}", e);
                }
            }
            Ok(Arc::new(index))
        }
        other => Err(AgentError::config(format!("unknown index backend: {}", other))),
    }
}

/// 会话构建器
pub struct SessionBuilder {
    config: AppConfig,
    models: Option<ModelSet>,
    index: Option<Arc<dyn ContextIndex>>,
    sink: Option<Arc<dyn NotificationSink>>,
    session_id: Option<String>,
    cancel_token: Option<CancellationToken>,
}

impl SessionBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            models: None,
            index: None,
            sink: None,
            session_id: None,
            cancel_token: None,
        }
    }

    pub fn with_models(mut self, models: ModelSet) -> Self {
        self.models = Some(models);
        self
    }

    /// 指定索引句柄（否则按 [index] 配置新建）
    pub fn with_index(mut self, index: Arc<dyn ContextIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    /// 校验运行配置并构建处于 Seeded 阶段的会话
    pub async fn build(
        self,
        objective: Option<&str>,
        first_task: Option<&str>,
    ) -> Result<Orchestrator, AgentError> {
        let run = RunConfig::from_app(&self.config, objective, first_task)?;
        let session_id = self
            .session_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let models = self
            .models
            .unwrap_or_else(|| ModelSet::from_config(&self.config));
        let index = match self.index {
            Some(i) => i,
            None => create_index(&self.config, &run, &session_id).await?,
        };
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));

        let orch = Orchestrator::new(session_id, run, &models, index, sink)?;
        Ok(match self.cancel_token {
            Some(t) => orch.with_cancel_token(t),
            None => orch,
        })
    }
}
