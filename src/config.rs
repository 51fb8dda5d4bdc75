//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__RUN__CREATION_BUDGET=10`）。
//! RunConfig 是单次运行的已校验参数，会话构造前必须通过 `validate`。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;
use crate::llm::{CompletionParams, ModelTier, RetryConfig};
use crate::memory::IndexMetric;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub index: IndexSection,
    pub run: RunSection,
    pub agents: AgentsSection,
}

/// [llm] 段：端点、两档模型、嵌入模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock；openai 无 API Key 时回退到 mock
    pub provider: String,
    pub base_url: Option<String>,
    pub fast_model: String,
    pub capable_model: String,
    pub embedding_model: String,
    /// 执行 Agent 使用的档位
    pub execution_tier: ModelTier,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: None,
            fast_model: "gpt-3.5-turbo".to_string(),
            capable_model: "gpt-4".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            execution_tier: ModelTier::Capable,
            request_timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

/// [index] 段：上下文索引
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// memory / pinecone
    pub backend: String,
    /// 索引名（必填）
    pub name: Option<String>,
    pub dimension: usize,
    pub metric: IndexMetric,
    /// 远程数据面地址
    pub host: Option<String>,
    pub environment: String,
    pub pod_type: String,
    pub namespace: Option<String>,
    /// 启动时不存在则创建
    pub create_if_missing: bool,
    pub timeout_secs: u64,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            name: None,
            dimension: 1536,
            metric: IndexMetric::Cosine,
            host: None,
            environment: "us-east1-gcp".to_string(),
            pod_type: "p1".to_string(),
            namespace: None,
            create_if_missing: true,
            timeout_secs: 30,
        }
    }
}

/// [run] 段：单次运行参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub objective: Option<String>,
    pub first_task: Option<String>,
    pub start_task_id: u64,
    /// 创建任务总数上限（含种子任务），达到后只消费剩余队列
    pub creation_budget: usize,
    /// 执行时检索的上下文条数
    pub context_breadth: usize,
    /// 单个任务最多执行几次
    pub max_task_attempts: u32,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            objective: None,
            first_task: None,
            start_task_id: 1,
            creation_budget: 6,
            context_breadth: 5,
            max_task_attempts: 3,
        }
    }
}

/// [agents.*] 段：每个 Agent 的温度与 token 上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentsSection {
    pub creation: AgentParams,
    pub prioritization: AgentParams,
    pub execution: AgentParams,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            creation: AgentParams::new(0.5, 100),
            prioritization: AgentParams::new(0.5, 100),
            execution: AgentParams::new(0.7, 2000),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AgentParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl AgentParams {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

impl From<AgentParams> for CompletionParams {
    fn from(p: AgentParams) -> Self {
        CompletionParams::new(p.temperature, p.max_tokens)
    }
}

/// 已校验的单次运行配置
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub objective: String,
    pub first_task: String,
    pub start_task_id: u64,
    pub index_name: String,
    pub dimension: usize,
    pub metric: IndexMetric,
    pub execution_tier: ModelTier,
    pub creation_budget: usize,
    pub context_breadth: usize,
    pub max_task_attempts: u32,
    pub creation_params: CompletionParams,
    pub prioritization_params: CompletionParams,
    pub execution_params: CompletionParams,
}

impl RunConfig {
    /// 以给定 objective / first_task 为准（为 None 时取配置文件中的值），其余参数取自 AppConfig
    pub fn from_app(
        cfg: &AppConfig,
        objective: Option<&str>,
        first_task: Option<&str>,
    ) -> Result<Self, AgentError> {
        let objective = objective
            .map(String::from)
            .or_else(|| cfg.run.objective.clone())
            .unwrap_or_default();
        let first_task = first_task
            .map(String::from)
            .or_else(|| cfg.run.first_task.clone())
            .unwrap_or_default();
        let run = Self {
            objective,
            first_task,
            start_task_id: cfg.run.start_task_id,
            index_name: cfg.index.name.clone().unwrap_or_default(),
            dimension: cfg.index.dimension,
            metric: cfg.index.metric,
            execution_tier: cfg.llm.execution_tier,
            creation_budget: cfg.run.creation_budget,
            context_breadth: cfg.run.context_breadth,
            max_task_attempts: cfg.run.max_task_attempts,
            creation_params: cfg.agents.creation.into(),
            prioritization_params: cfg.agents.prioritization.into(),
            execution_params: cfg.agents.execution.into(),
        };
        run.validate()?;
        Ok(run)
    }

    /// 以默认参数构造（测试与嵌入式调用）
    pub fn new(objective: &str, first_task: &str, index_name: &str) -> Self {
        let cfg = AppConfig::default();
        Self {
            objective: objective.to_string(),
            first_task: first_task.to_string(),
            start_task_id: cfg.run.start_task_id,
            index_name: index_name.to_string(),
            dimension: cfg.index.dimension,
            metric: cfg.index.metric,
            execution_tier: cfg.llm.execution_tier,
            creation_budget: cfg.run.creation_budget,
            context_breadth: cfg.run.context_breadth,
            max_task_attempts: cfg.run.max_task_attempts,
            creation_params: cfg.agents.creation.into(),
            prioritization_params: cfg.agents.prioritization.into(),
            execution_params: cfg.agents.execution.into(),
        }
    }

    /// 缺少必填项或取值非法时返回描述性的配置错误
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.objective.trim().is_empty() {
            return Err(AgentError::config("objective is required"));
        }
        if self.first_task.trim().is_empty() {
            return Err(AgentError::config("first task description is required"));
        }
        if self.index_name.trim().is_empty() {
            return Err(AgentError::config("index name is required (index.name / HIVE__INDEX__NAME)"));
        }
        if self.dimension == 0 {
            return Err(AgentError::config("index dimension must be positive"));
        }
        if self.creation_budget == 0 {
            return Err(AgentError::config("creation budget must be at least 1"));
        }
        if self.context_breadth == 0 {
            return Err(AgentError::config("context breadth must be at least 1"));
        }
        if self.max_task_attempts == 0 {
            return Err(AgentError::config("max task attempts must be at least 1"));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
