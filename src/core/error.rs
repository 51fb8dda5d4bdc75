//! 会话错误类型
//!
//! 配置错误在会话构造时立即返回；模型 / 索引错误在循环内多数被降级处理，只有取消会终止运行。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::IndexError;

/// 会话运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Task queue is empty")]
    EmptyQueue,

    /// 模型重试耗尽后某一步失败；受影响任务会被放回队尾
    #[error("Task {task_id} failed: {source}")]
    TaskExecution {
        task_id: u64,
        #[source]
        source: LlmError,
    },

    /// 远程索引客户端无法构造（会话构建阶段）
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Session task failed: {0}")]
    Join(String),
}

impl AgentError {
    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::Config(msg.into())
    }
}
