//! 核心编排层：错误、任务队列、会话阶段、会话编排、构建器、取消监管、多会话中枢

pub mod builder;
pub mod error;
pub mod hub;
pub mod orchestrator;
pub mod queue;
pub mod state;
pub mod supervisor;

pub use builder::{create_index, ModelSet, SessionBuilder};
pub use error::AgentError;
pub use hub::SessionHub;
pub use orchestrator::Orchestrator;
pub use queue::{Task, TaskQueue};
pub use state::{RunSummary, SessionPhase};
pub use supervisor::SessionSupervisor;
