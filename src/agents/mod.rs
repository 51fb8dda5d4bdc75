//! Agent 层：任务创建、优先级重排、任务执行（含上下文检索）

pub mod creation;
pub mod execution;
pub mod prioritization;
pub mod prompts;

pub use creation::TaskCreationAgent;
pub use execution::{ContextEntry, ExecutionAgent, ExecutionResult};
pub use prioritization::{parse_prioritized, parse_task_line, ParsedTaskList, PrioritizationAgent};
