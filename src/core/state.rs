//! 会话阶段与运行摘要
//!
//! Seeded → Running → Draining → Completed；Completed 为终态。

use serde::Serialize;

use crate::core::Task;

/// 会话阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// 队列中只有种子任务
    Seeded,
    /// 循环执行中
    Running,
    /// 队列已空，发送完成通知
    Draining,
    Completed,
}

impl SessionPhase {
    /// 合法的阶段迁移
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Seeded, Running) | (Seeded, Draining) | (Running, Running) | (Running, Draining) | (Draining, Completed)
        )
    }
}

/// 一次运行结束后的摘要
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    /// 执行成功的任务（按完成顺序）
    pub completed: Vec<Task>,
    /// 超过尝试上限被放弃的任务
    pub abandoned: Vec<Task>,
    /// 已创建任务总数（含种子任务）
    pub tasks_created: usize,
    pub creation_rounds: usize,
    pub iterations: usize,
    /// 优先级解析丢弃的行数（累计）
    pub dropped_lines: usize,
}
