//! 任务队列：有序、可变的待执行任务集合
//!
//! 两种变更方式：append（新建任务追加到队尾）与 replace_all（优先级重排后整体替换）。
//! 不去重、无容量上限。

use std::collections::VecDeque;

use serde::Serialize;

use crate::core::AgentError;

/// 任务：id + 描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: u64,
    pub name: String,
}

impl Task {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    /// 取出队首任务
    pub fn dequeue_front(&mut self) -> Result<Task, AgentError> {
        self.tasks.pop_front().ok_or(AgentError::EmptyQueue)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// 当前顺序的完整拷贝，不修改队列
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.iter().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.name.clone()).collect()
    }

    /// 丢弃现有内容并装入新的有序序列
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut q = TaskQueue::new();
        q.enqueue(Task::new(1, "a"));
        q.enqueue(Task::new(2, "b"));
        assert_eq!(q.dequeue_front().unwrap(), Task::new(1, "a"));
        assert_eq!(q.dequeue_front().unwrap(), Task::new(2, "b"));
        assert!(q.is_empty());
    }

    #[test]
    fn test_dequeue_empty_fails() {
        let mut q = TaskQueue::new();
        assert!(matches!(q.dequeue_front(), Err(AgentError::EmptyQueue)));
    }

    #[test]
    fn test_replace_all_sets_new_order() {
        let mut q = TaskQueue::new();
        q.enqueue(Task::new(1, "old"));
        q.replace_all(vec![Task::new(5, "x"), Task::new(3, "y")]);
        assert_eq!(q.len(), 2);
        assert_eq!(q.dequeue_front().unwrap().id, 5);
        assert_eq!(q.dequeue_front().unwrap().id, 3);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut q = TaskQueue::new();
        q.enqueue(Task::new(1, "a"));
        q.enqueue(Task::new(1, "a"));
        assert_eq!(q.snapshot().len(), 2);
        assert_eq!(q.len(), 2);
        assert_eq!(q.names(), vec!["a".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Task::new(3, "Pack bags").to_string(), "3: Pack bags");
    }
}
