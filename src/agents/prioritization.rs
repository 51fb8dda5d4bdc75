//! 优先级 Agent：清理格式、重排并重新编号整个队列
//!
//! 行语法：`<整数>.<描述>`，按第一个 '.' 切分，两侧去空白；不符合的行直接丢弃并计数。
//! 解析结果整体替换队列，全部行都不合法时队列变空。

use std::sync::Arc;

use crate::agents::prompts;
use crate::core::{Task, TaskQueue};
use crate::llm::{CompletionParams, LlmClient, LlmError};

/// 解析结果：任务列表与被丢弃的非空行数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTaskList {
    pub tasks: Vec<Task>,
    pub dropped: usize,
}

/// 解析单行；不符合语法返回 None
pub fn parse_task_line(line: &str) -> Option<Task> {
    let (id, name) = line.trim().split_once('.')?;
    let id = id.trim().parse::<u64>().ok()?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Task::new(id, name))
}

/// 解析模型返回的编号列表；空行不计入丢弃数
pub fn parse_prioritized(response: &str) -> ParsedTaskList {
    let mut parsed = ParsedTaskList::default();
    for line in response.lines().filter(|l| !l.trim().is_empty()) {
        match parse_task_line(line) {
            Some(task) => parsed.tasks.push(task),
            None => parsed.dropped += 1,
        }
    }
    parsed
}

pub struct PrioritizationAgent {
    llm: Arc<dyn LlmClient>,
    params: CompletionParams,
}

impl PrioritizationAgent {
    pub fn new(llm: Arc<dyn LlmClient>, params: CompletionParams) -> Self {
        Self { llm, params }
    }

    /// 重排队列：成功时以解析结果整体替换队列；模型失败时队列保持不变
    pub async fn prioritize(
        &self,
        queue: &mut TaskQueue,
        objective: &str,
        next_task_id: u64,
    ) -> Result<ParsedTaskList, LlmError> {
        let prompt = prompts::prioritization(objective, &queue.names(), next_task_id);
        let response = self.llm.complete(&prompt, self.params).await?;
        let parsed = parse_prioritized(&response);
        if parsed.dropped > 0 {
            tracing::warn!(dropped = parsed.dropped, kept = parsed.tasks.len(), "dropped unparsable prioritization lines");
        }
        queue.replace_all(parsed.tasks.clone());
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, ModelTier};

    #[test]
    fn test_parse_line_grammar() {
        assert_eq!(parse_task_line(" 2. Book flights "), Some(Task::new(2, "Book flights")));
        assert_eq!(parse_task_line("3 .Pack bags. Twice"), Some(Task::new(3, "Pack bags. Twice")));
        assert_eq!(parse_task_line("#. First task"), None);
        assert_eq!(parse_task_line("No number here"), None);
        assert_eq!(parse_task_line("4."), None);
        assert_eq!(parse_task_line("-1. negative"), None);
    }

    #[test]
    fn test_parse_counts_dropped_lines() {
        let parsed = parse_prioritized("Here is the list:\n\n5. A\nnonsense\n6. B\n");
        assert_eq!(parsed.tasks, vec![Task::new(5, "A"), Task::new(6, "B")]);
        assert_eq!(parsed.dropped, 2);
    }

    #[tokio::test]
    async fn test_replaces_queue_with_parsed_list() {
        let mock = Arc::new(MockLlmClient::scripted(
            ModelTier::Fast,
            vec![Ok("2. Book flights\n3. Pack bags".into())],
        ));
        let agent = PrioritizationAgent::new(mock.clone(), CompletionParams::default());
        let mut queue = TaskQueue::new();
        queue.enqueue(Task::new(7, "Pack bags"));
        queue.enqueue(Task::new(8, "Book flights"));
        queue.enqueue(Task::new(9, "Something else"));

        let parsed = agent.prioritize(&mut queue, "Plan a trip", 2).await.unwrap();
        assert_eq!(parsed.dropped, 0);
        assert_eq!(
            queue.snapshot(),
            vec![Task::new(2, "Book flights"), Task::new(3, "Pack bags")]
        );
        assert!(mock.prompts()[0].contains("Pack bags, Book flights, Something else"));
    }

    #[tokio::test]
    async fn test_unparsable_response_empties_queue() {
        let mock = Arc::new(MockLlmClient::scripted(
            ModelTier::Fast,
            vec![Ok("I cannot do that.\nSorry".into())],
        ));
        let agent = PrioritizationAgent::new(mock, CompletionParams::default());
        let mut queue = TaskQueue::new();
        queue.enqueue(Task::new(2, "x"));
        let parsed = agent.prioritize(&mut queue, "o", 2).await.unwrap();
        assert_eq!(parsed.dropped, 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_keeps_queue() {
        let mock = Arc::new(MockLlmClient::scripted(ModelTier::Fast, vec![Err(LlmError::Timeout)]));
        let agent = PrioritizationAgent::new(mock, CompletionParams::default());
        let mut queue = TaskQueue::new();
        queue.enqueue(Task::new(2, "x"));
        assert!(agent.prioritize(&mut queue, "o", 2).await.is_err());
        assert_eq!(queue.snapshot(), vec![Task::new(2, "x")]);
    }
}
