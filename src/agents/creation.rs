//! 任务创建 Agent：根据最近一次执行结果提出新任务
//!
//! 与待办任务不重叠只是 prompt 上的要求，这里不做程序化去重。返回的任务没有 id，由会话按入队顺序分配。

use std::sync::Arc;

use crate::agents::{prompts, ExecutionResult};
use crate::llm::{CompletionParams, LlmClient, LlmError};

pub struct TaskCreationAgent {
    llm: Arc<dyn LlmClient>,
    params: CompletionParams,
}

impl TaskCreationAgent {
    pub fn new(llm: Arc<dyn LlmClient>, params: CompletionParams) -> Self {
        Self { llm, params }
    }

    /// 返回候选任务描述（响应中每个非空行一条）
    pub async fn create_tasks(
        &self,
        objective: &str,
        result: &ExecutionResult,
        pending: &[String],
    ) -> Result<Vec<String>, LlmError> {
        let prompt = prompts::task_creation(objective, &result.text, &result.task.name, pending);
        let response = self.llm.complete(&prompt, self.params).await?;
        Ok(split_candidates(&response))
    }
}

fn split_candidates(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Task;
    use crate::llm::{MockLlmClient, ModelTier};

    #[tokio::test]
    async fn test_each_non_empty_line_is_a_candidate() {
        let mock = Arc::new(MockLlmClient::scripted(
            ModelTier::Fast,
            vec![Ok("Book flights\n\n  Reserve hotel  \nPack bags\n".into())],
        ));
        let agent = TaskCreationAgent::new(mock.clone(), CompletionParams::default());
        let result = ExecutionResult {
            task: Task::new(1, "Research destinations"),
            text: "Lisbon looks great".into(),
        };
        let tasks = agent
            .create_tasks("Plan a trip", &result, &["Pack bags".into()])
            .await
            .unwrap();
        assert_eq!(tasks, vec!["Book flights", "Reserve hotel", "Pack bags"]);

        let prompt = &mock.prompts()[0];
        assert!(prompt.contains("Plan a trip"));
        assert!(prompt.contains("Lisbon looks great"));
        assert!(prompt.contains("Research destinations"));
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let mock = Arc::new(MockLlmClient::scripted(ModelTier::Fast, vec![Err(LlmError::Timeout)]));
        let agent = TaskCreationAgent::new(mock, CompletionParams::default());
        let result = ExecutionResult {
            task: Task::new(1, "t"),
            text: "r".into(),
        };
        assert_eq!(agent.create_tasks("o", &result, &[]).await.unwrap_err(), LlmError::Timeout);
    }
}
