//! 执行 Agent：检索历史上下文并产出当前任务的结果
//!
//! 上下文检索失败（嵌入或索引出错）时降级为空上下文，任务照常执行。结果不在此处持久化。

use std::sync::Arc;

use crate::agents::prompts;
use crate::core::Task;
use crate::llm::{CompletionParams, EmbeddingProvider, LlmClient, LlmError};
use crate::memory::ContextIndex;

/// 一条检索到的历史上下文
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEntry {
    pub task_name: String,
    pub result_text: String,
    pub score: f32,
}

/// 单个任务的执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub task: Task,
    pub text: String,
}

pub struct ExecutionAgent {
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn ContextIndex>,
    /// 检索条数 N
    breadth: usize,
    params: CompletionParams,
}

impl ExecutionAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn ContextIndex>,
        breadth: usize,
        params: CompletionParams,
    ) -> Self {
        Self {
            llm,
            embedder,
            index,
            breadth,
            params,
        }
    }

    /// 以 objective 的嵌入查询最相似的 N 条记录，按相似度降序
    pub async fn retrieve_context(&self, objective: &str) -> Vec<ContextEntry> {
        let embedding = match self.embedder.embed(objective).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("context embedding failed ({}), continuing without context", e);
                return Vec::new();
            }
        };
        match self.index.query(&embedding, self.breadth).await {
            Ok(matches) => matches
                .into_iter()
                .map(|m| ContextEntry {
                    task_name: m.metadata.task_name,
                    result_text: m.metadata.result_text,
                    score: m.score,
                })
                .collect(),
            Err(e) => {
                tracing::warn!(index = self.index.name(), "context query failed ({}), continuing without context", e);
                Vec::new()
            }
        }
    }

    pub async fn execute(&self, objective: &str, task: &Task) -> Result<ExecutionResult, LlmError> {
        let context = self.retrieve_context(objective).await;
        tracing::debug!(task_id = task.id, context = context.len(), "executing task");
        let prompt = prompts::execution(objective, &context, &task.name);
        let text = self.llm.complete(&prompt, self.params).await?;
        Ok(ExecutionResult {
            task: task.clone(),
            text,
        })
    }
}
