//! 会话编排器：单个 objective 的主控循环
//!
//! 每个 Orchestrator 独占自己的 TaskQueue、创建计数器与 ContextIndex 句柄，循环严格串行：
//! 任务列表通知 → 取队首 → 执行 → 结果写入索引 → （未达预算时）创建新任务并重排 → 队列为空时收尾。
//! 创建预算统计的是「累计创建的任务数」而非剩余轮数，达到后只按 FIFO 消费剩余队列。

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agents::{ExecutionAgent, ExecutionResult, PrioritizationAgent, TaskCreationAgent};
use crate::config::RunConfig;
use crate::core::{AgentError, ModelSet, RunSummary, SessionPhase, Task, TaskQueue};
use crate::llm::EmbeddingProvider;
use crate::memory::{ContextIndex, ContextRecord, RecordMetadata};
use crate::notify::{Notification, NotificationSink};

pub struct Orchestrator {
    session_id: String,
    run: RunConfig,
    queue: TaskQueue,
    phase: SessionPhase,
    /// 累计创建的任务数（含种子任务）
    tasks_created: usize,
    /// 最近一次由计数器分配的 id
    last_task_id: u64,
    /// (id, name) -> 已失败次数
    failures: HashMap<(u64, String), u32>,
    creation: TaskCreationAgent,
    prioritization: PrioritizationAgent,
    execution: ExecutionAgent,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn ContextIndex>,
    sink: Arc<dyn NotificationSink>,
    cancel_token: CancellationToken,
    summary: RunSummary,
}

impl Orchestrator {
    /// 校验配置并进入 Seeded：队列中只有种子任务，计数器为 1
    pub fn new(
        session_id: impl Into<String>,
        run: RunConfig,
        models: &ModelSet,
        index: Arc<dyn ContextIndex>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, AgentError> {
        run.validate()?;
        if models.embedder.dimension() != run.dimension {
            return Err(AgentError::config(format!(
                "embedding dimension {} does not match index dimension {}",
                models.embedder.dimension(),
                run.dimension
            )));
        }

        let creation = TaskCreationAgent::new(models.fast.clone(), run.creation_params);
        let prioritization = PrioritizationAgent::new(models.fast.clone(), run.prioritization_params);
        let execution = ExecutionAgent::new(
            models.for_tier(run.execution_tier),
            models.embedder.clone(),
            index.clone(),
            run.context_breadth,
            run.execution_params,
        );

        let mut queue = TaskQueue::new();
        let seed = Task::new(run.start_task_id, run.first_task.trim());
        queue.enqueue(seed);

        Ok(Self {
            session_id: session_id.into(),
            last_task_id: run.start_task_id,
            run,
            queue,
            phase: SessionPhase::Seeded,
            tasks_created: 1,
            failures: HashMap::new(),
            creation,
            prioritization,
            execution,
            embedder: models.embedder.clone(),
            index,
            sink,
            cancel_token: CancellationToken::new(),
            summary: RunSummary::default(),
        })
    }

    /// 由调用方注入取消令牌，在每轮迭代之间检查
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn tasks_created(&self) -> usize {
        self.tasks_created
    }

    /// 跑完整个循环，结束后会话即被丢弃
    pub async fn run(mut self) -> Result<RunSummary, AgentError> {
        tracing::info!(
            session = %self.session_id,
            objective = %self.run.objective,
            budget = self.run.creation_budget,
            "session started"
        );

        while !self.queue.is_empty() {
            if self.cancel_token.is_cancelled() {
                tracing::info!(session = %self.session_id, "session cancelled");
                self.notify(Notification::Cancelled);
                return Err(AgentError::Cancelled);
            }
            self.transition(SessionPhase::Running);
            self.iterate().await;
        }

        self.transition(SessionPhase::Draining);
        self.notify(Notification::Completed);
        self.transition(SessionPhase::Completed);

        self.summary.tasks_created = self.tasks_created;
        tracing::info!(
            session = %self.session_id,
            completed = self.summary.completed.len(),
            abandoned = self.summary.abandoned.len(),
            created = self.tasks_created,
            "session completed"
        );
        Ok(self.summary)
    }

    async fn iterate(&mut self) {
        self.summary.iterations += 1;
        self.notify(Notification::TaskList {
            tasks: self.queue.snapshot(),
        });

        let task = match self.queue.dequeue_front() {
            Ok(t) => t,
            Err(_) => return,
        };
        tracing::info!(session = %self.session_id, task_id = task.id, "next task: {}", task.name);
        self.notify(Notification::NextTask { task: task.clone() });

        let result = match self.execution.execute(&self.run.objective, &task).await {
            Ok(r) => r,
            Err(source) => {
                let err = AgentError::TaskExecution {
                    task_id: task.id,
                    source,
                };
                self.handle_failure(task, err);
                return;
            }
        };

        self.notify(Notification::TaskResult {
            task: task.clone(),
            result: result.text.clone(),
        });
        self.summary.completed.push(task);

        self.persist(&result).await;

        if self.creation_allowed() {
            self.creation_round(&result).await;
        }
    }

    /// 预算以累计创建数计；另外限制轮数，使优先级 Agent 的调用次数不超过预算
    fn creation_allowed(&self) -> bool {
        self.tasks_created < self.run.creation_budget
            && self.summary.creation_rounds < self.run.creation_budget
    }

    /// 失败的任务放回队尾；超过尝试上限则放弃
    fn handle_failure(&mut self, task: Task, err: AgentError) {
        let attempts = {
            let n = self
                .failures
                .entry((task.id, task.name.clone()))
                .or_insert(0);
            *n += 1;
            *n
        };
        tracing::warn!(session = %self.session_id, attempts, "{}", err);

        if attempts < self.run.max_task_attempts {
            self.notify(Notification::TaskFailed {
                task: task.clone(),
                error: err.to_string(),
                requeued: true,
            });
            self.queue.enqueue(task);
        } else {
            self.notify(Notification::TaskAbandoned {
                task: task.clone(),
                attempts,
            });
            self.summary.abandoned.push(task);
        }
    }

    /// 嵌入结果并写入索引；失败只告警，本条记录视为丢失
    async fn persist(&self, result: &ExecutionResult) {
        let record_id = ContextRecord::id_for_task(result.task.id);
        let embedding = match self.embedder.embed(&result.text).await {
            Ok(v) => v,
            Err(e) => {
                self.warn(format!("could not embed result of task {}: {}", result.task.id, e));
                return;
            }
        };
        let record = ContextRecord {
            id: record_id,
            embedding,
            metadata: RecordMetadata {
                task_name: result.task.name.clone(),
                result_text: result.text.clone(),
            },
        };
        if let Err(e) = self.index.upsert(record).await {
            self.warn(format!("could not store result of task {}: {}", result.task.id, e));
        }
    }

    /// 一轮创建：新任务依次分配递增 id 追加到队尾，再以「刚执行任务 id + 1」为起点重排整个队列
    async fn creation_round(&mut self, result: &ExecutionResult) {
        let pending = self.queue.names();
        let names = match self
            .creation
            .create_tasks(&self.run.objective, result, &pending)
            .await
        {
            Ok(names) => names,
            Err(e) => {
                self.warn(format!("task creation failed after task {}: {}", result.task.id, e));
                return;
            }
        };
        self.summary.creation_rounds += 1;

        let mut created = Vec::with_capacity(names.len());
        for name in names {
            self.last_task_id = self.last_task_id.saturating_add(1);
            self.tasks_created += 1;
            let task = Task::new(self.last_task_id, name);
            self.queue.enqueue(task.clone());
            created.push(task);
        }
        tracing::info!(
            session = %self.session_id,
            new = created.len(),
            total_created = self.tasks_created,
            "tasks created"
        );
        if !created.is_empty() {
            self.notify(Notification::TasksCreated { tasks: created });
        }

        // id 来自模型输出，可能已是 u64::MAX
        let next_task_id = result.task.id.saturating_add(1);
        match self
            .prioritization
            .prioritize(&mut self.queue, &self.run.objective, next_task_id)
            .await
        {
            Ok(parsed) => {
                self.summary.dropped_lines += parsed.dropped;
                self.notify(Notification::Prioritized {
                    tasks: parsed.tasks,
                    dropped_lines: parsed.dropped,
                });
            }
            Err(e) => {
                self.warn(format!("prioritization failed, keeping current order: {}", e));
            }
        }
    }

    fn transition(&mut self, next: SessionPhase) {
        if self.phase == next {
            return;
        }
        if !self.phase.can_transition_to(next) {
            tracing::warn!(from = ?self.phase, to = ?next, "unexpected phase transition");
        }
        tracing::debug!(session = %self.session_id, from = ?self.phase, to = ?next, "phase");
        self.phase = next;
    }

    fn warn(&self, text: String) {
        tracing::warn!(session = %self.session_id, "{}", text);
        self.notify(Notification::Warning { text });
    }

    fn notify(&self, notification: Notification) {
        self.sink.send(&self.session_id, notification);
    }
}
