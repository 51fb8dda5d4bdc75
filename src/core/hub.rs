//! SessionHub：为多个聊天各自运行独立的 objective
//!
//! 每个会话在自己的 tokio 任务中运行，拥有独立的队列、计数器与索引句柄；共享的只有无状态的模型客户端
//! 与通知通道。同一聊天同时只允许一个存活会话。

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{AgentError, ModelSet, RunSummary, SessionBuilder, SessionSupervisor};
use crate::notify::NotificationSink;

struct SessionHandle {
    cancel_token: CancellationToken,
    join: JoinHandle<Result<RunSummary, AgentError>>,
}

pub struct SessionHub {
    config: AppConfig,
    models: ModelSet,
    sink: Arc<dyn NotificationSink>,
    supervisor: SessionSupervisor,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

fn already_running(chat_id: &str) -> AgentError {
    AgentError::config(format!("chat {} already has a running objective", chat_id))
}

fn join_result(r: Result<Result<RunSummary, AgentError>, tokio::task::JoinError>) -> Result<RunSummary, AgentError> {
    r.unwrap_or_else(|e| Err(AgentError::Join(e.to_string())))
}

impl SessionHub {
    pub fn new(config: AppConfig, models: ModelSet, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            config,
            models,
            sink,
            supervisor: SessionSupervisor::new(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 为 chat_id 启动一个会话；配置错误在此同步返回，已有存活会话时拒绝
    pub async fn start(
        &self,
        chat_id: &str,
        objective: &str,
        first_task: Option<&str>,
    ) -> Result<(), AgentError> {
        if self.is_running(chat_id).await {
            return Err(already_running(chat_id));
        }

        // 构建可能包含远程索引的网络往返，期间不持有 sessions 锁
        let token = self.supervisor.child_token();
        let orch = SessionBuilder::new(self.config.clone())
            .with_models(self.models.clone())
            .with_sink(self.sink.clone())
            .with_session_id(chat_id)
            .with_cancel_token(token.clone())
            .build(Some(objective), first_task)
            .await?;

        let mut sessions = self.sessions.write().await;
        if sessions.get(chat_id).is_some_and(|h| !h.join.is_finished()) {
            return Err(already_running(chat_id));
        }

        tracing::info!(chat = chat_id, "starting session");
        let join = tokio::spawn(orch.run());
        sessions.insert(
            chat_id.to_string(),
            SessionHandle {
                cancel_token: token,
                join,
            },
        );
        Ok(())
    }

    pub async fn is_running(&self, chat_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(chat_id)
            .map(|h| !h.join.is_finished())
            .unwrap_or(false)
    }

    /// 请求取消；会话在当前迭代结束后停止
    pub async fn cancel(&self, chat_id: &str) -> bool {
        match self.sessions.read().await.get(chat_id) {
            Some(h) => {
                h.cancel_token.cancel();
                true
            }
            None => false,
        }
    }

    /// 等待会话结束并移除
    pub async fn wait(&self, chat_id: &str) -> Option<Result<RunSummary, AgentError>> {
        let handle = self.sessions.write().await.remove(chat_id)?;
        Some(join_result(handle.join.await))
    }

    /// 取消所有会话并等待全部结束
    pub async fn shutdown(&self) -> Vec<(String, Result<RunSummary, AgentError>)> {
        self.supervisor.cancel();
        let drained: Vec<(String, SessionHandle)> = self.sessions.write().await.drain().collect();
        let (ids, joins): (Vec<_>, Vec<_>) = drained.into_iter().map(|(id, h)| (id, h.join)).unzip();
        let results = join_all(joins).await;
        ids.into_iter()
            .zip(results.into_iter().map(join_result))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelSink;

    fn config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.index.name = Some("hub".into());
        cfg.index.dimension = 16;
        cfg
    }

    #[tokio::test]
    async fn test_start_and_wait() {
        let (sink, _rx) = ChannelSink::new();
        let hub = SessionHub::new(config(), ModelSet::mock(16), Arc::new(sink));
        hub.start("chat-1", "Plan a trip", Some("Research destinations"))
            .await
            .unwrap();
        let summary = hub.wait("chat-1").await.unwrap().unwrap();
        assert!(!summary.completed.is_empty());
        assert!(!hub.is_running("chat-1").await);
        assert!(hub.wait("chat-1").await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_start_rejected_while_other_chats_stay_responsive() {
        use crate::llm::{HashingEmbedder, LlmClient, MockLlmClient, ModelTier};
        use std::time::Duration;

        let slow: Arc<dyn LlmClient> = Arc::new(MockLlmClient::with_responder(ModelTier::Capable, |_| {
            std::thread::sleep(Duration::from_millis(200));
            Ok("done".into())
        }));
        let models = ModelSet {
            fast: Arc::new(MockLlmClient::new(ModelTier::Fast)),
            capable: slow,
            embedder: Arc::new(HashingEmbedder::new(16)),
        };
        let (sink, _rx) = ChannelSink::new();
        let hub = SessionHub::new(config(), models, Arc::new(sink));

        hub.start("chat-1", "Plan a trip", Some("Research destinations"))
            .await
            .unwrap();
        let err = hub
            .start("chat-1", "Plan a trip", Some("Research destinations"))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("already has a running objective"));

        let other = tokio::time::timeout(Duration::from_millis(100), hub.cancel("chat-2"))
            .await
            .unwrap();
        assert!(!other);
        assert!(hub.is_running("chat-1").await);

        assert!(hub.cancel("chat-1").await);
        assert!(hub.wait("chat-1").await.is_some());
    }

    #[tokio::test]
    async fn test_config_error_is_synchronous() {
        let (sink, _rx) = ChannelSink::new();
        let hub = SessionHub::new(config(), ModelSet::mock(16), Arc::new(sink));
        assert!(hub.start("chat-1", "Plan a trip", None).await.is_err());
        assert!(!hub.cancel("chat-1").await);
    }
}
