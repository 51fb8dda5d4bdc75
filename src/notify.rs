//! 进度通知：会话循环向外部传输层推送的事件
//!
//! 循环侧只调用同步的 `send`（发后即忘）。ChannelSink 通过无界 mpsc 保证同一会话内的通知按发送顺序到达；
//! 跨会话顺序不保证。具体的聊天平台适配器消费接收端。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::Task;

/// 单条通知（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// 当前待执行任务列表
    TaskList { tasks: Vec<Task> },
    /// 即将执行的任务
    NextTask { task: Task },
    /// 任务执行结果
    TaskResult { task: Task, result: String },
    /// 新建任务（已分配 id）
    TasksCreated { tasks: Vec<Task> },
    /// 重排后的队列与被丢弃的行数
    Prioritized { tasks: Vec<Task>, dropped_lines: usize },
    /// 任务执行失败
    TaskFailed { task: Task, error: String, requeued: bool },
    /// 超过尝试上限，任务被放弃
    TaskAbandoned { task: Task, attempts: u32 },
    /// 非致命问题（索引写入失败、创建轮失败等）
    Warning { text: String },
    /// 所有任务完成
    Completed,
    Cancelled,
}

impl Notification {
    /// 传输层展示用的纯文本
    pub fn text(&self) -> String {
        match self {
            Notification::TaskList { tasks } => tasks
                .iter()
                .map(|t| format!("{}\n", t))
                .collect::<String>(),
            Notification::NextTask { task } => task.to_string(),
            Notification::TaskResult { result, .. } => result.clone(),
            Notification::TasksCreated { tasks } => format!(
                "New tasks: {}",
                tasks.iter().map(|t| t.to_string()).collect::<Vec<_>>().join("; ")
            ),
            Notification::Prioritized { tasks, dropped_lines } => {
                format!("Reprioritized {} tasks ({} lines dropped)", tasks.len(), dropped_lines)
            }
            Notification::TaskFailed { task, error, requeued } => {
                if *requeued {
                    format!("Task {} failed ({}), moved to the end of the list", task, error)
                } else {
                    format!("Task {} failed ({})", task, error)
                }
            }
            Notification::TaskAbandoned { task, attempts } => {
                format!("Task {} abandoned after {} attempts", task, attempts)
            }
            Notification::Warning { text } => text.clone(),
            Notification::Completed => "\n\nAll tasks completed".to_string(),
            Notification::Cancelled => "Run cancelled".to_string(),
        }
    }

    /// 控制台标题（与任务列表 / 下一任务 / 结果对应）
    pub fn header(&self) -> Option<&'static str> {
        match self {
            Notification::TaskList { .. } => Some("*****TASK LIST*****"),
            Notification::NextTask { .. } => Some("*****NEXT TASK*****"),
            Notification::TaskResult { .. } => Some("*****TASK RESULT*****"),
            _ => None,
        }
    }
}

/// 通知接收方：发后即忘，实现方负责同一会话内的顺序
pub trait NotificationSink: Send + Sync {
    fn send(&self, session_id: &str, notification: Notification);
}

/// 带会话 id 与时间戳的通知信封
#[derive(Debug, Clone, Serialize)]
pub struct SessionMessage {
    pub session_id: String,
    pub notification: Notification,
    /// 毫秒时间戳
    pub at: i64,
}

/// 基于无界 mpsc 的有序通知通道
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SessionMessage>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn send(&self, session_id: &str, notification: Notification) {
        let msg = SessionMessage {
            session_id: session_id.to_string(),
            notification,
            at: chrono::Utc::now().timestamp_millis(),
        };
        if self.tx.send(msg).is_err() {
            tracing::debug!(session = session_id, "notification receiver dropped");
        }
    }
}

/// 把通道里的通知逐条写成 JSON 行；所有发送端释放（会话结束）后返回 out
pub async fn forward_json<W: std::io::Write>(
    mut rx: mpsc::UnboundedReceiver<SessionMessage>,
    mut out: W,
) -> W {
    while let Some(msg) = rx.recv().await {
        let line = match serde_json::to_string(&msg) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("could not serialize notification: {}", e);
                continue;
            }
        };
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            tracing::warn!("could not write notification: {}", e);
        }
    }
    out
}

/// 只写日志
#[derive(Debug, Default, Clone)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn send(&self, session_id: &str, notification: Notification) {
        tracing::info!(session = session_id, "{}", notification.text().trim());
    }
}

/// 打印到标准输出（命令行模式）
#[derive(Debug, Default, Clone)]
pub struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn send(&self, _session_id: &str, notification: Notification) {
        if let Some(h) = notification.header() {
            println!("\n{}\n", h);
        }
        println!("{}", notification.text().trim_end());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_list_text() {
        let n = Notification::TaskList {
            tasks: vec![Task::new(1, "Research destinations"), Task::new(2, "Book flights")],
        };
        assert_eq!(n.text(), "1: Research destinations\n2: Book flights\n");
        assert_eq!(n.header(), Some("*****TASK LIST*****"));
    }

    #[test]
    fn test_serializes_with_type_tag() {
        let v = serde_json::to_value(Notification::NextTask {
            task: Task::new(2, "x"),
        })
        .unwrap();
        assert_eq!(v["type"], "next_task");
        assert_eq!(v["task"]["id"], 2);
    }

    #[tokio::test]
    async fn test_channel_preserves_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.send("s1", Notification::Warning { text: "a".into() });
        sink.send("s1", Notification::Completed);
        assert_eq!(rx.recv().await.unwrap().notification, Notification::Warning { text: "a".into() });
        let second = rx.recv().await.unwrap();
        assert_eq!(second.session_id, "s1");
        assert_eq!(second.notification, Notification::Completed);
    }
}
