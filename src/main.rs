//! Hive - 目标驱动的自主任务循环
//!
//! 入口：初始化日志、加载配置、构建会话并跑完整个任务循环；Ctrl+C 在当前迭代结束后停止。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hive::config::load_config;
use hive::core::{SessionBuilder, SessionSupervisor};
use hive::notify::{forward_json, ChannelSink, NotificationSink, StdoutSink};

#[derive(Parser, Debug)]
#[command(name = "hive", about = "Objective-driven autonomous task loop")]
struct Cli {
    /// 总目标（未给出时取配置 run.objective）
    objective: Vec<String>,

    /// 第一个任务（未给出时取配置 run.first_task）
    #[arg(long)]
    first_task: Option<String>,

    /// 额外的配置文件
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// 以 JSON 行输出通知
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;

    let objective = cli.objective.join(" ");
    let objective = (!objective.trim().is_empty()).then_some(objective);

    let (sink, forwarder): (Arc<dyn NotificationSink>, _) = if cli.json {
        let (sink, rx) = ChannelSink::new();
        let forwarder = tokio::spawn(forward_json(rx, std::io::stdout()));
        (Arc::new(sink), Some(forwarder))
    } else {
        (Arc::new(StdoutSink), None)
    };

    let supervisor = SessionSupervisor::new();
    let session = SessionBuilder::new(cfg)
        .with_sink(sink)
        .with_cancel_token(supervisor.child_token())
        .build(objective.as_deref(), cli.first_task.as_deref())
        .await
        .context("Failed to create session")?;

    let ctrl_c = supervisor.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current task");
            ctrl_c.cancel();
        }
    });

    let outcome = session.run().await;

    // 会话结束后 sink 随之释放，forwarder 打印完剩余通知（含 Cancelled）后退出
    if let Some(f) = forwarder {
        f.await.context("Notification forwarder failed")?;
    }
    let summary = outcome.context("Session failed")?;
    tracing::info!(
        completed = summary.completed.len(),
        abandoned = summary.abandoned.len(),
        created = summary.tasks_created,
        "done"
    );
    Ok(())
}
