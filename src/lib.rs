//! Hive - 目标驱动的自主任务循环
//!
//! 模块划分：
//! - **agents**: 任务创建、优先级重排、任务执行（含上下文检索）
//! - **config**: 应用配置加载（TOML + 环境变量）与单次运行参数校验
//! - **core**: 任务队列、会话编排器、构建器、取消监管、多会话中枢
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock），档位与重试
//! - **memory**: 任务结果的向量上下文索引（进程内 / Pinecone 兼容）
//! - **notify**: 进度通知与有序通知通道
//! - **observability**: 日志初始化

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod notify;
pub mod observability;

pub use crate::core::{Orchestrator, SessionBuilder, SessionHub};
