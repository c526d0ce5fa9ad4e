//! Cadence - 异步事件驱动的 Agent 运行时
//!
//! 每个 Activity 经历 observe → reason → act 的循环；行动可能触发外部长耗时副作用，
//! 其完成通知稍后带着 correlation id 到达，由路由器投递并唤醒挂起的 Activity。
//!
//! 模块划分：
//! - **activity**: Activity 实体、状态机、Step 历史
//! - **agent**: 运行时门面（提交、查询、入站消息、关闭）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、就绪队列、注册表、单写者调度循环、优雅关闭
//! - **gateway**: 入站消息信封与外部事件路由
//! - **memory**: 长期情景记忆（跨 Activity 的经验召回）
//! - **observability**: tracing 初始化
//! - **react**: Brain 协作者契约、上下文窗口、输出宽容解析、Mock/Demo 实现

pub mod activity;
pub mod agent;
pub mod config;
pub mod core;
pub mod gateway;
pub mod memory;
pub mod observability;
pub mod react;

pub use activity::{Activity, ActivityId, ActivityStatus};
pub use agent::Agent;
pub use crate::core::{AgentError, RoutingError};
