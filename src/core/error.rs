//! 错误类型
//!
//! 三类运行期错误都不是致命的：
//! - BrainError（协作者调用失败）：记录日志，按空结果继续下一阶段
//! - MalformedResponse（输出无法结构化解析）：退回最保守解释
//! - RoutingError（消息缺少或找不到 correlation id）：丢弃并记录

use thiserror::Error;

use crate::activity::TransitionError;

/// 运行时对调用方可见的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Goal must not be empty")]
    EmptyGoal,

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error("Background task failed: {0}")]
    Join(String),
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}

/// 入站消息无法投递
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Message has no correlation id")]
    MissingCorrelationId,

    #[error("No live activity for correlation id {0}")]
    UnknownActivity(String),

    #[error("Unsupported message kind: {0}")]
    UnsupportedKind(String),

    #[error("Belief update without key for activity {0}")]
    MissingBeliefKey(String),

    #[error("Malformed inbound message: {0}")]
    Malformed(String),
}
