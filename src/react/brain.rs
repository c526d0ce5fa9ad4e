//! Brain：外部推理协作者抽象
//!
//! 决策逻辑本身不在本 crate 内，只通过 reason / act / observe / reflect 四个固定操作消费。
//! 调度器持有一个 `Arc<dyn Brain>`，所有调用都在单一 worker 上依次 await，彼此串行。

use async_trait::async_trait;
use thiserror::Error;

/// 协作者调用失败（传输错误、超时、后端不可用等）；调度器记录日志后按空结果处理
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrainError {
    #[error("Brain invocation failed: {0}")]
    Invocation(String),

    #[error("Brain call timed out")]
    Timeout,

    #[error("Brain unavailable: {0}")]
    Unavailable(String),
}

/// 推理协作者 trait
///
/// 参数约定：
/// - `history`：最近 N 步，每步一行 JSON
/// - `beliefs`：`{"activityUuid": ..., "variables": {...}}`
/// - `progress`：进度跟踪文本（保留信念 `goal_progress`）
/// - `events`：本轮消费的事件 JSON 数组
#[async_trait]
pub trait Brain: Send + Sync {
    async fn reason(
        &self,
        goal: &str,
        history: &str,
        beliefs: &str,
        progress: &str,
    ) -> Result<String, BrainError>;

    /// 期望返回 `{"tool_name": "..."|null, "summary": "..."}`
    async fn act(
        &self,
        goal: &str,
        history: &str,
        beliefs: &str,
        progress: &str,
    ) -> Result<String, BrainError>;

    /// 期望返回 `{"completed": bool, "summary": ..., "new_progress": ..., "update_variables": {...}}`
    async fn observe(
        &self,
        goal: &str,
        history: &str,
        beliefs: &str,
        events: &str,
        progress: &str,
    ) -> Result<String, BrainError>;

    /// 期望返回可复用的经验记录 `{"summary": ..., "outcome": ..., "procedure": [...]}`
    async fn reflect(
        &self,
        goal: &str,
        final_status: &str,
        full_history: &str,
    ) -> Result<String, BrainError>;
}
