//! 外部事件网关
//!
//! 入站消息（信念更新或领域事件）带 correlation id，经 [`Envelope`] 解码后由 [`EventRouter`]
//! 投递到目标 Activity。传输层本身不在此处：任何 `Stream<Item = serde_json::Value>` 都可以驱动路由器，
//! 例如 stdin 的逐行输入或工具服务器的 SSE `data:` 行。

mod envelope;
mod router;

pub use envelope::{Envelope, EnvelopeKind};
pub use router::{EventRouter, RouteOutcome};
