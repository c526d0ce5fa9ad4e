//! 外部事件路由器
//!
//! 按 correlation id 把入站消息投递到唯一的 Activity：
//! - belief：写入目标 Activity 的信念表
//! - event：追加到待处理事件缓冲；若目标正挂起在 WAITING_FOR_EVENT，则 CAS 唤醒到 OBSERVATION 并重新入队
//!
//! 路由器只写 beliefs 与事件缓冲；status 的唯一非调度器写入是唤醒 CAS，与调度器挂起时的复查 CAS 竞争，只有一方成功入队。

use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::{ActivityRegistry, ReadyQueue, RoutingError};

use super::envelope::{Envelope, EnvelopeKind};

/// 一条消息的投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    BeliefStored,
    /// 事件已缓冲，等目标下一次 OBSERVATION 消费
    EventBuffered,
    /// 事件已缓冲并唤醒了挂起的目标
    Woken,
}

pub struct EventRouter {
    registry: Arc<ActivityRegistry>,
    queue: Arc<ReadyQueue>,
}

impl EventRouter {
    pub fn new(registry: Arc<ActivityRegistry>, queue: Arc<ReadyQueue>) -> Self {
        Self { registry, queue }
    }

    pub fn route(&self, envelope: &Envelope) -> Result<RouteOutcome, RoutingError> {
        let correlation = envelope
            .correlation_id
            .as_deref()
            .ok_or(RoutingError::MissingCorrelationId)?;
        let activity = self
            .registry
            .get_by_correlation(correlation)
            .ok_or_else(|| RoutingError::UnknownActivity(correlation.to_string()))?;

        match &envelope.kind {
            EnvelopeKind::Belief => {
                let (key, value) = envelope
                    .belief_entry()
                    .ok_or_else(|| RoutingError::MissingBeliefKey(correlation.to_string()))?;
                if activity.set_belief(key.as_str(), value) {
                    tracing::info!("Belief '{}' updated for activity {}", key, activity.id());
                } else {
                    tracing::debug!(
                        "Ignored null belief '{}' for activity {}",
                        key,
                        activity.id()
                    );
                }
                Ok(RouteOutcome::BeliefStored)
            }
            EnvelopeKind::Event => {
                activity.push_event(envelope.payload.clone());
                if activity.try_wake() {
                    tracing::info!("Waking up activity {} (event received)", activity.id());
                    self.queue.push(activity);
                    Ok(RouteOutcome::Woken)
                } else {
                    tracing::debug!(
                        "Buffered event for activity {} ({})",
                        activity.id(),
                        activity.status()
                    );
                    Ok(RouteOutcome::EventBuffered)
                }
            }
            EnvelopeKind::Other(kind) => Err(RoutingError::UnsupportedKind(kind.clone())),
        }
    }

    /// 解码并路由一个 JSON 值
    pub fn route_value(&self, value: Value) -> Result<RouteOutcome, RoutingError> {
        let envelope = Envelope::from_value(value)?;
        self.route(&envelope)
    }

    /// 消费入站消息流直到流结束或 token 被取消；投递失败只记录日志
    pub async fn run<S>(self: Arc<Self>, stream: S, token: CancellationToken)
    where
        S: Stream<Item = Value> + Send,
    {
        tracing::info!("Event router started");
        futures_util::pin_mut!(stream);
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => break,
                next = stream.next() => next,
            };
            let Some(value) = next else {
                tracing::info!("Inbound stream closed");
                break;
            };
            if let Err(e) = self.route_value(value) {
                match e {
                    RoutingError::MissingCorrelationId => {
                        tracing::warn!("Dropped inbound message without correlation id")
                    }
                    other => tracing::warn!("Dropped inbound message: {}", other),
                }
            }
        }
        tracing::info!("Event router stopped");
    }
}
