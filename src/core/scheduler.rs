//! 调度器 / 事件循环
//!
//! 单一 worker 从 FIFO 就绪队列取出一个 Activity，执行恰好一次阶段迁移，然后重新入队、挂起或丢弃。
//! 四个 Brain 调用全部在这里依次 await：同一时刻每个 Activity 至多一个进行中的迁移，
//! 调度器是 status 与 history 的唯一写者。
//!
//! 阶段逻辑：
//! - REASONING：已有待处理事件则直接转 OBSERVATION；否则 reason -> ACTION
//! - ACTION：act；未调用工具 -> OBSERVATION；调用了工具且事件已到 -> OBSERVATION；否则挂起 WAITING_FOR_EVENT
//! - OBSERVATION：消费事件后 observe，更新进度与信念；完成 -> COMPLETED 并注销，否则 -> REASONING
//! - COMPLETED：过期的重复入队，直接丢弃

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::activity::{
    Activity, ActivityId, ActivityStatus, Step, StepPhase, GOAL_PROGRESS_KEY,
    RELEVANT_MEMORIES_KEY,
};
use crate::config::SchedulerSection;
use crate::core::{ActivityRegistry, AgentError, ReadyQueue};
use crate::memory::{EpisodicRecord, EpisodicStore, NoopEpisodicStore};
use crate::react::context::{events_json, full_history};
use crate::react::{parse_act, parse_observation, Brain, BrainError, CallContext};

/// 结束原因，作为 reflect 的 final_status
const FINAL_COMPLETED: &str = "COMPLETED";
const FINAL_ABANDONED: &str = "ABANDONED";

/// 一次阶段迁移的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// 迁移到 status 并已重新入队
    Requeued { id: ActivityId, status: ActivityStatus },
    /// 进入 WAITING_FOR_EVENT，只存在于注册表中等待外部唤醒
    Parked { id: ActivityId },
    /// 到达终态并已注销
    Completed { id: ActivityId },
    /// 终态的过期入队，或迁移失败（此时已注销）
    Discarded { id: ActivityId },
}

pub struct Scheduler {
    registry: Arc<ActivityRegistry>,
    queue: Arc<ReadyQueue>,
    brain: Arc<dyn Brain>,
    store: Arc<dyn EpisodicStore>,
    settings: SchedulerSection,
    recall_top_k: usize,
    /// 完成后异步执行的 reflect 任务
    reflections: TaskTracker,
}

impl Scheduler {
    pub fn new(
        registry: Arc<ActivityRegistry>,
        queue: Arc<ReadyQueue>,
        brain: Arc<dyn Brain>,
    ) -> Self {
        Self {
            registry,
            queue,
            brain,
            store: Arc::new(NoopEpisodicStore),
            settings: SchedulerSection::default(),
            recall_top_k: 0,
            reflections: TaskTracker::new(),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn EpisodicStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_settings(mut self, settings: SchedulerSection) -> Self {
        self.settings = settings;
        self
    }

    /// 提交时从长期记忆召回的条数
    pub fn with_recall_top_k(mut self, k: usize) -> Self {
        self.recall_top_k = k;
        self
    }

    pub fn registry(&self) -> &Arc<ActivityRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<ReadyQueue> {
        &self.queue
    }

    /// 创建、注册并入队一个 Activity，不等待其完成
    pub fn submit(&self, goal: &str) -> Result<Arc<Activity>, AgentError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(AgentError::EmptyGoal);
        }
        let activity = Arc::new(Activity::new(goal));

        if self.recall_top_k > 0 && self.store.enabled() {
            let memories = self.store.retrieve_top_k(goal, self.recall_top_k);
            if !memories.is_empty() {
                tracing::debug!(
                    "Recalled {} past memories for activity {}",
                    memories.len(),
                    activity.id()
                );
                activity.set_belief(RELEVANT_MEMORIES_KEY, json!(memories));
            }
        }

        self.registry.register(activity.clone());
        self.queue.push(activity.clone());
        tracing::info!("Queued activity {} (goal={})", activity.id(), goal);
        Ok(activity)
    }

    /// 事件循环：直到 token 被取消。进行中的 Brain 调用不会被中断
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        tracing::info!("Scheduler event loop started");
        let poll = Duration::from_millis(self.settings.poll_interval_ms.max(1));
        while !token.is_cancelled() {
            self.sweep_parked();
            let next = tokio::select! {
                _ = token.cancelled() => break,
                next = self.queue.pop(poll) => next,
            };
            if let Some(activity) = next {
                self.process(activity).await;
            }
        }
        tracing::info!("Scheduler event loop stopped");
    }

    /// 取出并处理一个 Activity；timeout 内队列为空则返回 None
    pub async fn step(&self, timeout: Duration) -> Option<StepOutcome> {
        let activity = self.queue.pop(timeout).await?;
        Some(self.process(activity).await)
    }

    /// 对一个 Activity 执行恰好一次阶段迁移
    pub async fn process(&self, activity: Arc<Activity>) -> StepOutcome {
        let id = activity.id();
        let status = activity.status();
        tracing::debug!("Processing activity {} phase={}", id, status);

        let outcome = match status {
            ActivityStatus::Reasoning => self.reasoning(&activity).await,
            ActivityStatus::Action => self.action(&activity).await,
            ActivityStatus::Observation => self.observation(&activity).await,
            ActivityStatus::WaitingForEvent => {
                tracing::warn!("Activity {} dequeued while parked, leaving it parked", id);
                Ok(StepOutcome::Parked { id })
            }
            ActivityStatus::Completed => {
                tracing::debug!("Skipping completed activity {}", id);
                Ok(StepOutcome::Discarded { id })
            }
        };

        outcome.unwrap_or_else(|e| {
            // 已不在队列中，也不会再被唤醒
            tracing::error!("Activity {} failed in {}, dropping it: {}", id, status, e);
            self.registry.deregister(id);
            StepOutcome::Discarded { id }
        })
    }

    async fn reasoning(&self, activity: &Arc<Activity>) -> Result<StepOutcome, AgentError> {
        let id = activity.id();
        if activity.has_events() {
            tracing::info!(
                "Events pending for activity {} in REASONING phase, skipping to OBSERVATION",
                id
            );
            return self.requeue(activity, ActivityStatus::Observation);
        }

        let ctx = CallContext::build(activity, self.settings.history_window);
        let result = self
            .invoke(
                "reason",
                id,
                self.brain
                    .reason(&ctx.goal, &ctx.history, &ctx.beliefs, &ctx.progress),
            )
            .await;
        activity.append_step(Step::new(
            StepPhase::Reason,
            activity.goal(),
            result,
            activity.snapshot_beliefs(),
        ));

        tracing::info!("Activity {} moved to ACTION", id);
        self.requeue(activity, ActivityStatus::Action)
    }

    async fn action(&self, activity: &Arc<Activity>) -> Result<StepOutcome, AgentError> {
        let id = activity.id();
        let ctx = CallContext::build(activity, self.settings.history_window);
        let result = self
            .invoke(
                "act",
                id,
                self.brain
                    .act(&ctx.goal, &ctx.history, &ctx.beliefs, &ctx.progress),
            )
            .await;
        tracing::info!("Action result for activity {}: {}", id, result);

        let decision = parse_act(&result);
        if let Some(summary) = &decision.summary {
            tracing::info!("Action summary for activity {}: {}", id, summary);
        }
        activity.append_step(Step::new(
            StepPhase::Act,
            activity.goal(),
            result,
            activity.snapshot_beliefs(),
        ));

        let Some(tool) = decision.tool_name else {
            tracing::info!("No tool call for activity {}, proceeding to OBSERVATION", id);
            return self.requeue(activity, ActivityStatus::Observation);
        };

        tracing::info!("Tool call detected for activity {}: '{}'", id, tool);
        if activity.has_events() {
            tracing::info!(
                "Event arrived during action execution, not suspending activity {}",
                id
            );
            return self.requeue(activity, ActivityStatus::Observation);
        }

        activity.transition(ActivityStatus::WaitingForEvent)?;
        // 挂起已发布；若事件恰好在检查与挂起之间到达，与路由器竞争唤醒，只有 CAS 成功的一方入队
        if activity.has_events() && activity.try_wake() {
            tracing::info!("Event raced the suspension of activity {}, resuming", id);
            self.queue.push(activity.clone());
            return Ok(StepOutcome::Requeued {
                id,
                status: ActivityStatus::Observation,
            });
        }

        tracing::info!("Suspending activity {} (waiting for external event)", id);
        Ok(StepOutcome::Parked { id })
    }

    async fn observation(&self, activity: &Arc<Activity>) -> Result<StepOutcome, AgentError> {
        let id = activity.id();
        let events = activity.consume_events();
        let events_payload = events_json(&events);
        tracing::debug!("Serialized events for activity {}: {}", id, events_payload);

        let ctx = CallContext::build(activity, self.settings.history_window);
        let result = self
            .invoke(
                "observe",
                id,
                self.brain.observe(
                    &ctx.goal,
                    &ctx.history,
                    &ctx.beliefs,
                    &events_payload,
                    &ctx.progress,
                ),
            )
            .await;

        let outcome = parse_observation(&result);
        if let Some(summary) = &outcome.summary {
            tracing::info!("Observation summary for activity {}: {}", id, summary);
        }
        if let Some(progress) = outcome.new_progress {
            tracing::info!("Progress updated for activity {}:\n{}", id, progress);
            activity.set_belief(GOAL_PROGRESS_KEY, Value::String(progress));
        }
        for (key, value) in outcome.belief_updates {
            tracing::info!("Belief update for activity {}: {} -> {}", id, key, value);
            activity.set_belief(key, value);
        }

        activity.append_step(
            Step::new(
                StepPhase::Observe,
                activity.goal(),
                result,
                activity.snapshot_beliefs(),
            )
            .with_events(events),
        );
        let cycles = activity.record_cycle();

        if outcome.completed {
            tracing::info!("Activity {} marked COMPLETED by observe", id);
            return self.complete(activity, FINAL_COMPLETED);
        }
        if let Some(max) = self.settings.max_cycles {
            if cycles >= max {
                tracing::warn!(
                    "Activity {} reached the cycle limit ({}), abandoning",
                    id,
                    max
                );
                return self.complete(activity, FINAL_ABANDONED);
            }
        }

        tracing::info!("Activity {} cycled back to REASONING", id);
        self.requeue(activity, ActivityStatus::Reasoning)
    }

    fn requeue(
        &self,
        activity: &Arc<Activity>,
        next: ActivityStatus,
    ) -> Result<StepOutcome, AgentError> {
        activity.transition(next)?;
        self.queue.push(activity.clone());
        Ok(StepOutcome::Requeued {
            id: activity.id(),
            status: next,
        })
    }

    fn complete(
        &self,
        activity: &Arc<Activity>,
        final_status: &'static str,
    ) -> Result<StepOutcome, AgentError> {
        activity.transition(ActivityStatus::Completed)?;
        self.registry.deregister(activity.id());

        if self.settings.reflect_on_completion && self.store.enabled() {
            self.spawn_reflection(activity.clone(), final_status);
        }
        Ok(StepOutcome::Completed { id: activity.id() })
    }

    /// reflect 在后台执行，不阻塞事件循环；失败只记录日志
    fn spawn_reflection(&self, activity: Arc<Activity>, final_status: &'static str) {
        let brain = self.brain.clone();
        let store = self.store.clone();
        self.reflections.spawn(async move {
            let history = full_history(&activity);
            let reply = AssertUnwindSafe(brain.reflect(activity.goal(), final_status, &history))
                .catch_unwind()
                .await;
            match reply {
                Ok(Ok(text)) => {
                    match EpisodicRecord::from_reflection(activity.goal(), final_status, &text) {
                        Some(record) => store.save(&record),
                        None => tracing::debug!(
                            "Empty reflection for activity {}, nothing saved",
                            activity.id()
                        ),
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!("Reflection failed for activity {}: {}", activity.id(), e)
                }
                Err(_) => tracing::warn!("Reflection panicked for activity {}", activity.id()),
            }
        });
    }

    /// 等待所有已派发的 reflect 任务结束
    pub async fn flush_reflections(&self) {
        self.reflections.close();
        self.reflections.wait().await;
        self.reflections.reopen();
    }

    /// 唤醒挂起超过 park_timeout 的 Activity（未配置时不做任何事）
    pub fn sweep_parked(&self) -> usize {
        let Some(secs) = self.settings.park_timeout_secs else {
            return 0;
        };
        let limit = Duration::from_secs(secs);
        let mut woken = 0;
        for activity in self.registry.snapshot() {
            let expired = activity.status() == ActivityStatus::WaitingForEvent
                && activity.parked_for().is_some_and(|d| d >= limit);
            if expired && activity.try_wake() {
                tracing::warn!(
                    "Activity {} parked longer than {}s, resuming OBSERVATION without events",
                    activity.id(),
                    secs
                );
                self.queue.push(activity);
                woken += 1;
            }
        }
        woken
    }

    /// 调用 Brain；调用失败或 panic 都按空结果处理
    async fn invoke<F>(&self, op: &'static str, id: ActivityId, call: F) -> String
    where
        F: Future<Output = Result<String, BrainError>>,
    {
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                tracing::error!("Brain {} failed for activity {}: {}", op, id, e);
                String::new()
            }
            Err(_) => {
                tracing::error!("Brain {} panicked for activity {}", op, id);
                String::new()
            }
        }
    }
}
