//! Agent 运行时门面
//!
//! start 组装注册表、就绪队列、调度器任务与路由器任务；
//! submit 立即返回 Activity 句柄（不等待完成），调用方按 id 轮询状态、历史与信念；
//! inbox 是入站消息的发送端，任何传输层都可以往里推 JSON。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::activity::{Activity, ActivityId};
use crate::config::AppConfig;
use crate::core::{ActivityRegistry, AgentError, ReadyQueue, Scheduler};
use crate::gateway::EventRouter;
use crate::memory::{EpisodicStore, NoopEpisodicStore};
use crate::react::Brain;

pub struct Agent {
    scheduler: Arc<Scheduler>,
    router: Arc<EventRouter>,
    inbox_tx: mpsc::UnboundedSender<Value>,
    token: CancellationToken,
    scheduler_task: JoinHandle<()>,
    router_task: JoinHandle<()>,
}

impl Agent {
    /// 启动调度器与路由器；必须在 tokio 运行时内调用
    pub fn start(config: &AppConfig, brain: Arc<dyn Brain>, store: Arc<dyn EpisodicStore>) -> Self {
        Self::start_with_token(config, brain, store, CancellationToken::new())
    }

    /// 同 start，但使用外部关闭 token（例如 ShutdownManager 的 token）
    pub fn start_with_token(
        config: &AppConfig,
        brain: Arc<dyn Brain>,
        store: Arc<dyn EpisodicStore>,
        token: CancellationToken,
    ) -> Self {
        let store: Arc<dyn EpisodicStore> = if config.memory.enabled {
            store
        } else {
            Arc::new(NoopEpisodicStore)
        };
        let registry = Arc::new(ActivityRegistry::new());
        let queue = Arc::new(ReadyQueue::new());

        let scheduler = Arc::new(
            Scheduler::new(registry.clone(), queue.clone(), brain)
                .with_store(store)
                .with_settings(config.scheduler.clone())
                .with_recall_top_k(config.memory.recall_top_k),
        );
        let router = Arc::new(EventRouter::new(registry, queue));

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel::<Value>();
        let inbound = futures_util::stream::unfold(inbox_rx, |mut rx| async move {
            rx.recv().await.map(|value| (value, rx))
        });

        let scheduler_task = tokio::spawn(scheduler.clone().run(token.clone()));
        let router_task = tokio::spawn(router.clone().run(inbound, token.clone()));
        tracing::info!(
            "Agent started (app={})",
            config.app.name.as_deref().unwrap_or("cadence")
        );

        Self {
            scheduler,
            router,
            inbox_tx,
            token,
            scheduler_task,
            router_task,
        }
    }

    /// 提交目标；空白目标返回 EmptyGoal
    pub fn submit(&self, goal: &str) -> Result<Arc<Activity>, AgentError> {
        self.scheduler.submit(goal)
    }

    /// 按 id 查找存活的 Activity（完成后已注销，调用方应保留 submit 返回的句柄）
    pub fn activity(&self, id: ActivityId) -> Option<Arc<Activity>> {
        self.scheduler.registry().get(id)
    }

    pub fn inbox(&self) -> mpsc::UnboundedSender<Value> {
        self.inbox_tx.clone()
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn active_count(&self) -> usize {
        self.scheduler.registry().len()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 等待所有已提交的 Activity 完成；token 被取消时提前返回
    pub async fn wait_until_idle(&self, poll: Duration) {
        while self.active_count() > 0 && !self.token.is_cancelled() {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// 停止两个后台任务并等待它们退出，然后等待未完成的 reflect 写入
    pub async fn shutdown(self) -> Result<(), AgentError> {
        self.token.cancel();
        let scheduler = self.scheduler_task.await;
        let router = self.router_task.await;
        self.scheduler.flush_reflections().await;
        scheduler.map_err(|e| AgentError::Join(e.to_string()))?;
        router.map_err(|e| AgentError::Join(e.to_string()))?;
        tracing::info!("Agent stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityStatus;
    use crate::memory::InMemoryEpisodicStore;
    use crate::react::{BrainOp, DemoBrain, MockBrain};
    use serde_json::json;

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.scheduler.poll_interval_ms = 10;
        config
    }

    #[tokio::test]
    async fn test_submit_blank_goal() {
        let agent = Agent::start(
            &fast_config(),
            Arc::new(MockBrain::new()),
            Arc::new(NoopEpisodicStore),
        );
        assert!(matches!(agent.submit(""), Err(AgentError::EmptyGoal)));
        agent.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_demo_brain_round_trip_through_inbox() {
        let store = Arc::new(InMemoryEpisodicStore::default());
        let agent = Agent::start(&fast_config(), Arc::new(DemoBrain), store.clone());
        let activity = agent.submit("fetch the report").unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while activity.status() != ActivityStatus::WaitingForEvent {
            assert!(tokio::time::Instant::now() < deadline, "activity never parked");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        agent
            .inbox()
            .send(json!({
                "kind": "event",
                "correlationId": activity.id().to_string(),
                "payload": {"report": "ready"}
            }))
            .unwrap();

        let idle = agent.wait_until_idle(Duration::from_millis(5));
        tokio::time::timeout(Duration::from_secs(5), idle).await.unwrap();
        assert!(activity.is_completed());
        assert!(agent.activity(activity.id()).is_none());

        agent.shutdown().await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_memory_skips_reflection() {
        let mut config = fast_config();
        config.memory.enabled = false;
        let brain = Arc::new(MockBrain::new());
        brain.push_reply(BrainOp::Observe, r#"{"completed": true}"#);
        let store = Arc::new(InMemoryEpisodicStore::default());
        let agent = Agent::start(&config, brain.clone(), store.clone());
        agent.submit("ping").unwrap();

        let idle = agent.wait_until_idle(Duration::from_millis(5));
        tokio::time::timeout(Duration::from_secs(5), idle).await.unwrap();
        agent.shutdown().await.unwrap();
        assert!(brain.calls_of(BrainOp::Reflect).is_empty());
        assert!(store.is_empty());
    }
}
