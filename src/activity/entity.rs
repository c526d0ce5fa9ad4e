//! Activity 实体
//!
//! - status：原子类型，跨线程立即可见；迁移只走合法边（CAS）
//! - beliefs：upsert、后写覆盖、忽略 null，不同 Activity 之间严格隔离
//! - pending events：FIFO 追加，consume_events 一次性取空
//! - history：只追加

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use super::{ActivityId, ActivityStatus, Step, TransitionError};

/// 保留信念键：进度跟踪（Master Plan 文本），由 observe 阶段维护
pub const GOAL_PROGRESS_KEY: &str = "goal_progress";
/// 保留信念键：提交时从长期记忆召回的相关经验
pub const RELEVANT_MEMORIES_KEY: &str = "relevant_memories";

pub struct Activity {
    id: ActivityId,
    goal: String,
    created_at: DateTime<Utc>,
    status: AtomicU8,
    beliefs: RwLock<HashMap<String, Value>>,
    pending_events: Mutex<Vec<Value>>,
    history: RwLock<Vec<Step>>,
    /// 已完成的 observe 轮数
    cycles: AtomicU64,
    /// 进入 WAITING_FOR_EVENT 的时刻，用于可选的挂起超时
    parked_at: Mutex<Option<Instant>>,
}

impl Activity {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            id: ActivityId::new(),
            goal: goal.into(),
            created_at: Utc::now(),
            status: AtomicU8::new(ActivityStatus::Observation.to_u8()),
            beliefs: RwLock::new(HashMap::new()),
            pending_events: Mutex::new(Vec::new()),
            history: RwLock::new(Vec::new()),
            cycles: AtomicU64::new(0),
            parked_at: Mutex::new(None),
        }
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> ActivityStatus {
        ActivityStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn is_completed(&self) -> bool {
        self.status().is_terminal()
    }

    /// 从当前状态迁移到 next；边不合法时返回 Illegal，并发修改时返回 Stale
    pub(crate) fn transition(
        &self,
        next: ActivityStatus,
    ) -> Result<ActivityStatus, TransitionError> {
        let current = self.status();
        self.compare_and_transition(current, next)?;
        Ok(current)
    }

    /// 仅当状态仍为 expected 时迁移到 next。调度器与路由器争抢唤醒时只有一方成功
    pub(crate) fn compare_and_transition(
        &self,
        expected: ActivityStatus,
        next: ActivityStatus,
    ) -> Result<(), TransitionError> {
        if !expected.can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: expected,
                to: next,
            });
        }
        // 持锁完成 CAS，保证 parked_at 与 status 同步更新
        let mut parked = self.parked_at.lock();
        self.status
            .compare_exchange(
                expected.to_u8(),
                next.to_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|actual| TransitionError::Stale {
                expected,
                actual: ActivityStatus::from_u8(actual),
            })?;
        *parked = match next {
            ActivityStatus::WaitingForEvent => Some(Instant::now()),
            _ => None,
        };
        Ok(())
    }

    /// WAITING_FOR_EVENT -> OBSERVATION 的 CAS；返回 true 的一方负责重新入队
    pub(crate) fn try_wake(&self) -> bool {
        self.compare_and_transition(ActivityStatus::WaitingForEvent, ActivityStatus::Observation)
            .is_ok()
    }

    /// 挂起时长；未挂起时为 None
    pub fn parked_for(&self) -> Option<Duration> {
        self.parked_at.lock().map(|t| t.elapsed())
    }

    pub fn push_event(&self, event: Value) {
        self.pending_events.lock().push(event);
    }

    /// 原子地取出并清空待处理事件
    pub fn consume_events(&self) -> Vec<Value> {
        std::mem::take(&mut *self.pending_events.lock())
    }

    pub fn has_events(&self) -> bool {
        !self.pending_events.lock().is_empty()
    }

    /// upsert；null 值被忽略（不存在删除语义）。返回是否写入
    pub fn set_belief(&self, key: impl Into<String>, value: Value) -> bool {
        if value.is_null() {
            return false;
        }
        self.beliefs.write().insert(key.into(), value);
        true
    }

    pub fn get_belief(&self, key: &str) -> Option<Value> {
        self.beliefs.read().get(key).cloned()
    }

    /// 时间点快照（按键排序，便于稳定序列化）
    pub fn snapshot_beliefs(&self) -> BTreeMap<String, Value> {
        self.beliefs
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn append_step(&self, step: Step) {
        self.history.write().push(step);
    }

    pub fn history(&self) -> Vec<Step> {
        self.history.read().clone()
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    /// 最近 n 步（按时间顺序）
    pub fn recent_steps(&self, n: usize) -> Vec<Step> {
        let history = self.history.read();
        let start = history.len().saturating_sub(n);
        history[start..].to_vec()
    }

    pub fn last_step(&self) -> Option<Step> {
        self.history.read().last().cloned()
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub(crate) fn record_cycle(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 供外部轮询的只读视图
    pub fn view(&self) -> ActivityView {
        ActivityView {
            uuid: self.id,
            goal: self.goal.clone(),
            status: self.status(),
            created_at: self.created_at,
            variables: self.snapshot_beliefs(),
            history: self.history(),
        }
    }
}

impl std::fmt::Debug for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Activity")
            .field("id", &self.id)
            .field("goal", &self.goal)
            .field("status", &self.status())
            .field("steps", &self.history_len())
            .finish()
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityView {
    pub uuid: ActivityId,
    pub goal: String,
    pub status: ActivityStatus,
    pub created_at: DateTime<Utc>,
    pub variables: BTreeMap<String, Value>,
    pub history: Vec<Step>,
}
