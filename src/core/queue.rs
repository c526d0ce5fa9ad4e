//! 就绪队列：FIFO，单消费者（调度器），多生产者（提交、调度器重新入队、事件路由唤醒）
//!
//! pop 是带超时的有界等待，调度器借此在空闲时也能观察到停止信号。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::activity::{Activity, ActivityId};

#[derive(Default)]
pub struct ReadyQueue {
    inner: Mutex<VecDeque<Arc<Activity>>>,
    notify: Notify,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, activity: Arc<Activity>) {
        tracing::debug!("Enqueued activity {} ({})", activity.id(), activity.status());
        self.inner.lock().push_back(activity);
        self.notify.notify_one();
    }

    pub fn try_pop(&self) -> Option<Arc<Activity>> {
        self.inner.lock().pop_front()
    }

    /// 等待至多 timeout；超时返回 None
    pub async fn pop(&self, timeout: Duration) -> Option<Arc<Activity>> {
        let deadline = Instant::now() + timeout;
        loop {
            // 先登记等待再检查队列，避免 push 恰好发生在两者之间时丢失唤醒
            let notified = self.notify.notified();
            if let Some(activity) = self.try_pop() {
                return Some(activity);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    pub fn contains(&self, id: ActivityId) -> bool {
        self.inner.lock().iter().any(|a| a.id() == id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<ActivityId> {
        self.inner.lock().iter().map(|a| a.id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let q = ReadyQueue::new();
        let a = Arc::new(Activity::new("a"));
        let b = Arc::new(Activity::new("b"));
        q.push(a.clone());
        q.push(b.clone());
        assert!(q.contains(a.id()));
        assert_eq!(q.pop(Duration::from_millis(10)).await.unwrap().id(), a.id());
        assert_eq!(q.pop(Duration::from_millis(10)).await.unwrap().id(), b.id());
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_pop_times_out_when_empty() {
        let q = ReadyQueue::new();
        assert!(q.pop(Duration::from_millis(20)).await.is_none());
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let q = Arc::new(ReadyQueue::new());
        let producer = q.clone();
        let activity = Arc::new(Activity::new("late"));
        let id = activity.id();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(activity);
        });
        let popped = q.pop(Duration::from_secs(5)).await.unwrap();
        assert_eq!(popped.id(), id);
    }
}
