//! Activity 注册表：id -> Activity 的并发索引，用于事件路由与生命周期清理
//!
//! 每个 id 只对应一个存活的 Activity；到达终态时移除且只移除一次。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::activity::{Activity, ActivityId};

#[derive(Default)]
pub struct ActivityRegistry {
    activities: RwLock<HashMap<ActivityId, Arc<Activity>>>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册；id 已存在时不覆盖并返回 false
    pub fn register(&self, activity: Arc<Activity>) -> bool {
        let mut map = self.activities.write();
        if map.contains_key(&activity.id()) {
            return false;
        }
        map.insert(activity.id(), activity);
        true
    }

    pub fn get(&self, id: ActivityId) -> Option<Arc<Activity>> {
        self.activities.read().get(&id).cloned()
    }

    /// 以字符串形式的 correlation id 查找；无法解析为 id 时视为不存在
    pub fn get_by_correlation(&self, correlation_id: &str) -> Option<Arc<Activity>> {
        let id = correlation_id.parse::<ActivityId>().ok()?;
        self.get(id)
    }

    pub fn deregister(&self, id: ActivityId) -> Option<Arc<Activity>> {
        self.activities.write().remove(&id)
    }

    pub fn contains(&self, id: ActivityId) -> bool {
        self.activities.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.activities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.activities.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<Activity>> {
        self.activities.read().values().cloned().collect()
    }
}
