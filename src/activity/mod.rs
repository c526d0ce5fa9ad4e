//! Activity 层：单个异步目标任务的状态机、信念表、待处理事件缓冲与步骤历史
//!
//! Activity 由调度器（status / history）与事件路由器（beliefs / pending events）共同写入，
//! 两侧写入的字段互不重叠，因此只需要每个 Activity 内部的锁与原子状态即可。

pub mod entity;
pub mod status;
pub mod step;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use entity::{Activity, ActivityView, GOAL_PROGRESS_KEY, RELEVANT_MEMORIES_KEY};
pub use status::{ActivityStatus, TransitionError};
pub use step::{Step, StepPhase};

/// Activity 唯一标识（UUID v4），同时作为外部事件的 correlation id
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(Uuid);

impl ActivityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActivityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActivityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_id_roundtrip_through_string() {
        let id = ActivityId::new();
        let parsed: ActivityId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_activity_id_rejects_garbage() {
        assert!("global".parse::<ActivityId>().is_err());
    }
}
