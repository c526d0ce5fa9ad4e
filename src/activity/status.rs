//! Activity 状态机
//!
//! 初始状态为 OBSERVATION（首轮先建立计划再推理），COMPLETED 为终态。
//! 合法边：
//! - REASONING -> ACTION
//! - REASONING -> OBSERVATION（有待处理事件时抢占规划）
//! - ACTION -> OBSERVATION / WAITING_FOR_EVENT
//! - WAITING_FOR_EVENT -> OBSERVATION
//! - OBSERVATION -> REASONING / COMPLETED

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ActivityStatus {
    Reasoning = 0,
    Action = 1,
    WaitingForEvent = 2,
    Observation = 3,
    Completed = 4,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Reasoning => "REASONING",
            ActivityStatus::Action => "ACTION",
            ActivityStatus::WaitingForEvent => "WAITING_FOR_EVENT",
            ActivityStatus::Observation => "OBSERVATION",
            ActivityStatus::Completed => "COMPLETED",
        }
    }

    /// 是否存在 self -> next 的合法边
    pub fn can_transition_to(&self, next: ActivityStatus) -> bool {
        use ActivityStatus::*;
        matches!(
            (self, next),
            (Reasoning, Action)
                | (Reasoning, Observation)
                | (Action, Observation)
                | (Action, WaitingForEvent)
                | (WaitingForEvent, Observation)
                | (Observation, Reasoning)
                | (Observation, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ActivityStatus::Completed)
    }

    pub(crate) fn to_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ActivityStatus::Reasoning,
            1 => ActivityStatus::Action,
            2 => ActivityStatus::WaitingForEvent,
            3 => ActivityStatus::Observation,
            _ => ActivityStatus::Completed,
        }
    }
}

impl fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 非法状态迁移（或 CAS 时当前状态已被另一侧改变）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Illegal transition {from} -> {to}")]
    Illegal {
        from: ActivityStatus,
        to: ActivityStatus,
    },

    #[error("Status changed concurrently: expected {expected}, found {actual}")]
    Stale {
        expected: ActivityStatus,
        actual: ActivityStatus,
    },
}
