//! 单步记录：一次 reason / act / observe 调用的输入、输出与当时的信念快照
//!
//! 历史只追加不改写；传给 Brain 的只是最近 N 步的窗口（见 react::context）。

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// 步骤所属阶段
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPhase {
    Reason,
    Act,
    Observe,
}

impl StepPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepPhase::Reason => "reason",
            StepPhase::Act => "act",
            StepPhase::Observe => "observe",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Step {
    pub timestamp: DateTime<Utc>,
    pub phase: StepPhase,
    pub input: String,
    /// Brain 原始输出（通常是 JSON，但不保证）
    pub result: String,
    /// 创建时刻的信念快照，之后不再变化
    pub beliefs: BTreeMap<String, Value>,
    /// 本步消费的事件；reason / act 恒为空
    pub events: Vec<Value>,
}

impl Step {
    pub fn new(
        phase: StepPhase,
        input: impl Into<String>,
        result: impl Into<String>,
        beliefs: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            phase,
            input: input.into(),
            result: result.into(),
            beliefs,
            events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<Value>) -> Self {
        self.events = events;
        self
    }

    /// 单行 JSON，供历史窗口逐条拼接
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::debug!("Failed to serialize step: {}", e);
            format!(r#"{{"phase":"{}"}}"#, self.phase.as_str())
        })
    }
}
