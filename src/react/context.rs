//! 调用上下文：每次调用 Brain 前从 Activity 拼出的输入
//!
//! 完整历史保留在 Activity 内供审计与 reflect 使用；传给 Brain 的只是最近 N 步，
//! 避免 Activity 循环多次后载荷无限增长。

use serde_json::{json, Value};

use crate::activity::{Activity, GOAL_PROGRESS_KEY};

/// 尚无计划时的进度文本
pub const NO_PLAN_YET: &str = "(No plan yet. Create one in Observation phase.)";

/// 默认历史窗口大小
pub const DEFAULT_HISTORY_WINDOW: usize = 5;

#[derive(Debug, Clone)]
pub struct CallContext {
    pub goal: String,
    /// 最近 N 步，每步一行 JSON
    pub history: String,
    /// `{"activityUuid": ..., "variables": {...}}`
    pub beliefs: String,
    pub progress: String,
}

impl CallContext {
    pub fn build(activity: &Activity, window: usize) -> Self {
        Self {
            goal: activity.goal().to_string(),
            history: windowed_history(activity, window),
            beliefs: beliefs_json(activity),
            progress: progress_text(activity),
        }
    }
}

pub fn windowed_history(activity: &Activity, window: usize) -> String {
    activity
        .recent_steps(window)
        .iter()
        .map(|step| step.to_json_line() + "\n")
        .collect()
}

pub fn beliefs_json(activity: &Activity) -> String {
    json!({
        "activityUuid": activity.id().to_string(),
        "variables": activity.snapshot_beliefs(),
    })
    .to_string()
}

/// 保留信念 `goal_progress` 的文本；不存在时给出初始提示
pub fn progress_text(activity: &Activity) -> String {
    match activity.get_belief(GOAL_PROGRESS_KEY) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => NO_PLAN_YET.to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn events_json(events: &[Value]) -> String {
    serde_json::to_string(events).unwrap_or_else(|e| {
        tracing::warn!("Failed to serialize events: {}", e);
        "[]".to_string()
    })
}

/// reflect 使用的完整历史（不加窗口）
pub fn full_history(activity: &Activity) -> String {
    windowed_history(activity, usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{Step, StepPhase};
    use std::collections::BTreeMap;

    #[test]
    fn test_progress_defaults_until_planned() {
        let a = Activity::new("g");
        assert_eq!(progress_text(&a), NO_PLAN_YET);
        a.set_belief(GOAL_PROGRESS_KEY, json!("1 [ ] ping"));
        assert_eq!(progress_text(&a), "1 [ ] ping");
    }

    #[test]
    fn test_history_is_windowed_but_full_history_is_not() {
        let a = Activity::new("g");
        for i in 0..7 {
            a.append_step(Step::new(StepPhase::Act, "g", format!("step-{i}"), BTreeMap::new()));
        }
        let ctx = CallContext::build(&a, DEFAULT_HISTORY_WINDOW);
        assert_eq!(ctx.history.lines().count(), 5);
        assert!(!ctx.history.contains("step-1"));
        assert!(ctx.history.contains("step-6"));
        assert_eq!(full_history(&a).lines().count(), 7);
    }

    #[test]
    fn test_beliefs_json_carries_activity_id() {
        let a = Activity::new("g");
        a.set_belief("k", json!(42));
        let v: Value = serde_json::from_str(&beliefs_json(&a)).unwrap();
        assert_eq!(v["activityUuid"], a.id().to_string());
        assert_eq!(v["variables"]["k"], 42);
    }

    #[test]
    fn test_events_json_empty() {
        assert_eq!(events_json(&[]), "[]");
    }
}
