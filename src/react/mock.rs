//! Mock Brain（用于测试与演示，无需外部推理后端）
//!
//! - MockBrain：按操作排队的脚本化回复 + 调用记录，队列空时返回最保守的默认值
//! - DemoBrain：确定性的演示大脑，规划 -> 调用外部工具 -> 等待事件 -> 完成

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::react::context::NO_PLAN_YET;
use crate::react::{Brain, BrainError};

/// Brain 操作名
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BrainOp {
    Reason,
    Act,
    Observe,
    Reflect,
}

/// 一次被记录的调用
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub op: BrainOp,
    pub goal: String,
    pub history: String,
    pub beliefs: String,
    pub events: Option<String>,
    pub progress: Option<String>,
}

type Reply = Result<String, BrainError>;
type Hook = Arc<dyn Fn(&RecordedCall) + Send + Sync>;

#[derive(Default)]
struct Script {
    reason: VecDeque<Reply>,
    act: VecDeque<Reply>,
    observe: VecDeque<Reply>,
    reflect: VecDeque<Reply>,
}

impl Script {
    fn queue(&mut self, op: BrainOp) -> &mut VecDeque<Reply> {
        match op {
            BrainOp::Reason => &mut self.reason,
            BrainOp::Act => &mut self.act,
            BrainOp::Observe => &mut self.observe,
            BrainOp::Reflect => &mut self.reflect,
        }
    }
}

/// 脚本化 Brain
#[derive(Default)]
pub struct MockBrain {
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedCall>>,
    /// 在返回回复之前执行（用于模拟「调用进行中」外部事件到达）
    hook: Mutex<Option<Hook>>,
}

impl MockBrain {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条 op 的回复
    pub fn push_reply(&self, op: BrainOp, reply: impl Into<String>) -> &Self {
        self.script.lock().queue(op).push_back(Ok(reply.into()));
        self
    }

    /// 追加一条 op 的失败
    pub fn push_error(&self, op: BrainOp, err: BrainError) -> &Self {
        self.script.lock().queue(op).push_back(Err(err));
        self
    }

    pub fn set_hook(&self, hook: impl Fn(&RecordedCall) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, op: BrainOp) -> Vec<RecordedCall> {
        self.calls.lock().iter().filter(|c| c.op == op).cloned().collect()
    }

    fn default_reply(op: BrainOp) -> &'static str {
        match op {
            BrainOp::Reason => "No further planning needed.",
            BrainOp::Act => r#"{"tool_name": null, "summary": "nothing to do"}"#,
            BrainOp::Observe => r#"{"completed": false}"#,
            BrainOp::Reflect => "",
        }
    }

    fn answer(&self, call: RecordedCall) -> Reply {
        let op = call.op;
        self.calls.lock().push(call.clone());
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(&call);
        }
        self.script
            .lock()
            .queue(op)
            .pop_front()
            .unwrap_or_else(|| Ok(Self::default_reply(op).to_string()))
    }
}

#[async_trait]
impl Brain for MockBrain {
    async fn reason(&self, goal: &str, history: &str, beliefs: &str, progress: &str) -> Reply {
        self.answer(RecordedCall {
            op: BrainOp::Reason,
            goal: goal.to_string(),
            history: history.to_string(),
            beliefs: beliefs.to_string(),
            events: None,
            progress: Some(progress.to_string()),
        })
    }

    async fn act(&self, goal: &str, history: &str, beliefs: &str, progress: &str) -> Reply {
        self.answer(RecordedCall {
            op: BrainOp::Act,
            goal: goal.to_string(),
            history: history.to_string(),
            beliefs: beliefs.to_string(),
            events: None,
            progress: Some(progress.to_string()),
        })
    }

    async fn observe(
        &self,
        goal: &str,
        history: &str,
        beliefs: &str,
        events: &str,
        progress: &str,
    ) -> Reply {
        self.answer(RecordedCall {
            op: BrainOp::Observe,
            goal: goal.to_string(),
            history: history.to_string(),
            beliefs: beliefs.to_string(),
            events: Some(events.to_string()),
            progress: Some(progress.to_string()),
        })
    }

    async fn reflect(&self, goal: &str, final_status: &str, full_history: &str) -> Reply {
        self.answer(RecordedCall {
            op: BrainOp::Reflect,
            goal: goal.to_string(),
            history: full_history.to_string(),
            beliefs: String::new(),
            events: None,
            progress: Some(final_status.to_string()),
        })
    }
}

/// 演示用确定性 Brain：首轮建立计划，行动时调用一个外部工具并挂起，观察到事件后完成
#[derive(Debug, Default)]
pub struct DemoBrain;

/// DemoBrain 行动阶段声明调用的工具名
pub const DEMO_TOOL: &str = "external_task";

#[async_trait]
impl Brain for DemoBrain {
    async fn reason(&self, goal: &str, _history: &str, _beliefs: &str, progress: &str) -> Reply {
        Ok(format!(
            "Goal '{}': next pending item is the first [ ] entry of:\n{}",
            goal, progress
        ))
    }

    async fn act(&self, _goal: &str, _history: &str, _beliefs: &str, _progress: &str) -> Reply {
        Ok(format!(
            r#"{{"tool_name": "{DEMO_TOOL}", "summary": "external task started, waiting for its completion event"}}"#
        ))
    }

    async fn observe(
        &self,
        _goal: &str,
        _history: &str,
        _beliefs: &str,
        events: &str,
        progress: &str,
    ) -> Reply {
        let events: Vec<serde_json::Value> = serde_json::from_str(events).unwrap_or_default();
        let reply = if !events.is_empty() {
            serde_json::json!({
                "completed": true,
                "summary": "completion event observed",
                "new_progress": "1 [x] start external task\n2 [x] receive completion event",
                "update_variables": {"last_events": events}
            })
        } else if progress == NO_PLAN_YET {
            serde_json::json!({
                "completed": false,
                "summary": "initial plan created",
                "new_progress": "1 [ ] start external task\n2 [ ] receive completion event"
            })
        } else {
            serde_json::json!({"completed": false, "summary": "no events yet"})
        };
        Ok(reply.to_string())
    }

    async fn reflect(&self, goal: &str, final_status: &str, full_history: &str) -> Reply {
        let steps = full_history.lines().count();
        Ok(serde_json::json!({
            "summary": format!("'{}' finished as {} after {} steps", goal, final_status, steps),
            "outcome": "SUCCESS",
            "procedure": [DEMO_TOOL, "wait for completion event"]
        })
        .to_string())
    }
}
