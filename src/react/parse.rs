//! 宽容解析 Brain 输出
//!
//! Brain 返回的是自由文本：可能裹着 ```json 围栏、前后带解释文字，甚至根本不是 JSON。
//! 先定位最外层配平的 `{...}` 片段再做结构化解析，失败时返回带标签的 MalformedResponse，
//! 上层据此退回最保守的解释：没有调用工具、没有完成、没有信念更新。

use serde_json::{Map, Value};
use thiserror::Error;

/// 结构化解析失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedResponse {
    #[error("Empty response")]
    Empty,

    #[error("No balanced JSON object in response")]
    NoObject,

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

/// 定位第一个 `{` 与其配平的 `}`，忽略字符串字面量内部的括号与转义
pub fn extract_json_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// 解析为 JSON 对象
pub fn parse_structured(text: &str) -> Result<Map<String, Value>, MalformedResponse> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(MalformedResponse::Empty);
    }
    let span = extract_json_span(trimmed).ok_or(MalformedResponse::NoObject)?;
    match serde_json::from_str::<Value>(span) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(MalformedResponse::NoObject),
        Err(e) => Err(MalformedResponse::InvalidJson(e.to_string())),
    }
}

/// 布尔或字符串化布尔（大小写不敏感）
fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => Some(s.trim().eq_ignore_ascii_case("true")),
        _ => None,
    }
}

fn completed_flag(obj: &Map<String, Value>) -> bool {
    if let Some(flag) = obj.get("completed").and_then(as_flag) {
        return flag;
    }
    obj.get("result")
        .and_then(|r| r.get("completed"))
        .and_then(as_flag)
        .unwrap_or(false)
}

/// 完成标记：顶层 `completed` 或 `result.completed`；任何解析失败都视为未完成
pub fn parse_completed(text: &str) -> bool {
    match parse_structured(text) {
        Ok(obj) => completed_flag(&obj),
        Err(e) => {
            tracing::warn!(
                "Could not parse completion flag ({}), keeping activity alive. Response: {}",
                e,
                text
            );
            false
        }
    }
}

/// ACTION 阶段的解析结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActDecision {
    /// 被调用的外部工具；None 表示未调用
    pub tool_name: Option<String>,
    pub summary: Option<String>,
}

impl ActDecision {
    pub fn invoked_tool(&self) -> bool {
        self.tool_name.is_some()
    }
}

pub fn parse_act(text: &str) -> ActDecision {
    let obj = match parse_structured(text) {
        Ok(obj) => obj,
        Err(e) => {
            tracing::warn!("Invalid JSON in ACT response ({}): {}", e, text);
            return ActDecision::default();
        }
    };
    let tool_name = obj
        .get("tool_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("null"))
        .map(str::to_string);
    let summary = obj.get("summary").and_then(Value::as_str).map(str::to_string);
    ActDecision { tool_name, summary }
}

/// OBSERVATION 阶段的解析结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationOutcome {
    pub completed: bool,
    pub summary: Option<String>,
    /// 替换进度跟踪文本
    pub new_progress: Option<String>,
    /// 逐条写入的信念更新
    pub belief_updates: Vec<(String, Value)>,
}

pub fn parse_observation(text: &str) -> ObservationOutcome {
    let obj = match parse_structured(text) {
        Ok(obj) => obj,
        Err(e) => {
            tracing::warn!(
                "Could not parse OBSERVE response ({}), keeping activity alive. Response: {}",
                e,
                text
            );
            return ObservationOutcome::default();
        }
    };

    let new_progress = match obj.get("new_progress") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };
    let belief_updates = match obj.get("update_variables") {
        Some(Value::Object(updates)) => updates
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => Vec::new(),
    };

    ObservationOutcome {
        completed: completed_flag(&obj),
        summary: obj.get("summary").and_then(Value::as_str).map(str::to_string),
        new_progress,
        belief_updates,
    }
}
