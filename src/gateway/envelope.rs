//! 入站消息信封
//!
//! 规范形状：`{"kind": "event"|"belief", "correlationId": "...", ...payload}`。
//! 同时兼容工具服务器推送的通知形状：
//!
//! ```text
//! data: {"jsonrpc":"2.0","method":"notifications/message",
//!        "params":{"uuid":"...","mcpType":"event","event":{...}}}
//! data: {"jsonrpc":"2.0","method":"notifications/message",
//!        "params":{"uuid":"...","mcpType":"variable","name":"k","value":42}}
//! ```

use serde_json::{json, Map, Value};

use crate::core::RoutingError;

const KIND_FIELDS: [&str; 2] = ["kind", "mcpType"];
const CORRELATION_FIELDS: [&str; 3] = ["correlationId", "correlation_id", "uuid"];

/// 消息种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// 领域事件，缓冲到目标 Activity 并在挂起时唤醒它
    Event,
    /// 信念更新：payload 携带 key 与 value
    Belief,
    /// 未知种类，路由时拒绝
    Other(String),
}

impl EnvelopeKind {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" => EnvelopeKind::Event,
            "belief" | "variable" => EnvelopeKind::Belief,
            other => EnvelopeKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EnvelopeKind::Event => "event",
            EnvelopeKind::Belief => "belief",
            EnvelopeKind::Other(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 路由信封
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    /// 目标 Activity 的 id；缺失时消息会被丢弃
    pub correlation_id: Option<String>,
    pub payload: Value,
}

impl Envelope {
    pub fn event(correlation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: EnvelopeKind::Event,
            correlation_id: Some(correlation_id.into()),
            payload,
        }
    }

    pub fn belief(correlation_id: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            kind: EnvelopeKind::Belief,
            correlation_id: Some(correlation_id.into()),
            payload: json!({ "key": key.into(), "value": value }),
        }
    }

    /// 从 JSON 值解码（规范形状或通知形状）
    pub fn from_value(value: Value) -> Result<Self, RoutingError> {
        let Value::Object(mut outer) = value else {
            return Err(RoutingError::Malformed(
                "inbound message is not a JSON object".to_string(),
            ));
        };
        let mut body = match outer.remove("params") {
            Some(Value::Object(params)) => params,
            Some(other) => {
                outer.insert("params".to_string(), other);
                outer
            }
            None => outer,
        };

        let kind = take_string(&mut body, &KIND_FIELDS)
            .map(|k| EnvelopeKind::parse(&k))
            .ok_or_else(|| RoutingError::Malformed("missing message kind".to_string()))?;
        let correlation_id = take_string(&mut body, &CORRELATION_FIELDS)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let payload = match kind {
            EnvelopeKind::Event => body
                .remove("payload")
                .or_else(|| body.remove("event"))
                .unwrap_or(Value::Object(body)),
            _ => match body.remove("payload") {
                Some(Value::Object(inner)) => Value::Object(inner),
                Some(other) => {
                    body.insert("payload".to_string(), other);
                    Value::Object(body)
                }
                None => Value::Object(body),
            },
        };

        Ok(Self {
            kind,
            correlation_id,
            payload,
        })
    }

    /// 解码一行文本；空行与流结束标记返回 None
    pub fn from_line(line: &str) -> Option<Result<Self, RoutingError>> {
        let line = line.trim();
        let line = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if line.is_empty() || line == "[DONE]" {
            return None;
        }
        Some(
            serde_json::from_str::<Value>(line)
                .map_err(|e| RoutingError::Malformed(e.to_string()))
                .and_then(Self::from_value),
        )
    }

    /// 信念更新的 (key, value)；key 取 `key` 或 `name`
    pub fn belief_entry(&self) -> Option<(String, Value)> {
        let key = ["key", "name"]
            .iter()
            .find_map(|f| self.payload.get(*f).and_then(Value::as_str))
            .map(str::trim)
            .filter(|k| !k.is_empty())?;
        let value = self.payload.get("value").cloned().unwrap_or(Value::Null);
        Some((key.to_string(), value))
    }

    /// 编码为规范形状
    pub fn to_value(&self) -> Value {
        let mut map = match &self.payload {
            Value::Object(m) if self.kind != EnvelopeKind::Event => m.clone(),
            other => {
                let mut m = Map::new();
                m.insert("payload".to_string(), other.clone());
                m
            }
        };
        map.insert("kind".to_string(), json!(self.kind.as_str()));
        if let Some(id) = &self.correlation_id {
            map.insert("correlationId".to_string(), json!(id));
        }
        Value::Object(map)
    }
}

fn take_string(body: &mut Map<String, Value>, fields: &[&str]) -> Option<String> {
    for field in fields {
        if let Some(Value::String(s)) = body.remove(*field) {
            return Some(s);
        }
    }
    None
}
