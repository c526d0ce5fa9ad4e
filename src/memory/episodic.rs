//! 情景记忆记录：一个已完成 Activity 的目标、结果、摘要与有效步骤

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::react::parse_structured;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicRecord {
    pub id: String,
    pub original_goal: String,
    /// "SUCCESS" / "FAILURE" / "ABANDONED" 等
    pub outcome: String,
    pub summary: String,
    pub procedure: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl EpisodicRecord {
    pub fn new(
        original_goal: impl Into<String>,
        outcome: impl Into<String>,
        summary: impl Into<String>,
        procedure: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            original_goal: original_goal.into(),
            outcome: outcome.into(),
            summary: summary.into(),
            procedure,
            timestamp: Utc::now(),
        }
    }

    /// 由 reflect 输出构建记录。能解析出 JSON 时取 summary / outcome / procedure，
    /// 否则整段文本作为摘要；输出为空时返回 None
    pub fn from_reflection(goal: &str, default_outcome: &str, text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let Ok(obj) = parse_structured(trimmed) else {
            return Some(Self::new(goal, default_outcome, trimmed, Vec::new()));
        };

        let summary = obj
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| trimmed.to_string());
        let outcome = obj
            .get("outcome")
            .and_then(Value::as_str)
            .filter(|o| !o.trim().is_empty())
            .unwrap_or(default_outcome);
        let procedure = match obj.get("procedure") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        };
        Some(Self::new(goal, outcome, summary, procedure))
    }

    /// 检索时返回给后续 Activity 的文本
    pub fn to_text_content(&self) -> String {
        let mut text = format!(
            "PAST TASK: {}\nOUTCOME: {}\nSUMMARY: {}\nPROCEDURE USED:",
            self.original_goal, self.outcome, self.summary
        );
        for step in &self.procedure {
            text.push_str("\n- ");
            text.push_str(step);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_reflection_structured() {
        let text = r#"```json
{"summary": "timer fired", "outcome": "SUCCESS", "procedure": ["subscribe", "set timer"]}
```"#;
        let record = EpisodicRecord::from_reflection("set a timer", "COMPLETED", text).unwrap();
        assert_eq!(record.summary, "timer fired");
        assert_eq!(record.outcome, "SUCCESS");
        assert_eq!(record.procedure, vec!["subscribe", "set timer"]);
    }

    #[test]
    fn test_from_reflection_free_text() {
        let record = EpisodicRecord::from_reflection("g", "COMPLETED", "It went fine.").unwrap();
        assert_eq!(record.summary, "It went fine.");
        assert_eq!(record.outcome, "COMPLETED");
        assert!(record.procedure.is_empty());
    }

    #[test]
    fn test_from_reflection_empty() {
        assert!(EpisodicRecord::from_reflection("g", "COMPLETED", "  ").is_none());
    }

    #[test]
    fn test_text_content_lists_procedure() {
        let record = EpisodicRecord::new("g", "SUCCESS", "s", vec!["a".into(), "b".into()]);
        let text = record.to_text_content();
        assert!(text.starts_with("PAST TASK: g"));
        assert!(text.ends_with("- a\n- b"));
    }
}
