//! Agent output parsing
//!
//! Agent CLIs either print plain text or, with a JSON output format, a
//! result object such as
//! `{"type":"result","is_error":false,"result":"...","total_cost_usd":0.1,
//! "usage":{"input_tokens":10,"output_tokens":20}}`. Stream formats print one
//! JSON object per line and end with the result object.

use crate::task::TokenUsage;
use serde_json::Value;

/// Text and counters extracted from raw agent output
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentOutput {
    /// The agent's answer
    pub text: String,
    /// Token/cost counters, when the agent reported them
    pub usage: Option<TokenUsage>,
    /// The agent flagged its own result as an error
    pub is_error: bool,
}

impl AgentOutput {
    /// Parse captured output; anything that is not a result object is plain text
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(parsed) = parse_result_object(trimmed) {
            return parsed;
        }

        // Stream output: the last result object wins
        for line in trimmed.lines().rev() {
            if let Some(parsed) = parse_result_object(line.trim()) {
                return parsed;
            }
        }

        Self {
            text: trimmed.to_string(),
            usage: None,
            is_error: false,
        }
    }
}

fn parse_result_object(candidate: &str) -> Option<AgentOutput> {
    if !candidate.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(candidate).ok()?;
    let object = value.as_object()?;
    let text = object.get("result")?.as_str()?.to_string();

    let is_error = object
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let cost_usd = object
        .get("total_cost_usd")
        .or_else(|| object.get("cost_usd"))
        .and_then(Value::as_f64);
    let counters = object.get("usage").and_then(Value::as_object);
    let tokens = |key: &str| counters.and_then(|u| u.get(key)).and_then(Value::as_u64);
    let input_tokens = tokens("input_tokens");
    let output_tokens = tokens("output_tokens");

    let usage = if input_tokens.is_some() || output_tokens.is_some() || cost_usd.is_some() {
        Some(TokenUsage {
            input_tokens: input_tokens.unwrap_or(0),
            output_tokens: output_tokens.unwrap_or(0),
            cost_usd,
        })
    } else {
        None
    };

    Some(AgentOutput {
        text,
        usage,
        is_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        let out = AgentOutput::parse("  Here is the summary.\n");
        assert_eq!(out.text, "Here is the summary.");
        assert_eq!(out.usage, None);
        assert!(!out.is_error);
    }

    #[test]
    fn json_result_object() {
        let raw = r#"{"type":"result","is_error":false,"result":"All done","total_cost_usd":0.25,"usage":{"input_tokens":100,"output_tokens":40}}"#;
        let out = AgentOutput::parse(raw);

        assert_eq!(out.text, "All done");
        let usage = out.usage.unwrap();
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 40);
        assert_eq!(usage.total_tokens(), 140);
        assert_eq!(usage.cost_usd, Some(0.25));
    }

    #[test]
    fn stream_output_uses_last_result_line() {
        let raw = concat!(
            r#"{"type":"system","subtype":"init"}"#,
            "\n",
            r#"{"type":"assistant","message":"working"}"#,
            "\n",
            r#"{"type":"result","result":"final answer","is_error":true}"#,
            "\n"
        );
        let out = AgentOutput::parse(raw);

        assert_eq!(out.text, "final answer");
        assert!(out.is_error);
        assert_eq!(out.usage, None);
    }

    #[test]
    fn json_without_result_is_plain_text() {
        let raw = r#"{"answer": 42}"#;
        assert_eq!(AgentOutput::parse(raw).text, raw);
    }
}
