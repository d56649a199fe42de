//! Typed view of the JSON salt returns for one minion.
//!
//! Salt returns are loosely typed: `result` may be missing, `comment` may be a
//! list, `changes` may be anything. These types normalize them once so the
//! classifier and aggregator never look at raw JSON.

use serde_json::{Map, Value};

use crate::error::FormatError;

/// Comment salt attaches to a step skipped because a requisite failed.
pub const REQUISITE_FAILED: &str = "One or more requisite failed";

/// Outcome salt reported for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Succeeded,
    Failed,
    /// `result` was null or missing: the step never ran.
    NotEvaluated,
}

impl StepResult {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Self::NotEvaluated,
            Some(value) if is_truthy(value) => Self::Succeeded,
            Some(_) => Self::Failed,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Succeeded
    }
}

/// The `changes` payload of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Changes {
    Empty,
    /// A mapping carrying `stdout` and/or `stderr` (e.g. `cmd.run`).
    CommandOutput { stdout: String, stderr: String },
    Structured(Map<String, Value>),
    /// Any non-mapping value, shown as-is.
    Opaque(Value),
}

impl Changes {
    pub fn from_value(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::Empty;
        };
        if !is_truthy(value) {
            return Self::Empty;
        }
        match value {
            Value::Object(map) if map.contains_key("stdout") || map.contains_key("stderr") => {
                Self::CommandOutput {
                    stdout: text_field(map, "stdout"),
                    stderr: text_field(map, "stderr"),
                }
            }
            Value::Object(map) => Self::Structured(map.clone()),
            other => Self::Opaque(other.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// One normalized step record.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub result: StepResult,
    pub comment: String,
    pub changes: Changes,
    /// Execution ordinal (`__run_num__`), when salt provides it.
    pub run_num: Option<u64>,
}

impl StepRecord {
    pub fn from_map(fields: &Map<String, Value>) -> Self {
        Self {
            result: StepResult::from_value(fields.get("result")),
            comment: comment_text(fields.get("comment")),
            changes: Changes::from_value(fields.get("changes")),
            run_num: fields.get("__run_num__").and_then(Value::as_u64),
        }
    }
}

/// A step record together with its still-encoded step id.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStep {
    pub id: String,
    pub record: StepRecord,
}

/// Everything a minion returned for one state run.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeResult {
    Steps(Vec<RawStep>),
    /// The run failed before producing per-step data.
    ExecutionError(String),
}

impl NodeResult {
    /// Normalize the return of a single minion.
    ///
    /// Steps are kept in document order, or in `__run_num__` order when every
    /// step carries one.
    pub fn from_value(value: &Value) -> Result<Self, FormatError> {
        let map = match value {
            Value::Object(map) => map,
            Value::Array(items) => return Ok(Self::ExecutionError(error_message(items))),
            Value::String(message) => return Ok(Self::ExecutionError(message.clone())),
            other => {
                return Err(FormatError::NodeResult {
                    found: value_kind(other),
                    raw: other.to_string(),
                });
            }
        };

        let mut steps = Vec::with_capacity(map.len());
        for (id, step) in map {
            match step {
                Value::Object(fields) => steps.push(RawStep {
                    id: id.clone(),
                    record: StepRecord::from_map(fields),
                }),
                Value::Array(items) => return Ok(Self::ExecutionError(error_message(items))),
                other => {
                    return Err(FormatError::StepRecord {
                        id: id.clone(),
                        found: value_kind(other),
                        raw: other.to_string(),
                    });
                }
            }
        }
        if steps.iter().all(|step| step.record.run_num.is_some()) {
            steps.sort_by_key(|step| step.record.run_num);
        }
        Ok(Self::Steps(steps))
    }
}

/// Truthiness of a JSON value: null, false, zero and empty containers are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

fn error_message(items: &[Value]) -> String {
    match items.first() {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => "minion returned an empty error list".to_string(),
    }
}

fn text_field(map: &Map<String, Value>, key: &str) -> String {
    match map.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn comment_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_is_tri_state() {
        assert_eq!(
            StepResult::from_value(Some(&json!(true))),
            StepResult::Succeeded
        );
        assert_eq!(
            StepResult::from_value(Some(&json!(false))),
            StepResult::Failed
        );
        assert_eq!(
            StepResult::from_value(Some(&Value::Null)),
            StepResult::NotEvaluated
        );
        assert_eq!(StepResult::from_value(None), StepResult::NotEvaluated);
        assert_eq!(
            StepResult::from_value(Some(&json!("yes"))),
            StepResult::Succeeded
        );
        assert_eq!(StepResult::from_value(Some(&json!(0))), StepResult::Failed);
    }

    #[test]
    fn changes_shapes() {
        assert_eq!(Changes::from_value(None), Changes::Empty);
        assert_eq!(Changes::from_value(Some(&json!({}))), Changes::Empty);
        assert_eq!(Changes::from_value(Some(&json!(""))), Changes::Empty);
        assert_eq!(
            Changes::from_value(Some(&json!({"stdout": "x"}))),
            Changes::CommandOutput {
                stdout: "x".to_string(),
                stderr: String::new(),
            }
        );
        assert!(matches!(
            Changes::from_value(Some(&json!({"nginx": {"old": "", "new": "1.24"}}))),
            Changes::Structured(_)
        ));
        assert_eq!(
            Changes::from_value(Some(&json!("rebooted"))),
            Changes::Opaque(json!("rebooted"))
        );
    }

    #[test]
    fn list_comments_are_joined() {
        let record = StepRecord::from_map(
            json!({"result": false, "comment": ["first", "second"], "changes": {}})
                .as_object()
                .expect("object"),
        );
        assert_eq!(record.comment, "first\nsecond");
    }

    #[test]
    fn error_list_is_execution_error() {
        let result =
            NodeResult::from_value(&json!(["No Top file or master_tops data matches found."]))
                .expect("parse");
        assert_eq!(
            result,
            NodeResult::ExecutionError("No Top file or master_tops data matches found.".to_string())
        );
    }

    #[test]
    fn error_list_inside_a_step_is_execution_error() {
        let result = NodeResult::from_value(&json!({
            "pkg_|-a_|-a_|-installed": ["Rendering SLS 'base:web' failed"],
        }))
        .expect("parse");
        assert_eq!(
            result,
            NodeResult::ExecutionError("Rendering SLS 'base:web' failed".to_string())
        );
    }

    #[test]
    fn steps_follow_run_num_when_present() {
        let result = NodeResult::from_value(&json!({
            "b_|-b_|-b_|-run": {"result": true, "comment": "", "changes": {}, "__run_num__": 1},
            "a_|-a_|-a_|-run": {"result": true, "comment": "", "changes": {}, "__run_num__": 0},
        }))
        .expect("parse");
        let NodeResult::Steps(steps) = result else {
            panic!("expected steps");
        };
        let ids: Vec<&str> = steps.iter().map(|step| step.id.as_str()).collect();
        assert_eq!(ids, vec!["a_|-a_|-a_|-run", "b_|-b_|-b_|-run"]);
    }

    #[test]
    fn steps_keep_document_order_without_run_num() {
        let result = NodeResult::from_value(&json!({
            "z_|-z_|-z_|-run": {"result": true, "comment": "", "changes": {}},
            "a_|-a_|-a_|-run": {"result": true, "comment": "", "changes": {}},
        }))
        .expect("parse");
        let NodeResult::Steps(steps) = result else {
            panic!("expected steps");
        };
        assert_eq!(steps[0].id, "z_|-z_|-z_|-run");
    }

    #[test]
    fn scalar_node_result_is_format_error() {
        let err = NodeResult::from_value(&json!(42)).unwrap_err();
        assert!(matches!(
            err,
            FormatError::NodeResult {
                found: "a number",
                ..
            }
        ));
    }
}
