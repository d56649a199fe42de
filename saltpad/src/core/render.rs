//! Plain-text rendering of step reports.
//!
//! Output is line based and uncolored; the console decides the color from the
//! report severity.

use serde_json::Value;

use crate::core::aggregate::StepReport;
use crate::core::types::{Changes, StepRecord};

const INDENT: &str = "    ";
const SEPARATOR: &str = "----------";

/// Display form of a step's `changes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormattedChange {
    /// Non-mapping value, stringified.
    Opaque(String),
    CommandOutput { stdout: String, stderr: String },
    /// Pretty-printed mapping.
    Structured(String),
}

impl FormattedChange {
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Opaque(text) | Self::Structured(text) => {
                prefix_first_line("Changes: ", text)
            }
            Self::CommandOutput { stdout, stderr } => {
                let mut lines = vec!["Changes:".to_string(), "Stdout:".to_string()];
                lines.extend(indented(stdout));
                lines.push("Stderr:".to_string());
                lines.extend(indented(stderr));
                lines
            }
        }
    }
}

/// Render the `changes` of a record, or `None` when there are none.
pub fn render_change(record: &StepRecord) -> Option<FormattedChange> {
    match &record.changes {
        Changes::Empty => None,
        Changes::CommandOutput { stdout, stderr } => Some(FormattedChange::CommandOutput {
            stdout: stdout.clone(),
            stderr: stderr.clone(),
        }),
        Changes::Structured(map) => {
            let pretty = serde_json::to_string_pretty(map)
                .unwrap_or_else(|_| Value::Object(map.clone()).to_string());
            Some(FormattedChange::Structured(pretty))
        }
        Changes::Opaque(Value::String(text)) => Some(FormattedChange::Opaque(text.clone())),
        Changes::Opaque(other) => Some(FormattedChange::Opaque(other.to_string())),
    }
}

/// Render a full report block: separator, step header, comment and changes.
pub fn report_lines(report: &StepReport) -> Vec<String> {
    let mut lines = vec![SEPARATOR.to_string(), report.step.to_string()];
    let mut body = prefix_first_line("Comment: ", &report.comment);
    if let Some(change) = &report.change {
        body.extend(change.lines());
    }
    lines.extend(body.into_iter().map(|line| format!("{INDENT}{line}")));
    lines
}

fn prefix_first_line(prefix: &str, text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    match lines.first_mut() {
        Some(first) => first.insert_str(0, prefix),
        None => lines.push(prefix.trim_end().to_string()),
    }
    lines
}

fn indented(text: &str) -> Vec<String> {
    if text.is_empty() {
        return vec![INDENT.to_string()];
    }
    text.lines().map(|line| format!("{INDENT}{line}")).collect()
}
