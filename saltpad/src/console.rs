//! Human-readable terminal output.
//!
//! Rendering produces [`Line`]s tagged with a [`Tone`]; only [`print_lines`]
//! touches the terminal and applies colors. `NO_COLOR` disables them.

use std::collections::BTreeMap;

use colored::Colorize;
use serde_json::Value;

use crate::core::aggregate::{NodeReport, Severity, Verdict};
use crate::core::render::report_lines;
use crate::core::selection::DownNodePolicy;
use crate::deploy::DeployEvent;

const NODE_SEPARATOR: &str = "==========";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub tone: Tone,
    pub text: String,
}

impl Line {
    pub fn new(tone: Tone, text: impl Into<String>) -> Self {
        Self {
            tone,
            text: text.into(),
        }
    }

    fn blank() -> Self {
        Self::new(Tone::Plain, "")
    }
}

pub fn print_lines(lines: &[Line]) {
    for line in lines {
        let text = line.text.as_str();
        match line.tone {
            Tone::Plain => println!("{text}"),
            Tone::Info => println!("{}", text.blue()),
            Tone::Warning => println!("{}", text.yellow()),
            Tone::Error => println!("{}", text.red()),
            Tone::Success => println!("{}", text.green()),
        }
    }
}

pub fn print_info(message: &str) {
    print_lines(&[Line::new(Tone::Info, message)]);
}

pub fn print_warning(message: &str) {
    print_lines(&[Line::new(Tone::Warning, message)]);
}

pub fn print_success(message: &str) {
    print_lines(&[Line::new(Tone::Success, message)]);
}

/// Errors go to stderr so they survive stdout redirection.
pub fn print_error(message: &str) {
    eprintln!("{}", message.red());
}

/// English list: `a`, `a and b`, `a, b and c`.
pub fn eng_join<S: AsRef<str>>(items: &[S]) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [head @ .., last] => {
            let head: Vec<&str> = head.iter().map(|item| item.as_ref()).collect();
            format!("{} and {}", head.join(", "), last.as_ref())
        }
    }
}

/// Step reports followed by the verdict summary.
pub fn node_report_lines(report: &NodeReport) -> Vec<Line> {
    let mut lines = Vec::new();
    for step in &report.steps {
        let tone = match step.severity {
            Severity::Info => Tone::Info,
            Severity::Error => Tone::Error,
        };
        lines.extend(report_lines(step).into_iter().map(|text| Line::new(tone, text)));
    }
    let tone = match &report.verdict {
        Verdict::AllStepsOk(_) => Tone::Success,
        Verdict::Failed(_) | Verdict::ExecutionError(_) => Tone::Error,
    };
    lines.push(Line::new(tone, report.verdict.summary_line()));
    lines
}

/// Pretty-printed state returns under a heading.
pub fn state_returns_lines(heading: &str, returns: &BTreeMap<String, Value>) -> Vec<Line> {
    let body = serde_json::to_string_pretty(returns).unwrap_or_else(|_| format!("{returns:?}"));
    let mut lines = vec![Line::new(Tone::Info, heading)];
    lines.extend(body.lines().map(|line| Line::new(Tone::Plain, line)));
    lines
}

pub fn event_lines(event: &DeployEvent) -> Vec<Line> {
    match event {
        DeployEvent::DownNodes { nodes, policy } => {
            let mut lines = vec![Line::new(
                Tone::Error,
                "Could not deploy on these minions statuses:",
            )];
            lines.extend(
                nodes
                    .iter()
                    .map(|node| Line::new(Tone::Error, format!("  * {node} status: down"))),
            );
            if *policy == DownNodePolicy::Attempt {
                lines.push(Line::new(
                    Tone::Warning,
                    "Deploying on them anyway (down_nodes = \"attempt\")",
                ));
            }
            lines
        }
        DeployEvent::NodesSelected { nodes } => vec![Line::new(
            Tone::Info,
            format!("Starting deployment on {}", eng_join(nodes)),
        )],
        DeployEvent::NodeStarted { node, roles } => vec![
            Line::new(Tone::Info, NODE_SEPARATOR),
            Line::new(Tone::Info, format!("Minion: {node}")),
            Line::new(Tone::Info, format!("Roles: {}", eng_join(roles))),
        ],
        DeployEvent::CleanRollback { node } => vec![Line::new(
            Tone::Info,
            format!("Rolling back {node} to its snapshot"),
        )],
        DeployEvent::CleanRecreate { node } => vec![Line::new(
            Tone::Info,
            format!("Recreating {node} (destroy + up)"),
        )],
        DeployEvent::Applying { state, .. } => vec![
            Line::blank(),
            Line::new(Tone::Info, format!("Execute {state}")),
        ],
        DeployEvent::NodeReport { report, .. } => node_report_lines(report),
        DeployEvent::Orchestration { returns, .. } => {
            state_returns_lines("Orchestration result:", returns)
        }
        DeployEvent::HealthCheck { returns, .. } => {
            state_returns_lines("Health check result:", returns)
        }
        DeployEvent::AllSucceeded => vec![
            Line::blank(),
            Line::new(Tone::Success, "Deployment success on all minions!"),
        ],
    }
}

pub fn print_event(event: &DeployEvent) {
    print_lines(&event_lines(event));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::aggregate::aggregate;
    use crate::core::types::NodeResult;
    use crate::test_support::failing_highstate;

    #[test]
    fn eng_join_lists() {
        assert_eq!(eng_join::<&str>(&[]), "");
        assert_eq!(eng_join(&["web"]), "web");
        assert_eq!(eng_join(&["web", "db"]), "web and db");
        assert_eq!(eng_join(&["web", "db", "cache"]), "web, db and cache");
    }

    #[test]
    fn failed_report_is_red_with_summary() {
        let result = NodeResult::from_value(&failing_highstate()).expect("node result");
        let report = aggregate(&result).expect("aggregate");
        let lines = node_report_lines(&report);

        let summary = lines.last().expect("summary");
        assert_eq!(summary.tone, Tone::Error);
        assert_eq!(
            summary.text,
            "3 steps, 1 failures, 1 dependencies failed, 1 OK, 1 changes"
        );
        assert!(lines.iter().any(|line| line.tone == Tone::Error
            && line.text == "svc.running: 'nginx' [id 'id2']:"));
        assert!(lines.iter().any(|line| line.tone == Tone::Info
            && line.text == "pkg.installed: 'nginx' [id 'id1']:"));
    }

    #[test]
    fn node_started_shows_roles() {
        let lines = event_lines(&DeployEvent::NodeStarted {
            node: "web1".to_string(),
            roles: vec!["web".to_string(), "cache".to_string()],
        });
        let texts: Vec<&str> = lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(texts, vec!["==========", "Minion: web1", "Roles: web and cache"]);
    }

    #[test]
    fn down_nodes_warn_when_attempted() {
        let lines = event_lines(&DeployEvent::DownNodes {
            nodes: vec!["db1".to_string()],
            policy: DownNodePolicy::Attempt,
        });
        assert_eq!(lines[1].text, "  * db1 status: down");
        assert_eq!(lines.last().map(|line| line.tone), Some(Tone::Warning));
    }

    #[test]
    fn state_returns_are_pretty_printed() {
        let returns = BTreeMap::from([("web1".to_string(), serde_json::json!({"ok": true}))]);
        let lines = state_returns_lines("Health check result:", &returns);
        let texts: Vec<&str> = lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Health check result:",
                "{",
                "  \"web1\": {",
                "    \"ok\": true",
                "  }",
                "}"
            ]
        );
    }
}
