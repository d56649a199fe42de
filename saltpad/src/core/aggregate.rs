//! Folding a minion's step records into a verdict.

use crate::core::classifier::{StepClass, classify_step, has_reportable_change};
use crate::core::render::{FormattedChange, render_change};
use crate::core::step_id::StepId;
use crate::core::types::NodeResult;
use crate::error::FormatError;

/// Step counters for one node. The three classes are disjoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCounts {
    pub success: usize,
    pub failure: usize,
    pub dependency_failure: usize,
    /// Successful steps with non-empty changes.
    pub changes: usize,
}

impl StepCounts {
    pub fn total(&self) -> usize {
        self.success + self.failure + self.dependency_failure
    }
}

/// Per-node deployment verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    AllStepsOk(StepCounts),
    Failed(StepCounts),
    /// The minion returned an error instead of step data; counts are unknown.
    ExecutionError(String),
}

impl Verdict {
    fn from_counts(counts: StepCounts) -> Self {
        if counts.failure == 0 {
            Self::AllStepsOk(counts)
        } else {
            Self::Failed(counts)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::AllStepsOk(_))
    }

    pub fn counts(&self) -> Option<StepCounts> {
        match self {
            Self::AllStepsOk(counts) | Self::Failed(counts) => Some(*counts),
            Self::ExecutionError(_) => None,
        }
    }

    /// One-line summary printed after the step reports.
    pub fn summary_line(&self) -> String {
        match self {
            Self::AllStepsOk(counts) => {
                format!("All {} step OK, {} changes", counts.total(), counts.changes)
            }
            Self::Failed(counts) => format!(
                "{} steps, {} failures, {} dependencies failed, {} OK, {} changes",
                counts.total(),
                counts.failure,
                counts.dependency_failure,
                counts.success,
                counts.changes
            ),
            Self::ExecutionError(message) => message.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A step worth showing: a failure, or a success that changed something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: StepId,
    pub severity: Severity,
    pub comment: String,
    pub change: Option<FormattedChange>,
}

/// Verdict plus the step reports, in step order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub verdict: Verdict,
    pub steps: Vec<StepReport>,
}

/// Aggregate a node result.
///
/// Fails only when a step id cannot be decoded; an execution error from the
/// minion is a regular (failing) verdict.
pub fn aggregate(result: &NodeResult) -> Result<NodeReport, FormatError> {
    let steps = match result {
        NodeResult::Steps(steps) => steps,
        NodeResult::ExecutionError(message) => {
            return Ok(NodeReport {
                verdict: Verdict::ExecutionError(message.clone()),
                steps: Vec::new(),
            });
        }
    };

    let mut counts = StepCounts::default();
    let mut reports = Vec::new();
    for raw in steps {
        let step = StepId::parse(&raw.id)?;
        let record = &raw.record;
        let severity = match classify_step(record) {
            StepClass::Ok => {
                counts.success += 1;
                if !has_reportable_change(record) {
                    continue;
                }
                counts.changes += 1;
                Severity::Info
            }
            StepClass::DependencyFailure => {
                counts.dependency_failure += 1;
                continue;
            }
            StepClass::Failure => {
                counts.failure += 1;
                Severity::Error
            }
        };
        reports.push(StepReport {
            step,
            severity,
            comment: record.comment.clone(),
            change: render_change(record),
        });
    }

    Ok(NodeReport {
        verdict: Verdict::from_counts(counts),
        steps: reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::render::report_lines;
    use crate::core::types::REQUISITE_FAILED;
    use serde_json::{Value, json};

    fn node_result(value: Value) -> NodeResult {
        NodeResult::from_value(&value).expect("node result")
    }

    #[test]
    fn unchanged_success_counts_but_is_silent() {
        let report = aggregate(&node_result(json!({
            "pkg_|-a_|-a_|-installed": {"result": true, "comment": "ok", "changes": {}},
        })))
        .expect("aggregate");
        assert_eq!(
            report.verdict,
            Verdict::AllStepsOk(StepCounts {
                success: 1,
                ..StepCounts::default()
            })
        );
        assert!(report.steps.is_empty());
    }

    #[test]
    fn stdout_change_is_an_info_report() {
        let report = aggregate(&node_result(json!({
            "cmd_|-migrate_|-./migrate_|-run": {"result": true, "comment": "ran", "changes": {"stdout": "x"}},
        })))
        .expect("aggregate");
        let counts = report.verdict.counts().expect("counts");
        assert_eq!(counts.success, 1);
        assert_eq!(counts.changes, 1);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].severity, Severity::Info);
        let lines = report_lines(&report.steps[0]);
        let stdout_at = lines
            .iter()
            .position(|line| line.trim() == "Stdout:")
            .expect("stdout label");
        assert_eq!(lines[stdout_at + 1].trim(), "x");
    }

    #[test]
    fn requisite_failure_is_silent_and_not_a_failure() {
        let report = aggregate(&node_result(json!({
            "svc_|-a_|-a_|-running": {"result": false, "comment": REQUISITE_FAILED, "changes": {}},
        })))
        .expect("aggregate");
        let counts = report.verdict.counts().expect("counts");
        assert_eq!(counts.dependency_failure, 1);
        assert_eq!(counts.failure, 0);
        assert_eq!(counts.total(), 1);
        assert!(report.verdict.is_success());
        assert!(report.steps.is_empty());
    }

    #[test]
    fn plain_failure_is_an_error_report() {
        let report = aggregate(&node_result(json!({
            "file_|-a_|-/srv_|-directory": {"result": false, "comment": "disk full", "changes": {}},
        })))
        .expect("aggregate");
        assert!(!report.verdict.is_success());
        assert_eq!(report.steps.len(), 1);
        assert_eq!(report.steps[0].severity, Severity::Error);
        assert!(
            report_lines(&report.steps[0])
                .iter()
                .any(|line| line.contains("disk full"))
        );
    }

    #[test]
    fn mixed_node_result() {
        let report = aggregate(&node_result(json!({
            "pkg_|-id1|-nginx|-installed": {"result": true, "comment": "installed", "changes": {}},
            "svc_|-id2|-nginx|-running": {"result": false, "comment": "disk full", "changes": {}},
        })))
        .expect("aggregate");
        assert_eq!(
            report.verdict,
            Verdict::Failed(StepCounts {
                success: 1,
                failure: 1,
                dependency_failure: 0,
                changes: 0,
            })
        );
        assert_eq!(report.verdict.counts().expect("counts").total(), 2);
        assert_eq!(report.steps.len(), 1);
        assert_eq!(
            report.steps[0].step.to_string(),
            "svc.running: 'nginx' [id 'id2']:"
        );
        assert_eq!(
            report.verdict.summary_line(),
            "2 steps, 1 failures, 0 dependencies failed, 1 OK, 0 changes"
        );
    }

    #[test]
    fn success_summary_line() {
        let verdict = Verdict::AllStepsOk(StepCounts {
            success: 3,
            failure: 0,
            dependency_failure: 0,
            changes: 2,
        });
        assert_eq!(verdict.summary_line(), "All 3 step OK, 2 changes");
    }

    #[test]
    fn counters_always_sum_to_total() {
        let results = [json!(true), json!(false), Value::Null];
        let comments = ["", "disk full", REQUISITE_FAILED];
        let changes = [json!({}), json!({"stdout": "x"}), json!("value")];

        let mut steps = serde_json::Map::new();
        let mut expected = 0;
        for result in &results {
            for comment in comments {
                for change in &changes {
                    expected += 1;
                    steps.insert(
                        format!("m_|-id{expected}_|-n_|-f"),
                        json!({"result": result, "comment": comment, "changes": change}),
                    );
                    let report =
                        aggregate(&node_result(Value::Object(steps.clone()))).expect("aggregate");
                    let counts = report.verdict.counts().expect("counts");
                    assert_eq!(counts.total(), expected);
                    assert!(counts.changes <= counts.success);
                }
            }
        }
    }

    #[test]
    fn execution_error_has_no_counts() {
        let report = aggregate(&node_result(json!(["Minion did not return"]))).expect("aggregate");
        assert_eq!(
            report.verdict,
            Verdict::ExecutionError("Minion did not return".to_string())
        );
        assert!(!report.verdict.is_success());
        assert_eq!(report.verdict.counts(), None);
    }

    #[test]
    fn malformed_step_id_is_a_format_error() {
        let err = aggregate(&node_result(json!({
            "broken": {"result": true, "comment": "", "changes": {}},
        })))
        .unwrap_err();
        assert!(matches!(err, FormatError::StepId { parts: 1, .. }));
    }
}
