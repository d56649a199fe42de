//! Deterministic classification of step records.

use crate::core::types::{REQUISITE_FAILED, StepRecord};

/// How a single step counts toward a node verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepClass {
    Ok,
    Failure,
    /// Not run because a requisite failed.
    DependencyFailure,
}

/// Classify a step record.
///
/// - `Ok` if the result is truthy.
/// - `DependencyFailure` if it is falsy or missing and the comment is exactly
///   the requisite-failed sentinel.
/// - `Failure` otherwise.
pub fn classify_step(record: &StepRecord) -> StepClass {
    if record.result.is_success() {
        StepClass::Ok
    } else if record.comment == REQUISITE_FAILED {
        StepClass::DependencyFailure
    } else {
        StepClass::Failure
    }
}

/// True iff the step succeeded and actually changed something.
pub fn has_reportable_change(record: &StepRecord) -> bool {
    record.result.is_success() && !record.changes.is_empty()
}
