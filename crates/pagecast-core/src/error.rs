//! Job-level error taxonomy.
//!
//! Every job entry point converts internal failures into one of these
//! variants before they reach the progress store; a job task never
//! propagates a raw error (or a panic) to the scheduler.

use serde::{Deserialize, Serialize};

/// Why a job failed, as exposed to status queries.
///
/// The serialized form carries the taxonomy kind as a tag plus the
/// human-readable message, so callers can branch on `kind` without
/// parsing the message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "message")]
pub enum JobError {
    /// Rejected before any work started (missing field, empty page set,
    /// selection out of range, document too large).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// One unit of work (page, chunk, turn) failed in a way that aborts
    /// the job.
    #[error("{0}")]
    UnitFailure(String),

    /// A downstream generation/synthesis/store call failed.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The job was cancelled while pending or running.
    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    /// Stable taxonomy tag for logging and webhook payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InvalidInput(_) => "invalid_input",
            JobError::UnitFailure(_) => "unit_failure",
            JobError::ServiceUnavailable(_) => "service_unavailable",
            JobError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let err = JobError::InvalidInput("no pages".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "invalid_input");
        assert_eq!(json["message"], "no pages");
    }

    #[test]
    fn cancelled_has_no_message_payload() {
        let json = serde_json::to_value(&JobError::Cancelled).unwrap();
        assert_eq!(json["kind"], "cancelled");
    }
}
