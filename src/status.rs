//! Classification of execution results before any row is read.

use crate::backend::{ExecStatus, NativeResult};
use crate::error::{DriverError, Result};
use crate::types::ResultOutcome;

/// Resolve the top-level outcome of an executed statement.
#[must_use]
pub fn classify(result: &NativeResult) -> ResultOutcome {
    match result.status() {
        ExecStatus::EmptyQuery => ResultOutcome::NoData,
        ExecStatus::CommandOk => ResultOutcome::CommandOk,
        ExecStatus::TuplesOk => ResultOutcome::RowsOk,
        ExecStatus::CopyOut | ExecStatus::CopyIn => {
            ResultOutcome::Failed("unsupported result status: COPY".to_string())
        }
        ExecStatus::FatalError => ResultOutcome::Failed(
            result
                .error_message()
                .unwrap_or("unknown server error")
                .to_string(),
        ),
    }
}

/// Whether row streaming should proceed for `outcome`.
///
/// `Ok(false)` means the statement succeeded with nothing to stream.
///
/// # Errors
/// Returns `DriverError::StatementError` for an empty query or a failed statement.
pub fn gate(outcome: ResultOutcome) -> Result<bool> {
    match outcome {
        ResultOutcome::NoData => Err(DriverError::StatementError("no query".to_string())),
        ResultOutcome::CommandOk => Ok(false),
        ResultOutcome::RowsOk => Ok(true),
        ResultOutcome::Failed(message) => Err(DriverError::StatementError(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_outcomes() {
        assert_eq!(classify(&NativeResult::empty_query()), ResultOutcome::NoData);
        assert_eq!(classify(&NativeResult::command_ok()), ResultOutcome::CommandOk);
        assert_eq!(
            classify(&NativeResult::tuples(Vec::new(), Vec::new())),
            ResultOutcome::RowsOk
        );
        assert_eq!(
            classify(&NativeResult::failed("ERROR:  boom")),
            ResultOutcome::Failed("ERROR:  boom".to_string())
        );
        assert!(matches!(
            classify(&NativeResult::with_status(ExecStatus::CopyOut)),
            ResultOutcome::Failed(_)
        ));
    }

    #[test]
    fn gate_only_streams_rows() {
        assert!(gate(ResultOutcome::RowsOk).unwrap());
        assert!(!gate(ResultOutcome::CommandOk).unwrap());
        assert!(matches!(
            gate(ResultOutcome::NoData),
            Err(DriverError::StatementError(ref m)) if m == "no query"
        ));
        assert!(matches!(
            gate(ResultOutcome::Failed("ERROR:  x".into())),
            Err(DriverError::StatementError(ref m)) if m == "ERROR:  x"
        ));
    }
}
