//! Cancellation support for long-running build operations.
//!
//! Every public session method takes a [`CancellationToken`]. Collaborator
//! calls (the package resolver, the code generator, filesystem reads) are
//! synchronous and uninterruptible, so cancellation is advisory: an in-flight
//! call runs to completion, but its result is discarded and never cached.

pub use tokio_util::sync::CancellationToken;

use crate::error::{BuildError, BuildResult};

/// Runs `op`, observing `cancel` at the operation boundaries.
///
/// If the token is cancelled before `op` starts, `op` is never invoked and
/// `Cancelled` is returned. If the token is cancelled while `op` runs, the
/// finished result is discarded and `Cancelled` is returned. Callers must
/// not cache anything produced by a discarded operation.
pub fn with_cancel<T>(cancel: &CancellationToken, op: impl FnOnce() -> T) -> BuildResult<T> {
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }
    let out = op();
    if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_cancel_runs_op() {
        let cancel = CancellationToken::new();
        let out = with_cancel(&cancel, || 42).unwrap();
        assert_eq!(out, 42);
    }

    #[test]
    fn test_with_cancel_skips_op_when_already_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ran = false;
        let result = with_cancel(&cancel, || ran = true);
        assert!(matches!(result, Err(BuildError::Cancelled)));
        assert!(!ran, "op must not run after cancellation");
    }

    #[test]
    fn test_with_cancel_discards_result_on_late_cancellation() {
        let cancel = CancellationToken::new();
        let result = with_cancel(&cancel, || {
            // Cancellation fires while the operation is in flight.
            cancel.cancel();
            42
        });
        assert!(matches!(result, Err(BuildError::Cancelled)));
    }
}
