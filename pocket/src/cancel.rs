//! Cooperative cancellation shared across parallel branches.
//!
//! Tokens are [`CancellationToken`]s: a parallel group works under a
//! `child_token()` of its parent, so cancelling the group stops its branches
//! without touching anything above it.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Returned when work is refused or stopped because its token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("canceled")]
pub struct Canceled;

/// `Err(Canceled)` once `token` is cancelled.
pub fn check(token: &CancellationToken) -> Result<(), Canceled> {
    if token.is_cancelled() {
        Err(Canceled)
    } else {
        Ok(())
    }
}
