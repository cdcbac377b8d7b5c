//! # Atomic Commit Engine
//!
//! The single mutation point for economic state. A [`PendingBatch`] goes in,
//! one [`AtomicCommitter::multi_update`] call goes out.
//!
//! **Failure contract:** any error from the backend becomes
//! [`EconomyError::CommitFailed`] and means *nothing happened*. Callers may
//! retry the whole request.

use skirmish_shared::RewardPayload;

use crate::batch::PendingBatch;
use crate::error::{EconomyError, EconomyResult};
use crate::store::AtomicCommitter;

/// Commits `batch` atomically and returns its notification payload.
///
/// An empty batch is a no-op and never reaches the backend.
///
/// # Errors
///
/// Returns [`EconomyError::CommitFailed`] if the backend rejects the update.
pub fn commit_batch<S>(store: &S, batch: PendingBatch) -> EconomyResult<Option<RewardPayload>>
where
    S: AtomicCommitter + ?Sized,
{
    if batch.is_empty() {
        return Ok(batch.into_parts().2);
    }

    let (writes, deltas, payload) = batch.into_parts();
    match store.multi_update(&writes, &deltas, false) {
        Ok(()) => {
            tracing::debug!(
                "Committed batch: {} writes, {} ledger updates",
                writes.len(),
                deltas.len()
            );
            Ok(payload)
        }
        Err(e) => {
            tracing::error!(
                "Atomic commit failed ({} writes, {} ledger updates): {}",
                writes.len(),
                deltas.len(),
                e
            );
            Err(EconomyError::CommitFailed(e.to_string()))
        }
    }
}
