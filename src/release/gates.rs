//! Scoped relaxation of a branch's merge gates.
//!
//! Merging a release on an operator's behalf needs the target branch's
//! required checks and approvals out of the way for exactly one merge call.
//! [`MergeGateGuard`] captures the gates, relaxes them, and puts the
//! captured values back: explicitly through [`MergeGateGuard::restore`] on
//! normal paths, or from `Drop` when the owning future is cancelled or
//! panics.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::effects::{HostInterpreter, MergeGates, ops};
use crate::host::HostApiError;

#[must_use = "dropping the guard restores the gates in the background"]
pub struct MergeGateGuard<I: HostInterpreter + Send + Sync + 'static> {
    client: Arc<I>,
    branch: String,
    /// Gates to put back. `None` once restored, or when nothing was changed.
    original: Option<MergeGates>,
}

impl<I: HostInterpreter + Send + Sync + 'static> MergeGateGuard<I> {
    /// Captures the branch's gates and relaxes them. Branches that are
    /// already relaxed are left untouched.
    pub async fn relax(client: Arc<I>, branch: &str) -> Result<Self, HostApiError> {
        let original = ops::get_merge_gates(client.as_ref(), branch).await?;
        if original.is_relaxed() {
            debug!(%branch, "merge gates already relaxed");
            return Ok(Self {
                client,
                branch: branch.to_string(),
                original: None,
            });
        }

        let guard = Self {
            client,
            branch: branch.to_string(),
            original: Some(original.clone()),
        };
        if let Err(e) = ops::set_merge_gates(guard.client.as_ref(), branch, original.relaxed()).await {
            // Relaxing can fail half way; put back whatever was changed.
            if let Err(restore_err) = guard.restore().await {
                error!(%branch, error = %restore_err, "failed to restore merge gates after failed relax");
            }
            return Err(e);
        }
        debug!(%branch, "relaxed merge gates");
        Ok(guard)
    }

    /// Puts the captured gates back. The captured gates are only released
    /// once the write succeeds; on failure the guard is dropped still holding
    /// them, so `Drop` tries again in the background.
    pub async fn restore(mut self) -> Result<(), HostApiError> {
        let Some(gates) = self.original.clone() else {
            return Ok(());
        };
        match ops::set_merge_gates(self.client.as_ref(), &self.branch, gates).await {
            Ok(()) => {
                self.original = None;
                debug!(branch = %self.branch, "restored merge gates");
                Ok(())
            }
            Err(e) => {
                error!(branch = %self.branch, error = %e, "failed to restore merge gates");
                Err(e)
            }
        }
    }
}

impl<I: HostInterpreter + Send + Sync + 'static> Drop for MergeGateGuard<I> {
    fn drop(&mut self) {
        let Some(gates) = self.original.take() else {
            return;
        };
        let branch = std::mem::take(&mut self.branch);
        let client = Arc::clone(&self.client);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(%branch, "merge gate guard dropped without restore, restoring in background");
                handle.spawn(async move {
                    if let Err(e) = ops::set_merge_gates(client.as_ref(), &branch, gates).await {
                        error!(%branch, error = %e, "failed to restore merge gates");
                    }
                });
            }
            Err(_) => {
                error!(%branch, ?gates, "merge gates left relaxed: no runtime to restore them");
            }
        }
    }
}
