//! Tunables threaded through [`crate::reconcile::Reconciler`].

use tokio_util::sync::CancellationToken;

/// Configuration for a [`crate::reconcile::Reconciler`].
///
/// Analogous to the small, explicit configuration structs the rest of the
/// ecosystem uses for feature flags and telemetry: a handful of named knobs
/// rather than a generic options bag.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Bounds the `readyToResume` channel capacity. Default 64.
    pub resume_channel_capacity: usize,
    /// When `true`, the first operation error encountered during Pass 2
    /// short-circuits the remainder of that pass instead of continuing to
    /// schedule nodes unrelated to the failure. Default `false`.
    pub fail_fast: bool,
    /// Ambient cancellation token for this pass, observed by background
    /// operations. Default: a fresh, unlinked token.
    pub cancellation: CancellationToken,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            resume_channel_capacity: 64,
            fail_fast: false,
            cancellation: CancellationToken::new(),
        }
    }
}
