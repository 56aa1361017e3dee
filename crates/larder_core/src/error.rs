use thiserror::Error;

/// Failure classes of a scheduling cycle. Capacity pressure and stale fire
/// targets are handled inline (eviction, silent drop) and never reach here.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Inventory or scheduler query failed. The cycle aborts with no state
    /// mutated and the next trigger retries.
    #[error("transient fetch failure: {source}")]
    TransientFetch {
        #[source]
        source: anyhow::Error,
    },

    /// The platform rejected a single schedule or cancel call. Logged and
    /// skipped inside the batch; reported only through the cycle counts.
    #[error("platform rejected notification `{id}`: {source}")]
    Scheduling {
        id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl NotifyError {
    pub fn transient(source: anyhow::Error) -> Self {
        Self::TransientFetch { source }
    }
}
