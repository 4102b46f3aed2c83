//! Error types for crewpool.

use thiserror::Error;

/// The error type returned by fallible crewpool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A negative idle timeout was passed to [`crate::Pool::set_idle_timeout`].
    ///
    /// Never actually returned: `set_idle_timeout` takes a `Duration`, which
    /// cannot represent a negative value, so the type system enforces this
    /// invariant instead of a runtime check. Kept as a variant for parity
    /// with the error kind `spec.md` §7 names.
    #[error("idle timeout must not be negative")]
    NegativeIdleTimeout,

    /// A worker-local data manager or resource manager was configured after
    /// at least one worker had already started.
    #[error("cannot configure {what} after a worker has started")]
    WorkersAlreadyStarted {
        /// Which configuration call was rejected.
        what: &'static str,
    },

    /// A global resource manager was configured twice.
    #[error("a global resource manager is already configured")]
    ResourceManagerAlreadyConfigured,

    /// `task_continuation` was called with a null/absent work function.
    ///
    /// Never actually returned: `task_continuation`'s `work` parameter is a
    /// generic `F: FnOnce() -> TaskResult`, which cannot be absent, so the
    /// type system enforces this invariant instead of a runtime check. Kept
    /// as a variant for parity with the error kind `spec.md` §7 names.
    #[error("task_continuation requires a non-null work function")]
    InvalidContinuationWork,

    /// `task_continuation` was called from outside a worker thread.
    #[error("task_continuation can only be called from within a worker")]
    NotInWorker,

    /// `task_continuation` was called while the current task already has a
    /// continuation pending.
    #[error("the current task already has a continuation pending")]
    ContinuationAlreadyPending,

    /// `task_continue` was called with a uid that has already been resumed,
    /// timed out, or never existed.
    #[error("continuation timed out or is unknown")]
    ContinuationTimedOut,

    /// A user-supplied allocator (global resource manager or worker-local
    /// data factory) failed.
    #[error("user allocator failed: {0}")]
    AllocatorFailed(String),

    /// The pool handle no longer refers to a live pool (it was destroyed, or
    /// belonged to a prior generation of a reused slot).
    #[error("pool handle is stale or the pool has been destroyed")]
    StaleHandle,
}

/// A specialized `Result` for crewpool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
