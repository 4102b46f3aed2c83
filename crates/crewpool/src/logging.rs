//! Tracing span and target names used throughout crewpool.
//!
//! These constants exist so that log filtering directives
//! (`RUST_LOG=crewpool::worker=trace`) have stable names to target, the same
//! convention the rest of the corpus this crate is grounded on uses for its
//! own subsystem instrumentation.

/// Target names for log filtering.
pub mod targets {
    /// The task queue (C1).
    pub const QUEUE: &str = "crewpool::queue";
    /// The worker crew (C2).
    pub const WORKER: &str = "crewpool::worker";
    /// The continuation registry (C3).
    pub const CONTINUATION: &str = "crewpool::continuation";
    /// Pool lifecycle and cancellation (C4).
    pub const POOL: &str = "crewpool::pool";
    /// The monitor subsystem.
    pub const MONITOR: &str = "crewpool::monitor";
    /// The timer service.
    pub const TIMER: &str = "crewpool::timer";
}
