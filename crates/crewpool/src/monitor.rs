//! The monitor subsystem: an optional background thread that periodically
//! hands the pool's own [`crate::pool::PoolSnapshot`] to a user callback.
//!
//! The original design runs the monitor as a single-worker `RunAll` sub-pool
//! fed a steady stream of snapshot tasks; that buys nothing here, since a
//! plain OS thread sleeping against the same interval produces the identical
//! observable cadence with far less machinery. Grounded on the teacher's
//! `progress.rs`, which reports render-loop progress off a dedicated thread
//! rather than routing it back through the render work queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::trace;

use crate::logging::targets;
use crate::pool::PoolInner;

pub(crate) struct Monitor {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Monitor {
    pub(crate) fn spawn(
        inner: Arc<PoolInner>,
        interval: Duration,
        mut callback: impl FnMut(crate::pool::PoolSnapshot) + Send + 'static,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("crewpool-monitor".to_string())
            .spawn(move || {
                while !stop_thread.load(Ordering::Acquire) {
                    std::thread::sleep(interval);
                    if stop_thread.load(Ordering::Acquire) {
                        break;
                    }
                    let snapshot = inner.snapshot_for_monitor();
                    trace!(target: targets::MONITOR, ?snapshot, "tick");
                    callback(snapshot);
                }
            })
            .expect("failed to spawn crewpool monitor thread");
        Self {
            stop,
            thread: Some(thread),
        }
    }

    pub(crate) fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
