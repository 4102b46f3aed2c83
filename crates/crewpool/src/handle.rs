//! A process-scoped, generation-tagged registry of live pools.
//!
//! In-worker accessors (`current_pool`, `task_continuation`, `task_continue`)
//! need a way to refer back to "the pool this worker belongs to" without
//! holding a raw pointer into it, which is how the original C code did it and
//! exactly the hazard noted for cyclic references in the design this crate
//! follows: a worker thread, a continuation callback, or a stored id could
//! outlive the pool, or the pool's memory could be reused by a later
//! `create_and_start` call. `slotmap`'s generation tagging turns that
//! dangling-pointer risk into an ordinary `PoolError::StaleHandle`: a handle
//! from a destroyed pool simply fails to resolve, it never aliases a
//! different pool that happens to reuse the same slot.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

use crate::pool::PoolInner;

new_key_type! {
    /// A stable, copyable reference to a live pool.
    pub struct PoolHandle;
}

type Registry = Mutex<SlotMap<PoolHandle, Arc<PoolInner>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Mutex::new(SlotMap::with_key()))
}

pub(crate) fn register(inner: Arc<PoolInner>) -> PoolHandle {
    registry().lock().insert(inner)
}

pub(crate) fn unregister(handle: PoolHandle) {
    registry().lock().remove(handle);
}

/// Resolves a handle to its pool, if the pool is still alive.
pub(crate) fn resolve(handle: PoolHandle) -> Option<Arc<PoolInner>> {
    registry().lock().get(handle).cloned()
}
