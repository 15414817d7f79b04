//! Shared-ownership callback shim
//!
//! Native engines hold on to callback objects for as long as they have
//! asynchronous work outstanding, which can outlive the controller that
//! registered them. `CallbackShim` is the handle handed to the engine:
//!
//! - every clone counts as one native holder (atomic holder count)
//! - the target is held weakly, so the shim never keeps a controller alive
//! - `detach()` severs the target so late callbacks become no-ops
//! - an optional drop hook runs exactly once when the last holder goes away

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};
use uuid::Uuid;

type DropHook = Box<dyn FnOnce() + Send>;

struct ShimShared<T: ?Sized> {
    id: Uuid,
    label: &'static str,
    holders: AtomicUsize,
    target: RwLock<Option<Weak<T>>>,
    drop_hook: Mutex<Option<DropHook>>,
}

/// Reference-counted callback handle given to native components
pub struct CallbackShim<T: ?Sized + Send + Sync> {
    shared: Arc<ShimShared<T>>,
}

impl<T: ?Sized + Send + Sync> CallbackShim<T> {
    /// Create a shim pointing at `target`. The returned handle is the first holder.
    pub fn new(label: &'static str, target: &Arc<T>) -> Self {
        let shared = Arc::new(ShimShared {
            id: Uuid::new_v4(),
            label,
            holders: AtomicUsize::new(1),
            target: RwLock::new(Some(Arc::downgrade(target))),
            drop_hook: Mutex::new(None),
        });
        debug!(shim = %shared.id, label, "callback shim created");
        Self { shared }
    }

    /// Register a hook that runs when the holder count reaches zero.
    pub fn with_drop_hook<F>(self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        *self.shared.drop_hook.lock() = Some(Box::new(hook));
        self
    }

    /// Unique identifier of this shim (shared by all clones)
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Number of live holders
    pub fn holder_count(&self) -> usize {
        self.shared.holders.load(Ordering::Acquire)
    }

    /// Whether the shim still forwards to a target
    pub fn is_attached(&self) -> bool {
        self.upgrade().is_some()
    }

    /// Strong reference to the target, if attached and still alive.
    pub fn upgrade(&self) -> Option<Arc<T>> {
        self.shared.target.read().as_ref().and_then(Weak::upgrade)
    }

    /// Run `f` against the target. Returns `false` when the callback was dropped
    /// because the target is detached or gone.
    pub fn dispatch<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T),
    {
        match self.upgrade() {
            Some(target) => {
                f(&target);
                true
            }
            None => {
                trace!(shim = %self.shared.id, label = self.shared.label, "late callback ignored");
                false
            }
        }
    }

    /// Sever the link to the target. Callbacks already dispatched keep running;
    /// later ones are ignored.
    pub fn detach(&self) {
        if self.shared.target.write().take().is_some() {
            debug!(shim = %self.shared.id, label = self.shared.label, "callback shim detached");
        }
    }
}

impl<T: ?Sized + Send + Sync> Clone for CallbackShim<T> {
    fn clone(&self) -> Self {
        self.shared.holders.fetch_add(1, Ordering::AcqRel);
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync> Drop for CallbackShim<T> {
    fn drop(&mut self) {
        if self.shared.holders.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!(shim = %self.shared.id, label = self.shared.label, "last holder released");
            if let Some(hook) = self.shared.drop_hook.lock().take() {
                hook();
            }
        }
    }
}

impl<T: ?Sized + Send + Sync> fmt::Debug for CallbackShim<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackShim")
            .field("id", &self.shared.id)
            .field("label", &self.shared.label)
            .field("holders", &self.holder_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    trait Counter: Send + Sync {
        fn bump(&self);
    }

    struct Hits(AtomicUsize);

    impl Counter for Hits {
        fn bump(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_clone_and_drop_track_holders() {
        let target = Arc::new(Hits(AtomicUsize::new(0)));
        let shim = CallbackShim::new("test", &target);
        assert_eq!(shim.holder_count(), 1);

        let engine_copy = shim.clone();
        assert_eq!(shim.holder_count(), 2);
        drop(engine_copy);
        assert_eq!(shim.holder_count(), 1);
    }

    #[test]
    fn test_drop_hook_runs_once_at_zero() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let target = Arc::new(Hits(AtomicUsize::new(0)));
        let shim =
            CallbackShim::new("test", &target).with_drop_hook(move || flag.store(true, Ordering::SeqCst));

        let held_by_engine = shim.clone();
        drop(shim);
        assert!(!released.load(Ordering::SeqCst));
        drop(held_by_engine);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_shim_outlives_target() {
        let target = Arc::new(Hits(AtomicUsize::new(0)));
        let as_dyn: Arc<dyn Counter> = target.clone();
        let shim: CallbackShim<dyn Counter> = CallbackShim::new("test", &as_dyn);
        drop(as_dyn);

        assert!(shim.dispatch(|c| c.bump()));
        drop(target);
        assert!(!shim.dispatch(|c| c.bump()));
        assert_eq!(shim.holder_count(), 1);
    }

    #[test]
    fn test_detach_ignores_late_callbacks() {
        let target = Arc::new(Hits(AtomicUsize::new(0)));
        let shim = CallbackShim::new("test", &target);
        let engine_copy = shim.clone();

        assert!(engine_copy.dispatch(|h| h.bump()));
        shim.detach();
        assert!(!engine_copy.is_attached());
        assert!(!engine_copy.dispatch(|h| h.bump()));
        assert_eq!(target.0.load(Ordering::SeqCst), 1);
    }
}
