use parking_lot::{Condvar, Mutex};

/// Runs closures strictly in ticket order
///
/// Tickets are handed out under the session lock; the work itself runs after
/// the lock is released. Every ticket handed out must be run exactly once.
#[derive(Debug, Default)]
pub(super) struct DeliveryOrder {
    next: Mutex<u64>,
    turn: Condvar,
}

impl DeliveryOrder {
    pub(super) fn run_in_order<R>(&self, ticket: u64, f: impl FnOnce() -> R) -> R {
        let mut next = self.next.lock();
        while *next != ticket {
            self.turn.wait(&mut next);
        }
        drop(next);

        // Passes the turn on even if `f` unwinds
        let _turn = Turn(self);
        f()
    }
}

struct Turn<'a>(&'a DeliveryOrder);

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        *self.0.next.lock() += 1;
        self.0.turn.notify_all();
    }
}
