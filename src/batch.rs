//! The batch coordinator: defers observer notification until the outermost write scope
//! exits, and drains the resulting queue with enqueue-time deduplication.

use crate::error::{payload_message, report, ReactiveError};
use crate::node::NodeId;
use crate::runtime::Runtime;

impl Runtime {
    /// Adds `id` to the pending-observer queue unless it is already queued. Called by
    /// [`crate::color::push_down`] for every node that freshly becomes `Check` and carries a
    /// user callback.
    pub(crate) fn enqueue(&self, id: NodeId) {
        if self.pending_set.borrow_mut().insert(id) {
            self.pending.borrow_mut().push_back(id);
        }
    }

    /// Drains the queue if no enclosing `batch` is still open. Called after every cell write
    /// and at the end of every `batch` call; a write nested inside an open batch is a no-op
    /// here because `batch_depth` is still above zero.
    pub(crate) fn maybe_drain(&'static self) {
        if self.batch_depth.get() == 0 {
            drain(self);
        }
    }
}

/// Pops observers off the pending queue in FIFO order and validates each exactly once, even
/// if writes inside its own callback enqueue more work. A single active loop absorbs
/// everything a nested write appends; `draining` just prevents that nested write from
/// spawning a second, concurrent loop over the same queue.
fn drain(rt: &'static Runtime) {
    if rt.draining.get() {
        return;
    }
    rt.draining.set(true);
    loop {
        let next = {
            let mut queue = rt.pending.borrow_mut();
            let id = queue.pop_front();
            if let Some(id) = id {
                rt.pending_set.borrow_mut().remove(&id);
            }
            id
        };
        let Some(id) = next else { break };
        if !rt.nodes.borrow().contains_key(id) {
            continue; // disposed while queued
        }
        run_guarded(rt, || {
            crate::color::validate(rt, id);
        }, id);
    }
    rt.draining.set(false);
}

/// Runs `f` (an observer's first synchronous run, or a queued re-run) catching any panic so
/// one failing observer cannot take down unrelated ones (§7 "Callback failure"). The error,
/// if any, is routed to the installed [`crate::error::ErrorSink`] tagged with `id`'s creation
/// site.
pub(crate) fn run_guarded(rt: &Runtime, f: impl FnOnce(), id: NodeId) {
    let loc = crate::node::creation_loc(&rt.nodes.borrow(), id);
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        report(ReactiveError::Callback {
            location: loc,
            payload: payload_message(&*payload),
        });
    }
}

/// Groups writes so dependents are notified at most once per outer `batch` call, no matter
/// how many cells it writes. A bare write outside any `batch` behaves like a batch of size
/// one: it still drains immediately, but through the same deduplicating queue.
pub fn batch<T>(f: impl FnOnce() -> T) -> T {
    let rt = Runtime::global();
    rt.batch_depth.set(rt.batch_depth.get() + 1);
    let result = f();
    rt.batch_depth.set(rt.batch_depth.get() - 1);
    rt.maybe_drain();
    result
}

/// Runs `f` with dependency tracking suppressed: reads inside `f` do not add edges to
/// whatever listener is currently active.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let rt = Runtime::global();
    let prev = rt.tracking_suppressed.replace(true);
    let result = f();
    rt.tracking_suppressed.set(prev);
    result
}

#[cfg(test)]
mod tests {
    use crate::cell::cell;
    use crate::derivation::derivation;
    use crate::observer::observer;
    use crate::scope::create_root;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn batch_fires_observer_once_for_multiple_writes() {
        create_root(|| {
            let log: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
            let s = cell(1);
            let a = derivation(move || s.get() + 1);
            let b = derivation(move || s.get() * 10);
            let d = derivation(move || a.get() + b.get());
            let log2 = log.clone();
            let _obs = observer(move || log2.borrow_mut().push(d.get()));
            assert_eq!(*log.borrow(), vec![12]);

            super::batch(|| {
                s.set(3);
                s.set(4);
                assert_eq!(*log.borrow(), vec![12]); // no firing mid-batch
            });
            assert_eq!(*log.borrow(), vec![12, 45]);
        });
    }

    #[test]
    fn nested_write_inside_observer_extends_the_same_drain() {
        create_root(|| {
            let a = cell(1);
            let b = cell(100);
            let log: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
            let log2 = log.clone();
            let _obs = observer(move || {
                let v = a.get();
                log2.borrow_mut().push(v);
                if v == 1 {
                    b.set(200);
                }
            });
            let log3 = log.clone();
            let _obs_b = observer(move || {
                log3.borrow_mut().push(b.get());
            });
            assert_eq!(*log.borrow(), vec![1, 100]);
            a.set(2);
            assert_eq!(*log.borrow(), vec![1, 100, 2, 200]);
        });
    }

    #[test]
    fn untrack_suppresses_edge_creation() {
        create_root(|| {
            let s = cell(1);
            let d = derivation(move || super::untrack(|| s.get()) * 2);
            assert_eq!(d.get(), 2);
            s.set(5);
            // d never subscribed to s, so its stale value is still observed.
            assert_eq!(d.get(), 2);
        });
    }
}
