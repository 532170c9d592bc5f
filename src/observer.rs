//! Observers: side-effecting leaves of the graph, and the reachability roots that keep their
//! transitive sources maintained.

#[cfg(debug_assertions)]
use std::panic::Location;

use crate::batch::run_guarded;
use crate::evaluator;
use crate::node::{NodeId, NodeKind, ObsData};
use crate::runtime::Runtime;
use crate::scope::ScopeId;

/// A handle returned by [`observer`] that can dispose it early.
#[derive(Clone, Copy)]
pub struct Disposer {
    id: NodeId,
    owner: ScopeId,
}

impl Disposer {
    /// Disposes the observer immediately: its last cleanup runs, its edges are detached, and
    /// it stops being notified by future writes.
    pub fn dispose(&self) {
        let rt = Runtime::global();
        if let Some(data) = rt.scopes.borrow_mut().get_mut(self.owner) {
            data.owned_nodes.retain(|n| *n != self.id);
        }
        rt.dispose_node(self.id);
    }
}

/// Creates an observer owned by the current scope and runs it once, synchronously, before
/// returning. Thereafter it re-runs whenever one of its dependencies commits a new value,
/// driven by the batch coordinator.
#[cfg_attr(debug_assertions, track_caller)]
pub fn observer(f: impl FnMut() + 'static) -> Disposer {
    let rt = Runtime::global();
    let owner = rt
        .current_owner
        .get()
        .expect("observer created outside a reactive scope");
    let kind = NodeKind::Observer(ObsData {
        callback: Box::new(f),
    });
    #[cfg(debug_assertions)]
    let node = crate::node::Node::new(kind, Some(owner), *Location::caller());
    #[cfg(not(debug_assertions))]
    let node = crate::node::Node::new(kind, Some(owner));
    let id = rt.nodes.borrow_mut().insert(node);
    rt.register_owned_node(owner, id);

    run_guarded(rt, || {
        evaluator::evaluate(rt, id);
    }, id);

    Disposer { id, owner }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::cell;
    use crate::scope::create_root;

    #[test]
    fn runs_once_immediately_then_on_each_dependency_change() {
        create_root(|| {
            let c = cell(0);
            let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
            let s = seen.clone();
            let _obs = observer(move || s.borrow_mut().push(c.get()));
            assert_eq!(*seen.borrow(), vec![0]);
            c.set(1);
            assert_eq!(*seen.borrow(), vec![0, 1]);
        });
    }

    #[test]
    fn disposal_stops_future_notifications() {
        create_root(|| {
            let c = cell(0);
            let runs = std::rc::Rc::new(std::cell::Cell::new(0));
            let r = runs.clone();
            let obs = observer(move || {
                c.get();
                r.set(r.get() + 1);
            });
            assert_eq!(runs.get(), 1);
            obs.dispose();
            c.set(1);
            assert_eq!(runs.get(), 1);
        });
    }

    #[test]
    fn a_panicking_callback_does_not_stop_other_observers() {
        create_root(|| {
            let c = cell(0);
            let ok_runs = std::rc::Rc::new(std::cell::Cell::new(0));
            let ok = ok_runs.clone();
            let _bad = observer(move || {
                c.get();
                if c.get_untracked() == 1 {
                    panic!("boom");
                }
            });
            let _good = observer(move || {
                c.get();
                ok.set(ok.get() + 1);
            });
            assert_eq!(ok_runs.get(), 1);
            c.set(1);
            assert_eq!(ok_runs.get(), 2);
        });
    }
}
