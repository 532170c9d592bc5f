//! [`Runtime`]: the process-wide evaluation context (§3 "evaluation context" in the design
//! notes this crate grew from) plus the root scope bootstrap.
//!
//! One `Runtime` backs each call to [`create_root`]. It is leaked to get a `&'static`
//! reference — the same trick the rest of this lineage's reactive crates use to avoid
//! threading a context object through every call — and is only ever touched from the thread
//! that created it via a `thread_local!` pointer.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::panic::Location;

use crate::error::{payload_message, report, ReactiveError};
use crate::node::{disconnect_all, NodeArena, NodeId};
use crate::scope::{ScopeArena, ScopeData, ScopeId};

pub(crate) struct Runtime {
    pub nodes: RefCell<NodeArena>,
    pub scopes: RefCell<ScopeArena>,
    pub root_scope: Cell<Option<ScopeId>>,
    pub current_owner: Cell<Option<ScopeId>>,
    /// Stack of nodes currently being evaluated; the last entry is the active listener.
    /// Checked on every `evaluate` entry to detect cycles (§4.4 reentrancy).
    pub listener_stack: RefCell<Vec<NodeId>>,
    /// `true` while inside `untracked`: reads do not record edges.
    pub tracking_suppressed: Cell<bool>,
    pub batch_depth: Cell<u32>,
    pub pending: RefCell<VecDeque<NodeId>>,
    pub pending_set: RefCell<HashSet<NodeId>>,
    /// Reentrancy guard so a write inside an observer's callback, which is itself running
    /// inside a drain, extends the single active drain loop instead of starting a nested one.
    pub draining: Cell<bool>,
}

thread_local! {
    static GLOBAL_RUNTIME: Cell<Option<&'static Runtime>> = const { Cell::new(None) };
}

impl Runtime {
    #[cfg_attr(debug_assertions, track_caller)]
    pub fn global() -> &'static Runtime {
        GLOBAL_RUNTIME
            .with(|rt| rt.get())
            .expect("no reactive root found: this must be called from inside `create_root`")
    }

    pub fn try_global() -> Option<&'static Runtime> {
        GLOBAL_RUNTIME.with(|rt| rt.get())
    }

    pub fn set_global(rt: Option<&'static Runtime>) -> Option<&'static Runtime> {
        GLOBAL_RUNTIME.with(|cell| cell.replace(rt))
    }

    pub fn new_static() -> &'static Runtime {
        let this = Runtime {
            nodes: RefCell::new(NodeArena::with_key()),
            scopes: RefCell::new(ScopeArena::with_key()),
            root_scope: Cell::new(None),
            current_owner: Cell::new(None),
            listener_stack: RefCell::new(Vec::new()),
            tracking_suppressed: Cell::new(false),
            batch_depth: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            pending_set: RefCell::new(HashSet::new()),
            draining: Cell::new(false),
        };
        let leaked: &'static Runtime = Box::leak(Box::new(this));
        leaked.reinit();
        leaked
    }

    /// Tears down every node and scope, then creates a fresh root scope. Used both to
    /// initialize a freshly leaked `Runtime` and to implement [`crate::RootHandle::dispose`].
    #[cfg_attr(debug_assertions, track_caller)]
    pub fn reinit(&'static self) {
        if let Some(root_scope) = self.root_scope.get() {
            let prev = Runtime::set_global(Some(self));
            self.dispose_scope(root_scope);
            Runtime::set_global(prev);
        }
        self.nodes.borrow_mut().clear();
        self.scopes.borrow_mut().clear();
        self.listener_stack.borrow_mut().clear();
        self.pending.borrow_mut().clear();
        self.pending_set.borrow_mut().clear();
        self.batch_depth.set(0);
        self.draining.set(false);
        self.tracking_suppressed.set(false);

        #[cfg(debug_assertions)]
        let root = ScopeData::new(None, *Location::caller());
        #[cfg(not(debug_assertions))]
        let root = ScopeData::new(None);
        let root_id = self.scopes.borrow_mut().insert(root);
        self.root_scope.set(Some(root_id));
        self.current_owner.set(Some(root_id));
    }

    pub fn current_listener(&self) -> Option<NodeId> {
        if self.tracking_suppressed.get() {
            None
        } else {
            self.listener_stack.borrow().last().copied()
        }
    }

    /// Creates a scope as a child of `current_owner`, runs `f` with it installed as the
    /// current owner, then restores the previous owner. Returns the new scope's id.
    #[cfg_attr(debug_assertions, track_caller)]
    pub fn with_child_scope<T>(&self, f: impl FnOnce() -> T) -> (ScopeId, T) {
        self.with_scope_under(self.current_owner.get(), f)
    }

    /// Like [`Runtime::with_child_scope`], but the new scope is parented to `parent`
    /// regardless of `current_owner`. Used by the evaluator: a node's private body scope must
    /// always nest under the node's own owner, not under whatever scope happens to be current
    /// at the moment a lazy read triggers re-evaluation.
    #[cfg_attr(debug_assertions, track_caller)]
    pub fn with_scope_under<T>(&self, parent: Option<ScopeId>, f: impl FnOnce() -> T) -> (ScopeId, T) {
        #[cfg(debug_assertions)]
        let data = ScopeData::new(parent, *Location::caller());
        #[cfg(not(debug_assertions))]
        let data = ScopeData::new(parent);
        let id = self.scopes.borrow_mut().insert(data);
        if let Some(parent) = parent {
            if let Some(parent_data) = self.scopes.borrow_mut().get_mut(parent) {
                parent_data.children.push(id);
            }
        }
        let prev = self.current_owner.replace(Some(id));
        let result = f();
        self.current_owner.set(prev);
        (id, result)
    }

    pub fn register_owned_node(&self, owner: ScopeId, node: NodeId) {
        if let Some(data) = self.scopes.borrow_mut().get_mut(owner) {
            data.owned_nodes.push(node);
        }
    }

    /// Registers a cleanup on `owner`. If `owner` is already disposed, the spec's ownership
    /// contract (§4.7) says disposal is monotonic but a registration against an already-gone
    /// scope should not panic the caller: it simply runs the cleanup immediately, as if the
    /// scope had disposed it the instant it was registered.
    pub fn register_cleanup(&self, owner: ScopeId, cleanup: Box<dyn FnOnce()>) {
        let disposed = match self.scopes.borrow_mut().get_mut(owner) {
            Some(data) if !data.disposed => {
                data.cleanups.push(cleanup);
                return;
            }
            Some(_) => true,
            None => true,
        };
        if disposed {
            run_cleanup(cleanup, None);
        }
    }

    /// Disposes a scope and everything it owns: child scopes (recursively, depth-first),
    /// then owned nodes (detaching their edges from the graph), then its own cleanups in
    /// reverse registration order. Idempotent.
    pub fn dispose_scope(&self, id: ScopeId) {
        let (children, owned_nodes, cleanups, loc) = {
            let mut scopes = self.scopes.borrow_mut();
            let Some(data) = scopes.get_mut(id) else {
                return;
            };
            if data.disposed {
                return;
            }
            data.disposed = true;
            #[cfg(debug_assertions)]
            let loc = Some(data.creation_loc);
            #[cfg(not(debug_assertions))]
            let loc = None;
            (
                std::mem::take(&mut data.children),
                std::mem::take(&mut data.owned_nodes),
                std::mem::take(&mut data.cleanups),
                loc,
            )
        };
        for child in children {
            self.dispose_scope(child);
        }
        for node in owned_nodes {
            self.dispose_node(node);
        }
        for cleanup in cleanups.into_iter().rev() {
            run_cleanup(cleanup, loc);
        }
    }

    /// Disposes a single node: recursively disposes its body scope (if it has one, e.g. a
    /// derivation or observer), detaches every edge it participates in, and removes it from
    /// the arena.
    pub fn dispose_node(&self, id: NodeId) {
        let body_scope = self
            .nodes
            .borrow_mut()
            .get(id)
            .and_then(|n| n.body_scope);
        if let Some(body_scope) = body_scope {
            self.dispose_scope(body_scope);
        }
        disconnect_all(&mut self.nodes.borrow_mut(), id);
        self.nodes.borrow_mut().remove(id);
    }
}

/// Runs a cleanup closure, catching panics so one failing cleanup cannot stop the rest of a
/// disposal (§7: cleanup failures are collected/reported, not fatal).
pub(crate) fn run_cleanup(cleanup: Box<dyn FnOnce()>, loc: Option<Location<'static>>) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup));
    if let Err(payload) = result {
        report(ReactiveError::Cleanup {
            location: loc,
            payload: payload_message(&*payload),
        });
    }
}
