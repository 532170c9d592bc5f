//! Ownership scopes: a tree of disposal sets that mirrors construction nesting.

use std::any::{Any, TypeId};
use std::collections::HashMap;
#[cfg(debug_assertions)]
use std::panic::Location;

use slotmap::{new_key_type, SlotMap};

use crate::node::NodeId;

new_key_type! {
    pub struct ScopeId;
}

pub(crate) struct ScopeData {
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Derivations and observers created with this scope as their owner.
    pub owned_nodes: Vec<NodeId>,
    /// Cleanup callbacks registered via `on_cleanup`, run in reverse registration order.
    pub cleanups: Vec<Box<dyn FnOnce()>>,
    /// Context values provided with `provide_context`, keyed by type and lazily allocated
    /// since most scopes never use this.
    pub contexts: Option<HashMap<TypeId, Box<dyn Any>>>,
    pub disposed: bool,
    #[cfg(debug_assertions)]
    pub creation_loc: Location<'static>,
}

impl ScopeData {
    #[cfg(debug_assertions)]
    pub fn new(parent: Option<ScopeId>, loc: Location<'static>) -> Self {
        ScopeData {
            parent,
            children: Vec::new(),
            owned_nodes: Vec::new(),
            cleanups: Vec::new(),
            contexts: None,
            disposed: false,
            creation_loc: loc,
        }
    }

    #[cfg(not(debug_assertions))]
    pub fn new(parent: Option<ScopeId>) -> Self {
        ScopeData {
            parent,
            children: Vec::new(),
            owned_nodes: Vec::new(),
            cleanups: Vec::new(),
            contexts: None,
            disposed: false,
        }
    }
}

pub(crate) type ScopeArena = SlotMap<ScopeId, ScopeData>;

use crate::runtime::Runtime;

/// A handle to a reactive root, obtained from [`create_root`].
///
/// Dropping this handle does *not* dispose the root; call [`RootHandle::dispose`]
/// explicitly, mirroring the rest of this crate's synchronous, nothing-happens-on-drop
/// ownership style.
#[derive(Clone, Copy)]
pub struct RootHandle {
    rt: &'static Runtime,
}

impl RootHandle {
    /// Disposes every node and scope created under this root, then installs a fresh empty
    /// root scope so the handle (and any `create_root` call that reuses this thread) stays
    /// usable.
    pub fn dispose(&self) {
        self.rt.reinit();
    }

    /// Re-enters this root's scope to run `f`, for example from a callback that was
    /// registered while a different root was active.
    pub fn run_in<T>(&self, f: impl FnOnce() -> T) -> T {
        let prev = Runtime::set_global(Some(self.rt));
        let result = f();
        Runtime::set_global(prev);
        result
    }
}

/// Creates a new reactive root and runs `f` inside it. Every cell, derivation and observer
/// created while `f` runs (directly or from a nested scope) is owned by this root until
/// disposed.
#[must_use = "a root should eventually be disposed"]
#[cfg_attr(debug_assertions, track_caller)]
pub fn create_root(f: impl FnOnce()) -> RootHandle {
    let rt = Runtime::new_static();
    let prev = Runtime::set_global(Some(rt));
    f();
    Runtime::set_global(prev);
    RootHandle { rt }
}

/// A handle to a child scope created with [`create_child_scope`].
#[derive(Clone, Copy)]
pub struct ScopeHandle {
    id: ScopeId,
}

impl ScopeHandle {
    pub(crate) fn id(&self) -> ScopeId {
        self.id
    }

    /// Disposes this scope: children first, then owned nodes, then this scope's own
    /// `on_cleanup` callbacks in reverse registration order. Idempotent.
    pub fn dispose(&self) {
        Runtime::global().dispose_scope(self.id);
    }
}

/// Creates a new scope as a child of the current scope, runs `f` inside it, and returns a
/// handle that can later dispose it. Nested `create_child_scope` calls build the ownership
/// tree that backs cascading disposal.
#[cfg_attr(debug_assertions, track_caller)]
pub fn create_child_scope(f: impl FnOnce()) -> ScopeHandle {
    let rt = Runtime::global();
    let (id, ()) = rt.with_child_scope(f);
    ScopeHandle { id }
}

/// Registers a callback to run when the current scope is disposed.
///
/// If the current scope has already been disposed (possible if this is called from a
/// callback running after its own teardown began), the callback runs immediately instead of
/// being queued, rather than silently discarding it.
///
/// # Panics
/// Panics if called outside any reactive scope.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    let rt = Runtime::global();
    let owner = rt
        .current_owner
        .get()
        .expect("on_cleanup called outside a reactive scope");
    rt.register_cleanup(owner, Box::new(f));
}

/// Returns a handle to the scope currently in effect, or `None` if no reactive root is
/// active on this thread.
pub fn current_scope() -> Option<ScopeHandle> {
    let rt = Runtime::try_global()?;
    rt.current_owner.get().map(|id| ScopeHandle { id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::cell;

    #[test]
    fn cleanup_runs_on_scope_disposal() {
        create_root(|| {
            let called = cell(false);
            let scope = create_child_scope(move || {
                on_cleanup(move || called.set(true));
            });
            assert!(!called.get_untracked());
            scope.dispose();
            assert!(called.get_untracked());
        });
    }

    #[test]
    fn disposing_parent_disposes_children_first() {
        create_root(|| {
            let order = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
            let o1 = order.clone();
            let o2 = order.clone();
            let parent = create_child_scope(move || {
                create_child_scope(move || {
                    on_cleanup(move || o1.borrow_mut().push("child"));
                });
                on_cleanup(move || o2.borrow_mut().push("parent"));
            });
            parent.dispose();
            assert_eq!(*order.borrow(), vec!["child", "parent"]);
        });
    }

    #[test]
    fn dispose_is_idempotent() {
        create_root(|| {
            let hits = std::rc::Rc::new(std::cell::Cell::new(0));
            let h = hits.clone();
            let scope = create_child_scope(move || {
                on_cleanup(move || h.set(h.get() + 1));
            });
            scope.dispose();
            scope.dispose();
            assert_eq!(hits.get(), 1);
        });
    }
}
