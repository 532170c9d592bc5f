//! Context values: scope-scoped key-by-type storage, looked up through the ownership tree.
//!
//! Unlike the rest of the public surface, context values are read by cloning them out rather
//! than lending a reference, since a scope's storage lives behind a `RefCell` inside the
//! arena rather than on the stack — there is no borrow that could safely outlive the lookup.
//! [`with_context`] is provided for callers who want to avoid a clone.

use std::any::{Any, TypeId};

use crate::runtime::Runtime;
use crate::scope::ScopeId;

/// Provides a context value of type `T` in the current scope. Looked up by later
/// [`use_context`] calls from this scope or any of its descendants, unless shadowed by a
/// closer `provide_context::<T>`.
///
/// # Panics
/// Panics if a context of type `T` has already been provided in the *same* scope.
#[track_caller]
pub fn provide_context<T: 'static>(value: T) {
    let rt = Runtime::global();
    let owner = rt
        .current_owner
        .get()
        .expect("provide_context called outside a reactive scope");
    let mut scopes = rt.scopes.borrow_mut();
    let data = scopes.get_mut(owner).expect("current scope was disposed");
    let map = data.contexts.get_or_insert_with(Default::default);
    if map.insert(TypeId::of::<T>(), Box::new(value)).is_some() {
        panic!("a context of this type was already provided in the current scope");
    }
}

/// Borrows a context value of type `T` from the current scope or its nearest ancestor that
/// provided one.
///
/// The scope arena stays borrowed for the duration of `f`, so `f` must not call anything that
/// borrows it mutably (`provide_context`, `create_child_scope`, scope disposal) — doing so
/// panics via the usual `RefCell` borrow check, rather than risk a dangling reference into the
/// arena. Callers that need to do that should clone the value out instead, e.g. with
/// [`try_use_context`].
pub fn with_context<T: 'static, R>(f: impl FnOnce(&T) -> R) -> Option<R> {
    let rt = Runtime::global();
    let owner = rt.current_owner.get()?;
    let scopes = rt.scopes.borrow();
    let mut current = Some(owner);
    while let Some(id) = current {
        let data = scopes.get(id)?;
        if let Some(map) = &data.contexts {
            if let Some(value) = map.get(&TypeId::of::<T>()) {
                let value = value.downcast_ref::<T>().expect("context type mismatch");
                return Some(f(value));
            }
        }
        current = data.parent;
    }
    None
}

/// Clones a context value of type `T` looked up from the current scope or an ancestor.
pub fn try_use_context<T: Clone + 'static>() -> Option<T> {
    with_context(|v: &T| v.clone())
}

/// Like [`try_use_context`], but panics if no context of type `T` is found.
#[track_caller]
pub fn use_context<T: Clone + 'static>() -> T {
    try_use_context().expect("context not found for type")
}

/// Returns how many scopes deep the current scope is nested below the root (`0` at the root).
pub fn scope_depth() -> u32 {
    let rt = Runtime::global();
    let scopes = rt.scopes.borrow();
    let mut depth = 0;
    let mut current = rt.current_owner.get();
    while let Some(parent) = current.and_then(|id| scopes.get(id)).and_then(|d| d.parent) {
        depth += 1;
        current = Some(parent);
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{create_child_scope, create_root};

    #[test]
    fn context_visible_in_same_and_nested_scope() {
        create_root(|| {
            provide_context(42i32);
            assert_eq!(use_context::<i32>(), 42);
            create_child_scope(|| {
                assert_eq!(use_context::<i32>(), 42);
            });
        });
    }

    #[test]
    fn child_context_does_not_leak_upward() {
        create_root(|| {
            create_child_scope(|| {
                provide_context(7i32);
                assert_eq!(use_context::<i32>(), 7);
            });
            assert!(try_use_context::<i32>().is_none());
        });
    }

    #[test]
    #[should_panic(expected = "already provided")]
    fn duplicate_context_in_same_scope_panics() {
        create_root(|| {
            provide_context(1i32);
            provide_context(2i32);
        });
    }

    #[test]
    fn depth_increases_with_nesting() {
        create_root(|| {
            assert_eq!(scope_depth(), 0);
            create_child_scope(|| {
                assert_eq!(scope_depth(), 1);
                create_child_scope(|| {
                    assert_eq!(scope_depth(), 2);
                });
            });
        });
    }
}
