//! Derivations: memoized pure functions of other nodes.

use std::any::Any;
use std::marker::PhantomData;
#[cfg(debug_assertions)]
use std::panic::Location;

use crate::color;
use crate::node::{self, DerivData, Node, NodeId, NodeKind};
use crate::runtime::Runtime;

/// A memoized, lazily (re-)computed function of other reactive nodes.
pub struct Derivation<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Derivation<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Derivation<T> {}

/// Creates a derivation whose downstream notification is suppressed when two consecutive
/// outputs compare equal under `PartialEq` (§3: "equality predicate, defaults to equality").
#[cfg_attr(debug_assertions, track_caller)]
pub fn derivation<T: PartialEq + 'static>(f: impl FnMut() -> T + 'static) -> Derivation<T> {
    derivation_with_eq(f, T::eq)
}

/// Creates a derivation with a custom equality predicate, or `|_, _| false` to notify on
/// every recomputation regardless of whether the output actually changed.
#[cfg_attr(debug_assertions, track_caller)]
pub fn derivation_with_eq<T: 'static>(
    mut f: impl FnMut() -> T + 'static,
    eq: impl Fn(&T, &T) -> bool + 'static,
) -> Derivation<T> {
    let rt = Runtime::global();
    let owner = rt
        .current_owner
        .get()
        .expect("derivation created outside a reactive scope");
    let compute: Box<dyn FnMut() -> Box<dyn Any>> = Box::new(move || Box::new(f()) as Box<dyn Any>);
    let boxed_eq: Box<dyn Fn(&dyn Any, &dyn Any) -> bool> = Box::new(move |a, b| {
        eq(
            a.downcast_ref::<T>().expect("derivation type mismatch"),
            b.downcast_ref::<T>().expect("derivation type mismatch"),
        )
    });
    let kind = NodeKind::Derivation(DerivData {
        value: None,
        compute,
        eq: boxed_eq,
    });
    #[cfg(debug_assertions)]
    let node = Node::new(kind, Some(owner), *Location::caller());
    #[cfg(not(debug_assertions))]
    let node = Node::new(kind, Some(owner));
    let id = rt.nodes.borrow_mut().insert(node);
    rt.register_owned_node(owner, id);
    Derivation {
        id,
        _marker: PhantomData,
    }
}

impl<T: 'static> Derivation<T> {
    fn track(&self, rt: &Runtime) {
        if let Some(listener) = rt.current_listener() {
            node::link(&mut rt.nodes.borrow_mut(), self.id, listener);
        }
    }

    /// Reads the memoized value, validating and recomputing first if needed (§4.3), and
    /// clones it out.
    pub fn get_clone(&self) -> T
    where
        T: Clone,
    {
        self.with(|v| v.clone())
    }

    /// Reads the memoized value by copy.
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        self.with(|v| *v)
    }

    /// Reads the memoized value without creating a dependency edge.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(|v| v.clone())
    }

    /// Alias for [`Derivation::get_untracked`]: `untrack(|| derivation.get())` for a single node.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.get_untracked()
    }

    /// Validates and borrows the memoized value, recording a dependency edge if a listener is
    /// active.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let rt = Runtime::global();
        color::ensure_fresh(rt, self.id);
        self.track(rt);
        let nodes = rt.nodes.borrow();
        let node = nodes
            .get(self.id)
            .expect("derivation used after its owning scope was disposed");
        let NodeKind::Derivation(data) = &node.kind else {
            unreachable!("Derivation handle pointed at a non-derivation node")
        };
        let value = data
            .value
            .as_ref()
            .expect("derivation has no value after evaluation");
        f(value.downcast_ref::<T>().expect("derivation type mismatch"))
    }

    /// Validates and borrows the memoized value without creating a dependency edge.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        crate::batch::untrack(|| self.with(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::cell;
    use crate::scope::create_root;

    #[test]
    fn recomputes_only_when_read_after_a_dirtying_write() {
        create_root(|| {
            let runs = std::rc::Rc::new(std::cell::Cell::new(0));
            let c = cell(0);
            let r = runs.clone();
            let d = derivation(move || {
                r.set(r.get() + 1);
                c.get() * 2
            });
            assert_eq!(d.get(), 0);
            assert_eq!(runs.get(), 1);
            c.set(3);
            assert_eq!(runs.get(), 1); // lazy: no recompute until read
            assert_eq!(d.get(), 6);
            assert_eq!(runs.get(), 2);
            assert_eq!(d.get(), 6);
            assert_eq!(runs.get(), 2); // clean: no redundant recompute
        });
    }

    #[test]
    fn diamond_dependency_recomputes_once() {
        create_root(|| {
            let runs = std::rc::Rc::new(std::cell::Cell::new(0));
            let s = cell(1);
            let a = derivation(move || s.get() + 1);
            let b = derivation(move || s.get() * 10);
            let r = runs.clone();
            let d = derivation(move || {
                r.set(r.get() + 1);
                a.get() + b.get()
            });
            assert_eq!(d.get(), 12);
            s.set(2);
            assert_eq!(d.get(), 13);
            assert_eq!(runs.get(), 2);
        });
    }

    #[test]
    fn dynamic_dependencies_drop_unused_branch() {
        create_root(|| {
            let flag = cell(true);
            let x = cell(1);
            let y = cell(100);
            let d = derivation(move || if flag.get() { x.get() } else { y.get() });
            assert_eq!(d.get(), 1);
            y.set(200); // not a current dependency yet
            assert_eq!(d.get(), 1);
            flag.set(false);
            assert_eq!(d.get(), 200);
            x.set(9); // no longer a dependency
            assert_eq!(d.get(), 200);
            y.set(300);
            assert_eq!(d.get(), 300);
        });
    }

    #[test]
    fn custom_equality_suppresses_notification_on_unchanged_projection() {
        create_root(|| {
            #[derive(Clone)]
            struct Point {
                v: i32,
            }
            // Every write is a fresh struct, so the cell's own (reference-style) equality
            // would never suppress; the derivation projects out `v` and supplies its own
            // equality predicate to suppress downstream notification when `v` is unchanged.
            let c = crate::cell::cell_with_eq(Point { v: 1 }, |_, _| false);
            let runs = std::rc::Rc::new(std::cell::Cell::new(0));
            let r = runs.clone();
            let d = derivation_with_eq(move || c.get_clone().v, |a: &i32, b: &i32| a == b);
            let _obs = crate::observer::observer(move || {
                d.get();
                r.set(r.get() + 1);
            });
            assert_eq!(runs.get(), 1);
            c.set(Point { v: 1 });
            assert_eq!(runs.get(), 1);
            c.set(Point { v: 2 });
            assert_eq!(runs.get(), 2);
        });
    }
}
