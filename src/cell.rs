//! Cells: mutable reactive sources.

use std::any::Any;
use std::marker::PhantomData;
#[cfg(debug_assertions)]
use std::panic::Location;

use crate::color;
use crate::node::{self, CellData, Color, Node, NodeId, NodeKind};
use crate::runtime::Runtime;

/// A mutable reactive source holding a value of type `T`.
///
/// `Cell` is a thin, `Copy`-able handle into the current root's node arena; cloning it never
/// clones `T` itself.
pub struct Cell<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Cell<T> {}

/// Creates a cell whose writes are suppressed when the new value equals the old one by
/// `PartialEq`. Use [`cell_with_eq`] for types without `PartialEq` or a coarser equality.
#[cfg_attr(debug_assertions, track_caller)]
pub fn cell<T: PartialEq + 'static>(initial: T) -> Cell<T> {
    cell_with_eq(initial, T::eq)
}

/// Creates a cell with a custom equality predicate used to suppress redundant writes (§8
/// "writing a cell to its current value is a no-op").
#[cfg_attr(debug_assertions, track_caller)]
pub fn cell_with_eq<T: 'static>(initial: T, eq: impl Fn(&T, &T) -> bool + 'static) -> Cell<T> {
    let rt = Runtime::global();
    let owner = rt
        .current_owner
        .get()
        .expect("cell created outside a reactive scope");
    let boxed_eq: Box<dyn Fn(&dyn Any, &dyn Any) -> bool> = Box::new(move |a, b| {
        eq(
            a.downcast_ref::<T>().expect("cell type mismatch"),
            b.downcast_ref::<T>().expect("cell type mismatch"),
        )
    });
    let kind = NodeKind::Cell(CellData {
        value: Box::new(initial),
        eq: boxed_eq,
    });
    #[cfg(debug_assertions)]
    let mut node = Node::new(kind, Some(owner), *Location::caller());
    #[cfg(not(debug_assertions))]
    let mut node = Node::new(kind, Some(owner));
    node.color = Color::Clean;
    node.has_run = true;
    let id = rt.nodes.borrow_mut().insert(node);
    rt.register_owned_node(owner, id);
    Cell {
        id,
        _marker: PhantomData,
    }
}

impl<T: 'static> Cell<T> {
    fn track(&self, rt: &Runtime) {
        if let Some(listener) = rt.current_listener() {
            node::link(&mut rt.nodes.borrow_mut(), self.id, listener);
        }
    }

    /// Reads the cell, recording a dependency edge if a listener is active, and clones the
    /// value out.
    pub fn get_clone(&self) -> T
    where
        T: Clone,
    {
        self.with(|v| v.clone())
    }

    /// Reads the cell by copy. Prefer [`get_clone`](Cell::get_clone) for non-`Copy` types.
    pub fn get(&self) -> T
    where
        T: Copy,
    {
        self.with(|v| *v)
    }

    /// Reads the cell without creating a dependency edge, regardless of the currently active
    /// listener.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.with_untracked(|v| v.clone())
    }

    /// Alias for [`Cell::get_untracked`]: `untrack(|| cell.get())` for a single node.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.get_untracked()
    }

    /// Borrows the current value, recording a dependency edge if a listener is active.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let rt = Runtime::global();
        self.track(rt);
        let nodes = rt.nodes.borrow();
        let node = nodes
            .get(self.id)
            .expect("cell used after its owning scope was disposed");
        let NodeKind::Cell(data) = &node.kind else {
            unreachable!("Cell handle pointed at a non-cell node")
        };
        f(data.value.downcast_ref::<T>().expect("cell type mismatch"))
    }

    /// Borrows the current value without recording a dependency edge.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        crate::batch::untrack(|| self.with(f))
    }

    /// Replaces the value. A no-op (no observers fire, no color changes) if the new value
    /// equals the old one under this cell's equality predicate.
    pub fn set(&self, new: T) {
        let rt = Runtime::global();
        let changed = {
            let mut nodes = rt.nodes.borrow_mut();
            let node = nodes
                .get_mut(self.id)
                .expect("cell used after its owning scope was disposed");
            let NodeKind::Cell(data) = &mut node.kind else {
                unreachable!("Cell handle pointed at a non-cell node")
            };
            let new_any: &dyn Any = &new;
            let equal = (data.eq)(data.value.as_ref(), new_any);
            if !equal {
                data.value = Box::new(new);
            }
            !equal
        };
        if changed {
            color::push_down(rt, self.id);
            rt.maybe_drain();
        }
    }

    /// Replaces the value without notifying any observers, and without marking the cell
    /// dirty. Useful for seeding a value that future reads should see without retroactively
    /// invalidating derivations that already ran against the old one.
    pub fn set_silent(&self, new: T) {
        let rt = Runtime::global();
        let mut nodes = rt.nodes.borrow_mut();
        if let Some(node) = nodes.get_mut(self.id) {
            if let NodeKind::Cell(data) = &mut node.kind {
                data.value = Box::new(new);
            }
        }
    }

    /// Mutates the value in place and unconditionally notifies observers (no equality check,
    /// since the caller only has a `&mut T`, not an old value to compare against).
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let rt = Runtime::global();
        {
            let mut nodes = rt.nodes.borrow_mut();
            let node = nodes
                .get_mut(self.id)
                .expect("cell used after its owning scope was disposed");
            let NodeKind::Cell(data) = &mut node.kind else {
                unreachable!("Cell handle pointed at a non-cell node")
            };
            f(data.value.downcast_mut::<T>().expect("cell type mismatch"));
        }
        color::push_down(rt, self.id);
        rt.maybe_drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::create_root;

    #[test]
    fn get_and_set_roundtrip() {
        create_root(|| {
            let c = cell(0);
            assert_eq!(c.get(), 0);
            c.set(5);
            assert_eq!(c.get(), 5);
        });
    }

    #[test]
    fn set_to_same_value_is_a_noop_for_observers() {
        create_root(|| {
            let c = cell(1);
            let runs = std::rc::Rc::new(std::cell::Cell::new(0));
            let r = runs.clone();
            let _obs = crate::observer::observer(move || {
                c.get();
                r.set(r.get() + 1);
            });
            assert_eq!(runs.get(), 1);
            c.set(1);
            assert_eq!(runs.get(), 1);
            c.set(2);
            assert_eq!(runs.get(), 2);
        });
    }

    #[test]
    fn update_mutates_in_place() {
        create_root(|| {
            let c = cell(vec![1, 2, 3]);
            c.update(|v| v.push(4));
            assert_eq!(c.get_clone(), vec![1, 2, 3, 4]);
        });
    }
}
