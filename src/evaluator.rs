//! Re-running a single derivation or observer and reconciling its dependency edges.

use crate::node::{self, Color, NodeId, NodeKind};
use crate::runtime::Runtime;

/// Re-runs `id`'s compute function (or observer callback), recording fresh dependency edges
/// for whatever it reads, and returns whether its externally visible value changed.
///
/// # Panics
/// Panics with a cycle message if `id` is already on the listener stack — i.e. its own
/// evaluation transitively tried to read itself (§4.4 reentrancy, §7 "Cycle").
///
/// A panic raised by the node's own compute/callback is *not* caught here: for a direct
/// derivation read this must unwind into the reader's call stack (§7 "Compute failure"); for
/// an observer driven by a batch drain, the caller in `crate::batch` wraps the call in
/// `catch_unwind` instead, so a single `evaluate` implementation serves both policies.
pub(crate) fn evaluate(rt: &Runtime, id: NodeId) -> bool {
    if rt.listener_stack.borrow().contains(&id) {
        panic!("cyclic reactive dependency");
    }

    let old_body = rt.nodes.borrow().get(id).and_then(|n| n.body_scope);
    if let Some(old_body) = old_body {
        rt.dispose_scope(old_body);
    }
    node::unlink_all(&mut rt.nodes.borrow_mut(), id);

    struct ListenerGuard<'a> {
        rt: &'a Runtime,
    }
    impl Drop for ListenerGuard<'_> {
        fn drop(&mut self) {
            self.rt.listener_stack.borrow_mut().pop();
        }
    }
    rt.listener_stack.borrow_mut().push(id);
    let _guard = ListenerGuard { rt };

    let owner = rt.nodes.borrow().get(id).and_then(|n| n.owner);
    let (body_scope, changed) = rt.with_scope_under(owner, || run_compute(rt, id));

    if let Some(node) = rt.nodes.borrow_mut().get_mut(id) {
        node.body_scope = Some(body_scope);
        node.has_run = true;
        node.color = Color::Clean;
    }
    changed
}

/// Puts a derivation's `compute` closure back into its node on drop, whether that happens
/// because the call finished normally or because it panicked. Without this, a panicking
/// compute function would leave the node holding the `unreachable!` placeholder installed by
/// `run_compute`, breaking every future read (§7.2: "subsequent reads retry the computation").
struct RestoreCompute<'a> {
    rt: &'a Runtime,
    id: NodeId,
    compute: Option<Box<dyn FnMut() -> Box<dyn std::any::Any>>>,
}

impl Drop for RestoreCompute<'_> {
    fn drop(&mut self) {
        if let Some(compute) = self.compute.take() {
            if let Some(node) = self.rt.nodes.borrow_mut().get_mut(self.id) {
                if let NodeKind::Derivation(d) = &mut node.kind {
                    d.compute = compute;
                }
            }
        }
    }
}

/// The observer-side counterpart of [`RestoreCompute`].
struct RestoreCallback<'a> {
    rt: &'a Runtime,
    id: NodeId,
    callback: Option<Box<dyn FnMut()>>,
}

impl Drop for RestoreCallback<'_> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            if let Some(node) = self.rt.nodes.borrow_mut().get_mut(self.id) {
                if let NodeKind::Observer(o) = &mut node.kind {
                    o.callback = callback;
                }
            }
        }
    }
}

/// Runs the node's own function against its current `NodeKind`, taking the `compute`/
/// `callback` closure out for the duration of the call so the node arena is never borrowed
/// while user code (which may itself read/write other nodes) is running. The closure is put
/// back by a drop guard, so a panic partway through still leaves the original closure in
/// place rather than the placeholder used to satisfy the borrow checker while it's out.
fn run_compute(rt: &Runtime, id: NodeId) -> bool {
    enum Action {
        Derivation(Box<dyn FnMut() -> Box<dyn std::any::Any>>),
        Observer(Box<dyn FnMut()>),
    }

    let action = {
        let mut nodes = rt.nodes.borrow_mut();
        let node = nodes.get_mut(id).expect("node disposed during its own evaluation");
        match &mut node.kind {
            NodeKind::Derivation(d) => Action::Derivation(std::mem::replace(
                &mut d.compute,
                Box::new(|| unreachable!()),
            )),
            NodeKind::Observer(o) => {
                Action::Observer(std::mem::replace(&mut o.callback, Box::new(|| {})))
            }
            NodeKind::Cell(_) => unreachable!("cells are never evaluated"),
        }
    };

    match action {
        Action::Derivation(compute) => {
            let mut guard = RestoreCompute {
                rt,
                id,
                compute: Some(compute),
            };
            let new_value = (guard.compute.as_mut().expect("compute taken twice"))();
            drop(guard);

            let mut nodes = rt.nodes.borrow_mut();
            let node = nodes.get_mut(id).expect("node disposed during its own evaluation");
            let NodeKind::Derivation(d) = &mut node.kind else {
                unreachable!()
            };
            match &d.value {
                Some(old) if (d.eq)(old.as_ref(), new_value.as_ref()) => false,
                _ => {
                    d.value = Some(new_value);
                    true
                }
            }
        }
        Action::Observer(callback) => {
            let mut guard = RestoreCallback {
                rt,
                id,
                callback: Some(callback),
            };
            (guard.callback.as_mut().expect("callback taken twice"))();
            true
        }
    }
}
