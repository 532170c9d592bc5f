//! The three-color coloring engine: cheap, eager suspicion on write (push-down), precise,
//! lazy confirmation on read (pull-up).

use crate::node::{Color, NodeId, NodeKind};
use crate::runtime::Runtime;

/// Marks `source` itself `Dirty`, then walks its observers depth-first, upgrading every
/// `Clean` node to `Check` and recursing through it. Nodes already `Check` or `Dirty`
/// terminate the walk — their whole subtree has already been marked by an earlier write in
/// this same commit, or by an ancestor write still being processed.
///
/// Every node that becomes `Check` and is itself an observer (has a user callback) is
/// enqueued for the batch drain; derivations that become `Check` are left for a future
/// reader to validate lazily.
pub(crate) fn push_down(rt: &Runtime, source: NodeId) {
    {
        let mut nodes = rt.nodes.borrow_mut();
        if let Some(node) = nodes.get_mut(source) {
            node.color = Color::Dirty;
        }
    }
    let mut stack: Vec<NodeId> = {
        let nodes = rt.nodes.borrow();
        nodes
            .get(source)
            .map(|n| n.observers.iter().map(|s| s.id).collect())
            .unwrap_or_default()
    };
    while let Some(id) = stack.pop() {
        let mut nodes = rt.nodes.borrow_mut();
        let Some(node) = nodes.get_mut(id) else {
            continue;
        };
        if node.color != Color::Clean {
            continue;
        }
        node.color = Color::Check;
        let is_observer = matches!(node.kind, NodeKind::Observer(_));
        let children: Vec<NodeId> = node.observers.iter().map(|s| s.id).collect();
        drop(nodes);
        if is_observer {
            rt.enqueue(id);
        }
        stack.extend(children);
    }
}

/// Validates `id`, recursively validating any `Check` sources first. Returns whether `id`'s
/// own value is now known to have changed since the value last observed by its readers.
///
/// A node is left `Clean` once this returns, whether or not it actually changed: `Check` and
/// `Dirty` are both resolved here, `Clean` is a true fixed point until the next write.
///
/// A `Dirty` cell is a special case: `push_down` already stored its new value at write time,
/// so "validating" one just means consuming the dirty mark and reporting the change — there is
/// no compute function to run, so this must not fall through to `evaluator::evaluate`.
pub(crate) fn validate(rt: &Runtime, id: NodeId) -> bool {
    let (color, is_cell) = {
        let nodes = rt.nodes.borrow();
        match nodes.get(id) {
            Some(node) => (Some(node.color), matches!(node.kind, NodeKind::Cell(_))),
            None => (None, false),
        }
    };
    match color {
        None => false,
        Some(Color::Clean) => false,
        Some(Color::Dirty) if is_cell => {
            if let Some(node) = rt.nodes.borrow_mut().get_mut(id) {
                node.color = Color::Clean;
            }
            true
        }
        Some(Color::Dirty) => crate::evaluator::evaluate(rt, id),
        Some(Color::Check) => {
            let sources: Vec<NodeId> = rt
                .nodes
                .borrow()
                .get(id)
                .map(|n| n.sources.iter().map(|s| s.id).collect())
                .unwrap_or_default();
            let mut any_changed = false;
            for source in sources {
                if validate(rt, source) {
                    any_changed = true;
                    break;
                }
            }
            if any_changed {
                crate::evaluator::evaluate(rt, id)
            } else {
                if let Some(node) = rt.nodes.borrow_mut().get_mut(id) {
                    node.color = Color::Clean;
                }
                false
            }
        }
    }
}

/// Ensures `id`'s stored value (if it is a derivation) is current, without caring whether it
/// changed. Cells never need this: they have no sources to validate.
pub(crate) fn ensure_fresh(rt: &Runtime, id: NodeId) {
    let color = rt.nodes.borrow().get(id).map(|n| n.color);
    if !matches!(color, Some(Color::Clean) | None) {
        validate(rt, id);
    }
}
