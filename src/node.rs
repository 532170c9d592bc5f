//! The node arena: every cell, derivation and observer is a [`Node`] keyed by a [`NodeId`].

use std::any::Any;
use std::panic::Location;

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::scope::ScopeId;

new_key_type! {
    pub struct NodeId;
}

/// The three-color dirty mark used by the coloring engine (`crate::color`).
///
/// Cells only ever occupy [`Color::Clean`] or [`Color::Dirty`]; `Check` is meaningful only
/// for derivations and observers, which have sources whose freshness must be validated
/// before the node's own state can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Clean,
    Check,
    Dirty,
}

/// A back-pointer edge endpoint stored on the *source* side, recording where to find the
/// matching entry in the dependent's `sources` array.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ObserverSlot {
    pub id: NodeId,
    /// Index of the matching [`SourceSlot`] inside `id`'s `sources` array.
    pub back_index: usize,
}

/// A back-pointer edge endpoint stored on the *dependent* side, recording where to find the
/// matching entry in the source's `observers` array.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SourceSlot {
    pub id: NodeId,
    /// Index of the matching [`ObserverSlot`] inside `id`'s `observers` array.
    pub back_index: usize,
}

pub(crate) enum NodeKind {
    Cell(CellData),
    Derivation(DerivData),
    Observer(ObsData),
}

pub(crate) struct CellData {
    pub value: Box<dyn Any>,
    pub eq: Box<dyn Fn(&dyn Any, &dyn Any) -> bool>,
}

pub(crate) struct DerivData {
    pub value: Option<Box<dyn Any>>,
    pub compute: Box<dyn FnMut() -> Box<dyn Any>>,
    pub eq: Box<dyn Fn(&dyn Any, &dyn Any) -> bool>,
}

pub(crate) struct ObsData {
    pub callback: Box<dyn FnMut()>,
}

/// One entry in the reactive graph's arena.
///
/// Grouping `value`/`compute`/`callback` behind [`NodeKind`] instead of laying them out as
/// always-present optional fields on one struct keeps a cell from paying for a compute
/// closure it never has, and keeps "is this a cell" a match arm instead of a field full of
/// `None`s.
pub(crate) struct Node {
    pub kind: NodeKind,
    pub color: Color,
    /// Dependents: nodes that read this one while it was the active listener.
    pub observers: SmallVec<[ObserverSlot; 2]>,
    /// Dependencies: nodes this one read during its last evaluation.
    pub sources: SmallVec<[SourceSlot; 2]>,
    pub owner: Option<ScopeId>,
    /// Disposed and recreated before each re-run so `on_cleanup` callbacks registered during
    /// one run don't leak into the next (see `crate::evaluator`).
    pub body_scope: Option<ScopeId>,
    pub has_run: bool,
    #[cfg(debug_assertions)]
    pub creation_loc: Location<'static>,
}

impl Node {
    #[cfg(debug_assertions)]
    pub fn new(kind: NodeKind, owner: Option<ScopeId>, loc: Location<'static>) -> Self {
        Node {
            kind,
            color: Color::Dirty,
            observers: SmallVec::new(),
            sources: SmallVec::new(),
            owner,
            body_scope: None,
            has_run: false,
            creation_loc: loc,
        }
    }

    #[cfg(not(debug_assertions))]
    pub fn new(kind: NodeKind, owner: Option<ScopeId>) -> Self {
        Node {
            kind,
            color: Color::Dirty,
            observers: SmallVec::new(),
            sources: SmallVec::new(),
            owner,
            body_scope: None,
            has_run: false,
        }
    }
}

pub(crate) type NodeArena = SlotMap<NodeId, Node>;

/// Returns the source location the node was created at, for diagnostics. Always `None` in
/// release builds.
pub(crate) fn creation_loc(nodes: &NodeArena, id: NodeId) -> Option<Location<'static>> {
    #[cfg(debug_assertions)]
    {
        nodes.get(id).map(|n| n.creation_loc)
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = (nodes, id);
        None
    }
}

/// Links `source` as a dependency of `observer`, unless the edge already exists.
///
/// Idempotent per the edge contract: re-reading the same source twice within one evaluation
/// must not create a duplicate edge.
pub(crate) fn link(nodes: &mut NodeArena, source: NodeId, observer: NodeId) {
    if nodes[observer].sources.iter().any(|s| s.id == source) {
        return;
    }
    let obs_idx = nodes[observer].sources.len();
    let src_idx = nodes[source].observers.len();
    nodes[source].observers.push(ObserverSlot {
        id: observer,
        back_index: obs_idx,
    });
    nodes[observer].sources.push(SourceSlot {
        id: source,
        back_index: src_idx,
    });
}

/// Removes the `observers` entry at `idx` on `source`, patching whichever edge got swapped
/// into that slot so its own back-pointer stays correct. O(1).
fn remove_observer_slot(nodes: &mut NodeArena, source: NodeId, idx: usize) {
    let moved = match nodes.get_mut(source) {
        Some(node) => {
            node.observers.swap_remove(idx);
            node.observers.get(idx).map(|s| (s.id, s.back_index))
        }
        None => return,
    };
    if let Some((moved_observer, moved_back_index)) = moved {
        if let Some(moved_node) = nodes.get_mut(moved_observer) {
            if let Some(slot) = moved_node.sources.get_mut(moved_back_index) {
                slot.back_index = idx;
            }
        }
    }
}

/// Removes every dependency edge belonging to `observer`, patching the surviving edges on
/// each former source. Called before every re-evaluation and at disposal.
pub(crate) fn unlink_all(nodes: &mut NodeArena, observer: NodeId) {
    loop {
        let slot = match nodes.get_mut(observer) {
            Some(node) => node.sources.pop(),
            None => return,
        };
        let Some(SourceSlot { id: source, back_index }) = slot else {
            break;
        };
        remove_observer_slot(nodes, source, back_index);
    }
}

/// The mirror of [`remove_observer_slot`]: removes the `sources` entry at `idx` on
/// `dependent`, patching whichever edge got swapped into that slot.
fn remove_source_slot(nodes: &mut NodeArena, dependent: NodeId, idx: usize) {
    let moved = match nodes.get_mut(dependent) {
        Some(node) => {
            node.sources.swap_remove(idx);
            node.sources.get(idx).map(|s| (s.id, s.back_index))
        }
        None => return,
    };
    if let Some((moved_source, moved_back_index)) = moved {
        if let Some(moved_node) = nodes.get_mut(moved_source) {
            if let Some(slot) = moved_node.observers.get_mut(moved_back_index) {
                slot.back_index = idx;
            }
        }
    }
}

/// Fully detaches `id` from the graph in both directions: edges where `id` is a dependent
/// (its `sources`) and edges where `id` is a dependency (its `observers`). Used when a node
/// is disposed, so a dangling id can never survive in a peer's edge list.
pub(crate) fn disconnect_all(nodes: &mut NodeArena, id: NodeId) {
    unlink_all(nodes, id);
    loop {
        let slot = match nodes.get_mut(id) {
            Some(node) => node.observers.pop(),
            None => return,
        };
        let Some(ObserverSlot { id: dependent, back_index }) = slot else {
            break;
        };
        remove_source_slot(nodes, dependent, back_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk(nodes: &mut NodeArena) -> NodeId {
        #[cfg(debug_assertions)]
        let node = Node::new(
            NodeKind::Observer(ObsData {
                callback: Box::new(|| {}),
            }),
            None,
            *Location::caller(),
        );
        #[cfg(not(debug_assertions))]
        let node = Node::new(
            NodeKind::Observer(ObsData {
                callback: Box::new(|| {}),
            }),
            None,
        );
        nodes.insert(node)
    }

    #[test]
    fn link_then_unlink_all_restores_empty_edges() {
        let mut nodes: NodeArena = SlotMap::with_key();
        let a = mk(&mut nodes);
        let b = mk(&mut nodes);
        let c = mk(&mut nodes);
        link(&mut nodes, a, c);
        link(&mut nodes, b, c);
        assert_eq!(nodes[c].sources.len(), 2);
        assert_eq!(nodes[a].observers.len(), 1);
        assert_eq!(nodes[b].observers.len(), 1);

        unlink_all(&mut nodes, c);
        assert!(nodes[c].sources.is_empty());
        assert!(nodes[a].observers.is_empty());
        assert!(nodes[b].observers.is_empty());
    }

    #[test]
    fn link_is_idempotent() {
        let mut nodes: NodeArena = SlotMap::with_key();
        let a = mk(&mut nodes);
        let c = mk(&mut nodes);
        link(&mut nodes, a, c);
        link(&mut nodes, a, c);
        assert_eq!(nodes[c].sources.len(), 1);
        assert_eq!(nodes[a].observers.len(), 1);
    }

    #[test]
    fn shared_source_keeps_both_observers_after_one_unlinks() {
        let mut nodes: NodeArena = SlotMap::with_key();
        let a = mk(&mut nodes);
        let d1 = mk(&mut nodes);
        let d2 = mk(&mut nodes);
        link(&mut nodes, a, d1);
        link(&mut nodes, a, d2);
        assert_eq!(nodes[a].observers.len(), 2);

        unlink_all(&mut nodes, d1);
        assert!(nodes[d1].sources.is_empty());
        assert_eq!(nodes[a].observers.len(), 1);
        assert_eq!(nodes[a].observers[0].id, d2);
        // d2's back-pointer into a.observers must still resolve correctly after the shift.
        let back = nodes[a].observers[0].back_index;
        assert_eq!(nodes[d2].sources[back].id, a);
    }
}
