//! A fine-grained reactive graph: cells, derivations, observers and the ownership scopes
//! that dispose them.
//!
//! Reads and writes go through [`Cell`] and [`Derivation`] handles; [`observer`] subscribes a
//! side-effecting callback to whatever it reads. Writes are lazy for derivations (recomputed
//! only when next read) and batched for observers (queued, then drained once the outermost
//! write or [`batch`] call returns). [`create_root`] opens a reactive context; every cell,
//! derivation, observer and child scope created while it runs is torn down together when the
//! root is disposed.

#![warn(missing_docs)]

mod batch;
mod cell;
mod color;
mod context;
mod derivation;
mod error;
mod evaluator;
mod node;
mod observer;
mod runtime;
mod scope;

pub use batch::{batch, untrack};
pub use cell::{cell, cell_with_eq, Cell};
pub use context::{provide_context, scope_depth, try_use_context, use_context, with_context};
pub use derivation::{derivation, derivation_with_eq, Derivation};
pub use error::{set_error_sink, ErrorSink, ReactiveError};
pub use observer::{observer, Disposer};
pub use scope::{create_child_scope, create_root, current_scope, on_cleanup, RootHandle, ScopeHandle};
