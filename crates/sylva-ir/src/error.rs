//! Error types for the symbolic IR.
//!
//! Only recoverable failures (lookups on absent keys, duplicate symbols) are
//! represented here. Structural invariant violations -- type mismatches at TAC
//! insertion, removing a CFG node that still has in-edges -- are programmer
//! errors and panic instead of propagating.

use thiserror::Error;

use crate::variable::GlobalId;

/// Recoverable errors produced by the sylva-ir crate.
#[derive(Debug, Error)]
pub enum IrError {
    /// A symbol name already exists in the ip-graph.
    #[error("duplicate symbol: '{name}'")]
    DuplicateSymbol { name: String },

    /// An ip-graph lookup on an absent symbol.
    #[error("unknown symbol: '{name}'")]
    UnknownSymbol { name: String },

    /// A global variable id was not found in the module.
    #[error("global not found: GlobalId({id})", id = id.0)]
    GlobalNotFound { id: GlobalId },

    /// An ip-node of the wrong kind was found (data where a function was
    /// expected, or vice versa).
    #[error("symbol '{name}' is not a {expected}")]
    WrongNodeKind { name: String, expected: &'static str },
}
