//! Variables and linkage.
//!
//! Variables are typed, named slots referenced by TAC operands and results.
//! They come in three kinds: CFG-local SSA values, function arguments, and
//! module-level globals. Locals and arguments are arena-allocated per CFG
//! ([`VarId`]); globals per module ([`GlobalId`]). A [`Var`] operand names one
//! or the other -- locals never cross CFG boundaries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Type;

/// Index of a CFG-local variable (SSA value or function argument).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarId(pub u32);

/// Index of a module-level global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalId(pub u32);

/// A TAC operand or result: either CFG-local or module-global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Var {
    Local(VarId),
    Global(GlobalId),
}

/// Linkage categories for globals and functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Linkage {
    External,
    Internal,
    Weak,
    LinkOnce,
    Appending,
    Common,
    Private,
}

/// What a variable binds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarKind {
    /// CFG-local SSA value.
    Local,
    /// Function argument at the given position.
    Argument { index: u32 },
    /// Module-level symbol.
    Global { linkage: Linkage },
}

/// A typed, named variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub kind: VarKind,
}

impl Variable {
    pub fn local(name: impl Into<String>, ty: Type) -> Self {
        Variable { name: name.into(), ty, kind: VarKind::Local }
    }

    pub fn argument(name: impl Into<String>, ty: Type, index: u32) -> Self {
        Variable { name: name.into(), ty, kind: VarKind::Argument { index } }
    }

    pub fn global(name: impl Into<String>, ty: Type, linkage: Linkage) -> Self {
        Variable { name: name.into(), ty, kind: VarKind::Global { linkage } }
    }

    pub fn is_global(&self) -> bool {
        matches!(self.kind, VarKind::Global { .. })
    }
}

/// The module-level arena of global variables.
///
/// TAC checking in any CFG needs to resolve `Var::Global` operands, so the
/// arena is passed by reference into the appending methods.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Globals {
    vars: Vec<Variable>,
}

impl Globals {
    pub fn new() -> Self {
        Globals::default()
    }

    /// Registers a global variable. The caller (the module builder) is
    /// responsible for keeping names unique.
    pub fn create(&mut self, var: Variable) -> GlobalId {
        debug_assert!(var.is_global());
        let id = GlobalId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    pub fn get(&self, id: GlobalId) -> Option<&Variable> {
        self.vars.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GlobalId, &Variable)> {
        self.vars.iter().enumerate().map(|(n, v)| (GlobalId(n as u32), v))
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Local(id) => write!(f, "%{}", id.0),
            Var::Global(id) => write!(f, "@{}", id.0),
        }
    }
}
