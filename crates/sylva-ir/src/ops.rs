//! The operation catalog.
//!
//! [`Operation`] is a single closed enum covering every primitive operation in
//! the IR: bit arithmetic and comparison, constants, match/branch control,
//! memory (alloca/load/store/state mux), calls, select, and casts. Dispatch is
//! by `match` on the variant; operation-specific data lives in the payload.
//!
//! Every operation has a full signature -- ordered operand types and ordered
//! result types -- available through [`Operation::arguments`] and
//! [`Operation::results`]. State ports (memory/I-O ordering) are part of the
//! signature: a `Store` with `nstates = 2` consumes and produces two memory
//! states. TAC insertion and RVSDG node creation both check against these
//! signatures.
//!
//! `Operation` derives `Eq` and `Hash`; this is what the common-subexpression
//! index and the operation-equality properties rely on. Float constants store
//! their raw bit pattern (`f64::to_bits`) rather than an `f64` -- floats do
//! not implement `Eq` in Rust, and bit-pattern identity is the right equality
//! for constant pooling anyway.

use serde::{Deserialize, Serialize};

use crate::types::{FloatSize, FunctionType, Type};

/// Binary bit-vector operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitBinaryOp {
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SMod,
    UMod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AShr,
}

/// Bit-vector comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitCompareOp {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

/// Cast kinds between value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastKind {
    Trunc,
    ZExt,
    SExt,
    Bitcast,
    IntToPtr,
    PtrToInt,
}

/// A primitive operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Binary bit arithmetic on two operands of width `width`.
    BitBinary { op: BitBinaryOp, width: u32 },

    /// Bit comparison; produces `bits1`.
    BitCompare { op: BitCompareOp, width: u32 },

    /// Bit-vector constant. `value` holds the low 64 bits.
    BitConstant { width: u32, value: u64 },

    /// Float constant, stored as its bit pattern (see module docs).
    FpConstant { size: FloatSize, bits: u64 },

    /// Control constant selecting `alternative` out of `alternatives`.
    CtlConstant { alternative: u64, alternatives: u32 },

    /// Undefined value of an arbitrary type.
    Undef { ty: Type },

    /// Maps a bit value to a control value: each `(value, alternative)` pair
    /// in `mapping` routes that bit value to the given alternative; anything
    /// else goes to `default`.
    Match {
        nbits: u32,
        mapping: Vec<(u64, u64)>,
        default: u64,
        alternatives: u32,
    },

    /// Basic-block terminator consuming a control value. Only appears in
    /// TACs; in the RVSDG, branching is encoded by region structure.
    Branch { alternatives: u32 },

    /// Copies its single operand to its single result.
    Assignment { ty: Type },

    /// `select(p, t, f)` with a `bits1` predicate.
    Select { ty: Type },

    /// Stack allocation of one `ty`; produces the address and a fresh
    /// memory state.
    Alloca { ty: Type, alignment: u32 },

    /// Load of a `ty` through a pointer, ordered by `nstates` memory states.
    Load {
        ty: Type,
        alignment: u32,
        nstates: u32,
    },

    /// Store of a `ty` through a pointer, ordered by `nstates` memory states.
    Store {
        ty: Type,
        alignment: u32,
        nstates: u32,
    },

    /// Merge/split of memory states: `noperands` in, `nresults` out.
    MemStateMux { noperands: u32, nresults: u32 },

    /// Call through a function value; operands are the callee followed by
    /// the signature's arguments, results are the signature's results.
    Call { fn_type: FunctionType },

    /// Value cast.
    Cast { kind: CastKind, from: Type, to: Type },
}

impl Operation {
    /// Ordered operand types, state ports included.
    pub fn arguments(&self) -> Vec<Type> {
        match self {
            Operation::BitBinary { width, .. } => vec![Type::bits(*width), Type::bits(*width)],
            Operation::BitCompare { width, .. } => vec![Type::bits(*width), Type::bits(*width)],
            Operation::BitConstant { .. }
            | Operation::FpConstant { .. }
            | Operation::CtlConstant { .. }
            | Operation::Undef { .. }
            | Operation::Alloca { .. } => vec![],
            Operation::Match { nbits, .. } => vec![Type::bits(*nbits)],
            Operation::Branch { alternatives } => vec![Type::control(*alternatives)],
            Operation::Assignment { ty } => vec![ty.clone()],
            Operation::Select { ty } => vec![Type::bits(1), ty.clone(), ty.clone()],
            Operation::Load { ty, nstates, .. } => {
                let mut args = vec![Type::pointer(ty.clone())];
                args.extend(std::iter::repeat(Type::MemState).take(*nstates as usize));
                args
            }
            Operation::Store { ty, nstates, .. } => {
                let mut args = vec![Type::pointer(ty.clone()), ty.clone()];
                args.extend(std::iter::repeat(Type::MemState).take(*nstates as usize));
                args
            }
            Operation::MemStateMux { noperands, .. } => {
                std::iter::repeat(Type::MemState).take(*noperands as usize).collect()
            }
            Operation::Call { fn_type } => {
                let mut args = vec![Type::Function(fn_type.clone())];
                args.extend(fn_type.arguments.iter().cloned());
                args
            }
            Operation::Cast { from, .. } => vec![from.clone()],
        }
    }

    /// Ordered result types, state ports included.
    pub fn results(&self) -> Vec<Type> {
        match self {
            Operation::BitBinary { width, .. } => vec![Type::bits(*width)],
            Operation::BitCompare { .. } => vec![Type::bits(1)],
            Operation::BitConstant { width, .. } => vec![Type::bits(*width)],
            Operation::FpConstant { size, .. } => vec![Type::Float { size: *size }],
            Operation::CtlConstant { alternatives, .. } => vec![Type::control(*alternatives)],
            Operation::Undef { ty } => vec![ty.clone()],
            Operation::Match { alternatives, .. } => vec![Type::control(*alternatives)],
            Operation::Branch { .. } => vec![],
            Operation::Assignment { ty } => vec![ty.clone()],
            Operation::Select { ty } => vec![ty.clone()],
            Operation::Alloca { ty, .. } => vec![Type::pointer(ty.clone()), Type::MemState],
            Operation::Load { ty, nstates, .. } => {
                let mut res = vec![ty.clone()];
                res.extend(std::iter::repeat(Type::MemState).take(*nstates as usize));
                res
            }
            Operation::Store { nstates, .. } => {
                std::iter::repeat(Type::MemState).take(*nstates as usize).collect()
            }
            Operation::MemStateMux { nresults, .. } => {
                std::iter::repeat(Type::MemState).take(*nresults as usize).collect()
            }
            Operation::Call { fn_type } => fn_type.results.clone(),
            Operation::Cast { to, .. } => vec![to.clone()],
        }
    }

    pub fn narguments(&self) -> usize {
        self.arguments().len()
    }

    pub fn nresults(&self) -> usize {
        self.results().len()
    }

    /// Returns `true` if this op terminates a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Operation::Branch { .. })
    }

    /// Returns `true` for operations whose results are pure functions of
    /// their operands (no memory or I/O state ports).
    pub fn is_pure(&self) -> bool {
        !matches!(
            self,
            Operation::Alloca { .. }
                | Operation::Load { .. }
                | Operation::Store { .. }
                | Operation::MemStateMux { .. }
                | Operation::Call { .. }
        )
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Operation::Store { .. })
    }

    pub fn is_load(&self) -> bool {
        matches!(self, Operation::Load { .. })
    }

    pub fn is_alloca(&self) -> bool {
        matches!(self, Operation::Alloca { .. })
    }

    pub fn is_mem_state_mux(&self) -> bool {
        matches!(self, Operation::MemStateMux { .. })
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Operation::Call { .. })
    }

    /// Short human-readable tag used by the debug emitters.
    pub fn debug_string(&self) -> String {
        match self {
            Operation::BitBinary { op, width } => format!("{:?}{}", op, width).to_lowercase(),
            Operation::BitCompare { op, width } => format!("{:?}{}", op, width).to_lowercase(),
            Operation::BitConstant { width, value } => format!("const{}({})", width, value),
            Operation::FpConstant { bits, .. } => format!("fpconst({})", f64::from_bits(*bits)),
            Operation::CtlConstant { alternative, alternatives } => {
                format!("ctl({}/{})", alternative, alternatives)
            }
            Operation::Undef { .. } => "undef".to_string(),
            Operation::Match { .. } => "match".to_string(),
            Operation::Branch { .. } => "branch".to_string(),
            Operation::Assignment { .. } => "assign".to_string(),
            Operation::Select { .. } => "select".to_string(),
            Operation::Alloca { .. } => "alloca".to_string(),
            Operation::Load { .. } => "load".to_string(),
            Operation::Store { .. } => "store".to_string(),
            Operation::MemStateMux { .. } => "mem_mux".to_string(),
            Operation::Call { .. } => "call".to_string(),
            Operation::Cast { kind, .. } => format!("{:?}", kind).to_lowercase(),
        }
    }
}

/// Shorthand constructors used throughout the transformation and test code.
impl Operation {
    pub fn bitadd(width: u32) -> Self {
        Operation::BitBinary { op: BitBinaryOp::Add, width }
    }

    pub fn biteq(width: u32) -> Self {
        Operation::BitCompare { op: BitCompareOp::Eq, width }
    }

    pub fn bitconst(width: u32, value: u64) -> Self {
        Operation::BitConstant { width, value }
    }

    /// A match over `bits(nbits)` with one alternative per value `0..n`.
    pub fn switch(nbits: u32, alternatives: u32) -> Self {
        Operation::Match {
            nbits,
            mapping: (0..alternatives as u64 - 1).map(|v| (v, v)).collect(),
            default: alternatives as u64 - 1,
            alternatives,
        }
    }

    pub fn store(ty: Type, alignment: u32, nstates: u32) -> Self {
        Operation::Store { ty, alignment, nstates }
    }

    pub fn load(ty: Type, alignment: u32, nstates: u32) -> Self {
        Operation::Load { ty, alignment, nstates }
    }
}
