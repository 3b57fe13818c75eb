pub mod cfg;
pub mod cfg_structure;
pub mod error;
pub mod ipgraph;
pub mod module;
pub mod ops;
pub mod tac;
pub mod types;
pub mod variable;

// Re-export commonly used types
pub use cfg::{BasicBlock, Cfg, CfgEdge, CfgNode, CfgNodeId};
pub use error::IrError;
pub use ipgraph::{DataNode, FunctionNode, IpGraph, IpNode};
pub use module::Module;
pub use ops::{BitBinaryOp, BitCompareOp, CastKind, Operation};
pub use tac::{Tac, TacSeq};
pub use types::{FloatSize, FunctionType, Type};
pub use variable::{GlobalId, Globals, Linkage, Var, VarId, VarKind, Variable};
