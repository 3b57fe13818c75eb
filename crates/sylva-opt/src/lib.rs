pub mod cse;
pub mod dne;
pub mod inline;
pub mod inversion;
pub mod pass;
pub mod points_to;
pub mod reduction;

// Re-export commonly used types
pub use cse::{common_subexpression_elimination, CommonSubexpressionElimination};
pub use dne::{dead_node_elimination, DeadNodeElimination};
pub use inline::{
    compute_call_summary, find_producer, inline_call, inlining, route_to_region, CallSummary,
    FunctionInlining,
};
pub use inversion::{invert, invert_theta, ThetaGammaInversion};
pub use pass::{
    run_pipeline, Normalization, Pass, PassId, PassStatistics, StatisticsCollector,
};
pub use points_to::{PointsToError, PointsToGraph, PtgNodeId, PtgNodeKind};
pub use reduction::{reduce, Reduction, ReductionFlags};
