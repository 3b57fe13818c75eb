pub mod construct;
pub mod destruct;
pub mod restructure;

// Re-export commonly used entry points
pub use construct::construct;
pub use destruct::destruct;
pub use restructure::{back_edges, restructure, restructure_branches, restructure_loops};
