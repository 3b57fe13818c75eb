pub mod graph;
pub mod node;
pub mod normal_forms;
pub mod notifier;
pub mod subst;
pub mod traverser;
pub mod view;

// Re-export commonly used types
pub use graph::{Graph, NodeId, NodeKind, Origin, RegionId, User};
pub use node::{
    delta_output, gamma_add_entryvar, gamma_add_exitvar, gamma_entryvar_argument,
    gamma_entryvar_origin, gamma_exitvar_result_origin, gamma_nentryvars,
    gamma_predicate_origin, gamma_predicate_user, lambda_add_ctxvar, lambda_ctxvar_argument,
    lambda_fn_argument, lambda_fn_type, lambda_name, lambda_nctxvars, lambda_nfnargs,
    lambda_output, phi_add_ctxvar, phi_nrecvars, phi_recvar_argument,
    structural_argument_input, theta_add_loopvar, theta_loopvar, theta_loopvars,
    theta_nloopvars, theta_predicate_origin, theta_set_predicate, DeltaBuilder, GammaBuilder,
    LambdaBuilder, LoopVar, PhiBuilder, ThetaBuilder,
};
pub use normal_forms::{
    create_load, create_mux, create_store, normalize, normalize_node, LoadNormalForm,
    MuxNormalForm, NormalForms, StoreNormalForm,
};
pub use notifier::{GraphEvent, Subscriber};
pub use subst::SubstitutionMap;
pub use traverser::{BottomUpTraverser, TopDownTraverser};
pub use view::{region_tree, view_dot, view_text, view_xml};
