//! Structural node construction and port conventions.
//!
//! Each structural kind fixes a correspondence between the node's inputs and
//! outputs and its subregions' arguments and results:
//!
//! - **Gamma**: input 0 is the predicate (`ctl[n]` for n subregions). Entry
//!   variable k is input k+1 and argument k of every subregion. Exit
//!   variable j is output j and result j of every subregion.
//! - **Theta**: loop variable i is input i, argument i, result i+1, and
//!   output i of the single subregion; result 0 is the `ctl2` predicate.
//! - **Lambda**: the subregion's leading arguments are the function
//!   arguments; context variable k is input k and argument `nfnargs + k`.
//!   The single output is the function value.
//! - **Phi**: recursion variable r is argument r, result r, and output r;
//!   context variable k is input k and argument `nrecvars + k`. Recursion
//!   variables must all be added before the first context variable.
//! - **Delta**: context variable k is input k and argument k; result 0 is
//!   the initializer, the single output the global's address.
//!
//! Builders enforce the conventions during construction; the free accessor
//! functions expose them for existing nodes.

use sylva_ir::{FunctionType, Linkage, Operation, Type};

use crate::graph::{Graph, NodeId, NodeKind, Origin, RegionId, User};

// ---------------------------------------------------------------------------
// Gamma
// ---------------------------------------------------------------------------

/// Builds a gamma node: n-way branch with join.
pub struct GammaBuilder {
    node: NodeId,
}

impl GammaBuilder {
    /// The predicate must be a control value whose arity equals
    /// `nsubregions`.
    pub fn new(graph: &mut Graph, predicate: Origin, nsubregions: usize) -> Self {
        assert!(nsubregions >= 2, "a gamma needs at least two subregions");
        assert_eq!(
            graph.origin_type(predicate),
            &Type::control(nsubregions as u32),
            "gamma predicate arity must match the subregion count"
        );
        let region = graph.origin_region(predicate);
        let node =
            graph.add_structural_node(region, NodeKind::Gamma, &[predicate], &[], nsubregions);
        GammaBuilder { node }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Routes a value into every subregion; returns one argument per
    /// subregion.
    pub fn add_entryvar(&self, graph: &mut Graph, origin: Origin) -> Vec<Origin> {
        gamma_add_entryvar(graph, self.node, origin)
    }

    /// Merges one value per subregion into a gamma output.
    pub fn add_exitvar(&self, graph: &mut Graph, origins: &[Origin]) -> Origin {
        gamma_add_exitvar(graph, self.node, origins)
    }
}

pub fn gamma_predicate_origin(graph: &Graph, node: NodeId) -> Origin {
    debug_assert_eq!(graph.node_kind(node), &NodeKind::Gamma);
    graph.input_origin(node, 0)
}

/// The predicate input itself, as a user.
pub fn gamma_predicate_user(node: NodeId) -> User {
    User::Input { node, index: 0 }
}

pub fn gamma_nentryvars(graph: &Graph, node: NodeId) -> usize {
    graph.ninputs(node) - 1
}

/// The origin routed into entry variable `k`.
pub fn gamma_entryvar_origin(graph: &Graph, node: NodeId, k: usize) -> Origin {
    graph.input_origin(node, k + 1)
}

/// Entry variable `k`'s argument in subregion `r`.
pub fn gamma_entryvar_argument(graph: &Graph, node: NodeId, k: usize, r: usize) -> Origin {
    debug_assert!(k < gamma_nentryvars(graph, node));
    Origin::Argument { region: graph.subregion(node, r), index: k }
}

pub fn gamma_add_entryvar(graph: &mut Graph, node: NodeId, origin: Origin) -> Vec<Origin> {
    assert_eq!(graph.node_kind(node), &NodeKind::Gamma);
    let ty = graph.origin_type(origin).clone();
    graph.add_input(node, origin);
    (0..graph.nsubregions(node))
        .map(|r| {
            let sub = graph.subregion(node, r);
            graph.add_argument(sub, ty.clone(), None)
        })
        .collect()
}

/// Exit variable `j`'s per-subregion result origin.
pub fn gamma_exitvar_result_origin(graph: &Graph, node: NodeId, j: usize, r: usize) -> Origin {
    graph.result_origin(graph.subregion(node, r), j)
}

pub fn gamma_add_exitvar(graph: &mut Graph, node: NodeId, origins: &[Origin]) -> Origin {
    assert_eq!(graph.node_kind(node), &NodeKind::Gamma);
    assert_eq!(origins.len(), graph.nsubregions(node), "one exit origin per subregion");
    let ty = graph.origin_type(origins[0]).clone();
    for (r, &origin) in origins.iter().enumerate() {
        assert_eq!(graph.origin_type(origin), &ty, "exit variable types must agree");
        let sub = graph.subregion(node, r);
        graph.add_result(sub, origin, None);
    }
    graph.add_output(node, ty)
}

// ---------------------------------------------------------------------------
// Theta
// ---------------------------------------------------------------------------

/// One theta loop variable: matched input/argument/result/output quadruple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopVar {
    pub node: NodeId,
    pub index: usize,
}

impl LoopVar {
    pub fn input(&self) -> User {
        User::Input { node: self.node, index: self.index }
    }

    pub fn argument(&self, graph: &Graph) -> Origin {
        Origin::Argument { region: graph.subregion(self.node, 0), index: self.index }
    }

    /// The result slot feeding the next iteration (slot 0 is the predicate).
    pub fn result(&self, graph: &Graph) -> User {
        User::Result { region: graph.subregion(self.node, 0), index: self.index + 1 }
    }

    pub fn result_origin(&self, graph: &Graph) -> Origin {
        graph.result_origin(graph.subregion(self.node, 0), self.index + 1)
    }

    pub fn output(&self) -> Origin {
        Origin::Output { node: self.node, index: self.index }
    }

    pub fn init_origin(&self, graph: &Graph) -> Origin {
        graph.input_origin(self.node, self.index)
    }
}

/// Builds a theta node: tail-controlled loop.
pub struct ThetaBuilder {
    node: NodeId,
    placeholder: NodeId,
}

impl ThetaBuilder {
    pub fn new(graph: &mut Graph, region: RegionId) -> Self {
        let node = graph.add_structural_node(region, NodeKind::Theta, &[], &[], 1);
        let sub = graph.subregion(node, 0);
        // Result 0 is the predicate; a placeholder keeps the slot stable
        // until the body is built.
        let placeholder = graph.add_simple_node(
            sub,
            Operation::CtlConstant { alternative: 0, alternatives: 2 },
            &[],
        );
        graph.add_result(sub, Origin::Output { node: placeholder, index: 0 }, None);
        ThetaBuilder { node, placeholder }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn subregion(&self, graph: &Graph) -> RegionId {
        graph.subregion(self.node, 0)
    }

    pub fn add_loopvar(&self, graph: &mut Graph, init: Origin) -> LoopVar {
        theta_add_loopvar(graph, self.node, init)
    }

    /// Installs the predicate and drops the placeholder.
    pub fn finish(self, graph: &mut Graph, predicate: Origin) -> NodeId {
        let sub = graph.subregion(self.node, 0);
        graph.divert(User::Result { region: sub, index: 0 }, predicate);
        if graph.is_unused(self.placeholder) {
            graph.remove_node(self.placeholder);
        }
        self.node
    }
}

pub fn theta_nloopvars(graph: &Graph, node: NodeId) -> usize {
    debug_assert_eq!(graph.node_kind(node), &NodeKind::Theta);
    graph.ninputs(node)
}

pub fn theta_loopvar(graph: &Graph, node: NodeId, index: usize) -> LoopVar {
    debug_assert!(index < theta_nloopvars(graph, node));
    LoopVar { node, index }
}

pub fn theta_loopvars(graph: &Graph, node: NodeId) -> Vec<LoopVar> {
    (0..theta_nloopvars(graph, node)).map(|index| LoopVar { node, index }).collect()
}

/// Adds a loop variable with an identity body: the result reads the
/// argument until the builder of the loop body retargets it.
pub fn theta_add_loopvar(graph: &mut Graph, node: NodeId, init: Origin) -> LoopVar {
    assert_eq!(graph.node_kind(node), &NodeKind::Theta);
    let ty = graph.origin_type(init).clone();
    let sub = graph.subregion(node, 0);
    let index = graph.add_input(node, init);
    let argument = graph.add_argument(sub, ty.clone(), None);
    graph.add_result(sub, argument, None);
    graph.add_output(node, ty);
    LoopVar { node, index }
}

pub fn theta_predicate_origin(graph: &Graph, node: NodeId) -> Origin {
    debug_assert_eq!(graph.node_kind(node), &NodeKind::Theta);
    graph.result_origin(graph.subregion(node, 0), 0)
}

pub fn theta_set_predicate(graph: &mut Graph, node: NodeId, predicate: Origin) {
    let sub = graph.subregion(node, 0);
    graph.divert(User::Result { region: sub, index: 0 }, predicate);
}

// ---------------------------------------------------------------------------
// Lambda
// ---------------------------------------------------------------------------

/// Builds a lambda node: a function binder.
pub struct LambdaBuilder {
    node: NodeId,
}

impl LambdaBuilder {
    pub fn new(
        graph: &mut Graph,
        region: RegionId,
        name: impl Into<String>,
        fn_type: FunctionType,
        linkage: Linkage,
    ) -> Self {
        let kind = NodeKind::Lambda { name: name.into(), fn_type: fn_type.clone(), linkage };
        let output = Type::Function(fn_type.clone());
        let node = graph.add_structural_node(region, kind, &[], &[output], 1);
        let sub = graph.subregion(node, 0);
        for ty in &fn_type.arguments {
            graph.add_argument(sub, ty.clone(), None);
        }
        LambdaBuilder { node }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn subregion(&self, graph: &Graph) -> RegionId {
        graph.subregion(self.node, 0)
    }

    pub fn fn_argument(&self, graph: &Graph, index: usize) -> Origin {
        lambda_fn_argument(graph, self.node, index)
    }

    pub fn add_ctxvar(&self, graph: &mut Graph, origin: Origin) -> Origin {
        lambda_add_ctxvar(graph, self.node, origin)
    }

    /// Installs the function results; their types must match the signature.
    pub fn finish(self, graph: &mut Graph, results: &[Origin]) -> NodeId {
        let fn_type = lambda_fn_type(graph, self.node).clone();
        assert_eq!(results.len(), fn_type.results.len(), "result arity mismatch");
        let sub = graph.subregion(self.node, 0);
        for (origin, ty) in results.iter().zip(&fn_type.results) {
            assert_eq!(graph.origin_type(*origin), ty, "result type mismatch");
            graph.add_result(sub, *origin, None);
        }
        self.node
    }
}

pub fn lambda_fn_type<'g>(graph: &'g Graph, node: NodeId) -> &'g FunctionType {
    match graph.node_kind(node) {
        NodeKind::Lambda { fn_type, .. } => fn_type,
        _ => panic!("not a lambda node"),
    }
}

pub fn lambda_name<'g>(graph: &'g Graph, node: NodeId) -> &'g str {
    match graph.node_kind(node) {
        NodeKind::Lambda { name, .. } => name,
        _ => panic!("not a lambda node"),
    }
}

pub fn lambda_nfnargs(graph: &Graph, node: NodeId) -> usize {
    lambda_fn_type(graph, node).arguments.len()
}

pub fn lambda_fn_argument(graph: &Graph, node: NodeId, index: usize) -> Origin {
    debug_assert!(index < lambda_nfnargs(graph, node));
    Origin::Argument { region: graph.subregion(node, 0), index }
}

pub fn lambda_nctxvars(graph: &Graph, node: NodeId) -> usize {
    graph.ninputs(node)
}

/// Context variable `k`'s argument inside the lambda body.
pub fn lambda_ctxvar_argument(graph: &Graph, node: NodeId, k: usize) -> Origin {
    Origin::Argument { region: graph.subregion(node, 0), index: lambda_nfnargs(graph, node) + k }
}

pub fn lambda_add_ctxvar(graph: &mut Graph, node: NodeId, origin: Origin) -> Origin {
    assert!(matches!(graph.node_kind(node), NodeKind::Lambda { .. }));
    let ty = graph.origin_type(origin).clone();
    graph.add_input(node, origin);
    let sub = graph.subregion(node, 0);
    graph.add_argument(sub, ty, None)
}

/// The lambda's function value.
pub fn lambda_output(node: NodeId) -> Origin {
    Origin::Output { node, index: 0 }
}

// ---------------------------------------------------------------------------
// Phi
// ---------------------------------------------------------------------------

/// Builds a phi node: a mutually recursive binding group.
pub struct PhiBuilder {
    node: NodeId,
}

impl PhiBuilder {
    pub fn new(graph: &mut Graph, region: RegionId) -> Self {
        let node = graph.add_structural_node(region, NodeKind::Phi, &[], &[], 1);
        PhiBuilder { node }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn subregion(&self, graph: &Graph) -> RegionId {
        graph.subregion(self.node, 0)
    }

    /// Declares a recursion variable of the given type; returns its
    /// argument (visible inside the subregion) and its output.
    pub fn add_recvar(&self, graph: &mut Graph, ty: Type) -> (Origin, Origin) {
        assert_eq!(
            graph.ninputs(self.node),
            0,
            "recursion variables must precede context variables"
        );
        let sub = graph.subregion(self.node, 0);
        let argument = graph.add_argument(sub, ty.clone(), None);
        let output = graph.add_output(self.node, ty);
        (argument, output)
    }

    pub fn add_ctxvar(&self, graph: &mut Graph, origin: Origin) -> Origin {
        phi_add_ctxvar(graph, self.node, origin)
    }

    /// Installs the definition of each recursion variable, in declaration
    /// order.
    pub fn finish(self, graph: &mut Graph, definitions: &[Origin]) -> NodeId {
        assert_eq!(definitions.len(), graph.noutputs(self.node), "one definition per recvar");
        let sub = graph.subregion(self.node, 0);
        for (r, &origin) in definitions.iter().enumerate() {
            assert_eq!(
                graph.origin_type(origin),
                graph.output_type(self.node, r),
                "recursion variable definition type mismatch"
            );
            graph.add_result(sub, origin, None);
        }
        self.node
    }
}

pub fn phi_nrecvars(graph: &Graph, node: NodeId) -> usize {
    debug_assert_eq!(graph.node_kind(node), &NodeKind::Phi);
    graph.noutputs(node)
}

pub fn phi_recvar_argument(graph: &Graph, node: NodeId, r: usize) -> Origin {
    debug_assert!(r < phi_nrecvars(graph, node));
    Origin::Argument { region: graph.subregion(node, 0), index: r }
}

pub fn phi_add_ctxvar(graph: &mut Graph, node: NodeId, origin: Origin) -> Origin {
    assert_eq!(graph.node_kind(node), &NodeKind::Phi);
    let ty = graph.origin_type(origin).clone();
    graph.add_input(node, origin);
    let sub = graph.subregion(node, 0);
    graph.add_argument(sub, ty, None)
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// Builds a delta node: a global data binder.
pub struct DeltaBuilder {
    node: NodeId,
    ty: Type,
}

impl DeltaBuilder {
    pub fn new(
        graph: &mut Graph,
        region: RegionId,
        name: impl Into<String>,
        ty: Type,
        linkage: Linkage,
        constant: bool,
    ) -> Self {
        let kind = NodeKind::Delta { name: name.into(), linkage, constant };
        let output = Type::pointer(ty.clone());
        let node = graph.add_structural_node(region, kind, &[], &[output], 1);
        DeltaBuilder { node, ty }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn subregion(&self, graph: &Graph) -> RegionId {
        graph.subregion(self.node, 0)
    }

    pub fn add_ctxvar(&self, graph: &mut Graph, origin: Origin) -> Origin {
        let ty = graph.origin_type(origin).clone();
        graph.add_input(self.node, origin);
        let sub = graph.subregion(self.node, 0);
        graph.add_argument(sub, ty, None)
    }

    pub fn finish(self, graph: &mut Graph, init: Origin) -> NodeId {
        assert_eq!(graph.origin_type(init), &self.ty, "initializer type mismatch");
        let sub = graph.subregion(self.node, 0);
        graph.add_result(sub, init, None);
        self.node
    }
}

/// The global's address value.
pub fn delta_output(node: NodeId) -> Origin {
    Origin::Output { node, index: 0 }
}

// ---------------------------------------------------------------------------
// Structural routing support
// ---------------------------------------------------------------------------

/// Which owner-node input feeds the given region argument, if any.
///
/// Lambda function arguments and phi recursion variables are bound inside
/// the node and have no feeding input; so do root-region arguments
/// (imports).
pub fn structural_argument_input(
    graph: &Graph,
    region: RegionId,
    index: usize,
) -> Option<(NodeId, usize)> {
    let owner = graph.region_owner(region)?;
    match graph.node_kind(owner) {
        NodeKind::Gamma => Some((owner, index + 1)),
        NodeKind::Theta => Some((owner, index)),
        NodeKind::Lambda { fn_type, .. } => {
            let nfnargs = fn_type.arguments.len();
            if index < nfnargs {
                None
            } else {
                Some((owner, index - nfnargs))
            }
        }
        NodeKind::Phi => {
            let nrec = graph.noutputs(owner);
            if index < nrec {
                None
            } else {
                Some((owner, index - nrec))
            }
        }
        NodeKind::Delta { .. } => Some((owner, index)),
        NodeKind::Simple(_) => unreachable!("simple nodes have no subregions"),
    }
}
