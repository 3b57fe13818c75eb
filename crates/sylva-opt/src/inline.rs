//! Function inlining.
//!
//! A lambda whose function value flows only into direct calls, of which
//! there is exactly one, is inlined at that call site: the lambda body is
//! copied into the caller's region under a substitution map binding each
//! formal parameter to the call-site operand and each context variable to
//! its producer, routed through the enclosing structural nodes. The call's
//! outputs are diverted to the substituted result origins and the call node
//! removed; dead-node elimination then drops the lambda itself.

use sylva_rvsdg::{
    gamma_add_entryvar, lambda_add_ctxvar, lambda_nfnargs, phi_add_ctxvar,
    structural_argument_input, theta_add_loopvar, Graph, NodeId, NodeKind, Origin, RegionId,
    SubstitutionMap,
};

use crate::pass::{Pass, PassId};

/// Follows structural-argument chains to the origin that ultimately
/// produces a value: a node output, a root-region argument, or a bound
/// argument (function parameter, recursion variable).
pub fn find_producer(graph: &Graph, origin: Origin) -> Origin {
    let mut origin = origin;
    while let Origin::Argument { region, index } = origin {
        match structural_argument_input(graph, region, index) {
            Some((owner, input)) => origin = graph.input_origin(owner, input),
            None => break,
        }
    }
    origin
}

/// Routes a value into `region` by adding entry variables at gammas, loop
/// variables at thetas, and context variables at lambdas and phis along the
/// chain of enclosing structural nodes.
pub fn route_to_region(graph: &mut Graph, origin: Origin, region: RegionId) -> Origin {
    if graph.origin_region(origin) == region {
        return origin;
    }
    let owner = graph.region_owner(region).expect("origin is not visible from this region");
    let outer = graph.node_region(owner);
    let routed = route_to_region(graph, origin, outer);

    match graph.node_kind(owner) {
        NodeKind::Gamma => {
            let r = graph
                .subregions(owner)
                .iter()
                .position(|&sub| sub == region)
                .expect("region is a subregion of its owner");
            gamma_add_entryvar(graph, owner, routed)[r]
        }
        NodeKind::Theta => theta_add_loopvar(graph, owner, routed).argument(graph),
        NodeKind::Lambda { .. } => lambda_add_ctxvar(graph, owner, routed),
        NodeKind::Phi => phi_add_ctxvar(graph, owner, routed),
        kind => panic!("cannot route through {}", kind.debug_string()),
    }
}

/// Where a lambda's function value ends up.
#[derive(Debug, Default)]
pub struct CallSummary {
    /// Call nodes invoking the lambda through their callee operand.
    pub direct_calls: Vec<NodeId>,
    /// Root-region exports of the function value.
    pub nexports: usize,
    /// Everything else (escaping uses).
    pub nothers: usize,
}

impl CallSummary {
    pub fn has_only_direct_calls(&self) -> bool {
        self.nexports == 0 && self.nothers == 0
    }
}

/// Traces the lambda output through structural routing and classifies every
/// terminal user.
pub fn compute_call_summary(graph: &Graph, lambda: NodeId) -> CallSummary {
    let mut summary = CallSummary::default();
    let mut visited = std::collections::HashSet::new();
    let mut worklist = vec![Origin::Output { node: lambda, index: 0 }];
    while let Some(origin) = worklist.pop() {
        if !visited.insert(origin) {
            continue;
        }
        for user in graph.users(origin) {
            match user {
                sylva_rvsdg::User::Input { node, index } => match graph.node_kind(node) {
                    NodeKind::Simple(op) if op.is_call() && index == 0 => {
                        summary.direct_calls.push(node);
                    }
                    NodeKind::Simple(_) => summary.nothers += 1,
                    NodeKind::Gamma => {
                        // Entry variable `index - 1` in every subregion.
                        for sub in graph.subregions(node) {
                            worklist.push(Origin::Argument { region: sub, index: index - 1 });
                        }
                    }
                    NodeKind::Theta => {
                        worklist.push(Origin::Argument {
                            region: graph.subregion(node, 0),
                            index,
                        });
                        worklist.push(Origin::Output { node, index });
                    }
                    NodeKind::Lambda { .. } => {
                        let nfnargs = lambda_nfnargs(graph, node);
                        worklist.push(Origin::Argument {
                            region: graph.subregion(node, 0),
                            index: nfnargs + index,
                        });
                    }
                    NodeKind::Phi => {
                        let nrec = graph.noutputs(node);
                        worklist.push(Origin::Argument {
                            region: graph.subregion(node, 0),
                            index: nrec + index,
                        });
                    }
                    NodeKind::Delta { .. } => {
                        worklist.push(Origin::Argument {
                            region: graph.subregion(node, 0),
                            index,
                        });
                    }
                },
                sylva_rvsdg::User::Result { region, index } => {
                    match graph.region_owner(region) {
                        None => summary.nexports += 1,
                        Some(owner) => match graph.node_kind(owner) {
                            NodeKind::Gamma | NodeKind::Phi => {
                                worklist.push(Origin::Output { node: owner, index });
                            }
                            NodeKind::Theta => {
                                // Result 0 is the predicate and never
                                // function-typed; loop variable i is
                                // result i + 1 and output i.
                                worklist.push(Origin::Output { node: owner, index: index - 1 });
                            }
                            // Returning the function value from a lambda or
                            // binding it as data makes it escape.
                            NodeKind::Lambda { .. } | NodeKind::Delta { .. } => {
                                summary.nothers += 1;
                            }
                            NodeKind::Simple(_) => unreachable!(),
                        },
                    }
                }
            }
        }
    }
    summary
}

/// Inlines one direct call to `lambda`.
pub fn inline_call(graph: &mut Graph, call: NodeId, lambda: NodeId) {
    assert!(matches!(graph.node_kind(call), NodeKind::Simple(op) if op.is_call()));
    let region = graph.node_region(call);

    // Route the lambda's dependencies (context-variable origins) into the
    // call's region.
    let deps: Vec<Origin> = (0..graph.ninputs(lambda))
        .map(|n| {
            let producer = find_producer(graph, graph.input_origin(lambda, n));
            route_to_region(graph, producer, region)
        })
        .collect();

    let sub = graph.subregion(lambda, 0);
    let nfnargs = lambda_nfnargs(graph, lambda);
    let mut smap = SubstitutionMap::new();
    for i in 0..nfnargs {
        smap.insert(
            Origin::Argument { region: sub, index: i },
            graph.input_origin(call, i + 1),
        );
    }
    for (k, &dep) in deps.iter().enumerate() {
        smap.insert(Origin::Argument { region: sub, index: nfnargs + k }, dep);
    }

    graph.copy_region(sub, region, &mut smap, false, false);

    for index in 0..graph.noutputs(call) {
        let substituted = smap.expect(graph.result_origin(sub, index));
        graph.divert_users(Origin::Output { node: call, index }, substituted);
    }
    graph.remove_node(call);
}

/// Inlines every root-level lambda with exactly one direct call site and no
/// other users.
pub fn inlining(graph: &mut Graph) {
    for node in graph.region_nodes(graph.root()) {
        if !matches!(graph.node_kind(node), NodeKind::Lambda { .. }) {
            continue;
        }
        let summary = compute_call_summary(graph, node);
        if summary.has_only_direct_calls() && summary.direct_calls.len() == 1 {
            inline_call(graph, summary.direct_calls[0], node);
        }
    }
}

pub struct FunctionInlining;

impl Pass for FunctionInlining {
    fn id(&self) -> PassId {
        PassId::FunctionInlining
    }

    fn run(&mut self, graph: &mut Graph) {
        inlining(graph);
    }
}
