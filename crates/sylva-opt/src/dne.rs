//! Dead-node elimination.
//!
//! Removes every node whose outputs all have no users. State edges make
//! side effects explicit in this IR -- a store whose state output nobody
//! consumes is unobservable -- so structural deadness is semantic deadness.
//! The sweep walks each region bottom-up (consumers before producers, so a
//! removed consumer frees its producers within the same sweep) and iterates
//! to a fixed point across regions.

use sylva_rvsdg::{
    lambda_nfnargs, BottomUpTraverser, Graph, NodeKind, Origin, RegionId,
};

use crate::pass::{Pass, PassId};

pub fn dead_node_elimination(graph: &mut Graph) {
    loop {
        let root = graph.root();
        let mut changed = sweep(graph, root);
        changed |= prune_ports(graph, root);
        if !changed {
            return;
        }
    }
}

fn sweep(graph: &mut Graph, region: RegionId) -> bool {
    let mut changed = false;
    let mut traverser = BottomUpTraverser::new(graph, region);
    while let Some(node) = traverser.next() {
        if graph.is_unused(node) {
            graph.remove_node(node);
            changed = true;
        } else {
            for sub in graph.subregions(node) {
                changed |= sweep(graph, sub);
            }
        }
    }
    changed
}

/// Drops context variables and gamma entry variables nothing reads. An
/// inlined call leaves the caller's context variable for the callee behind;
/// pruning it is what lets the sweep collect the callee itself.
fn prune_ports(graph: &mut Graph, region: RegionId) -> bool {
    let mut changed = false;
    for node in graph.region_nodes(region) {
        for sub in graph.subregions(node) {
            changed |= prune_ports(graph, sub);
        }
        match graph.node_kind(node).clone() {
            NodeKind::Lambda { .. } => {
                let sub = graph.subregion(node, 0);
                let nfnargs = lambda_nfnargs(graph, node);
                for k in (0..graph.ninputs(node)).rev() {
                    let argument = Origin::Argument { region: sub, index: nfnargs + k };
                    if graph.nusers(argument) == 0 {
                        graph.remove_argument(sub, nfnargs + k);
                        graph.remove_input(node, k);
                        changed = true;
                    }
                }
            }
            NodeKind::Phi => {
                let sub = graph.subregion(node, 0);
                let nrec = graph.noutputs(node);
                for k in (0..graph.ninputs(node)).rev() {
                    let argument = Origin::Argument { region: sub, index: nrec + k };
                    if graph.nusers(argument) == 0 {
                        graph.remove_argument(sub, nrec + k);
                        graph.remove_input(node, k);
                        changed = true;
                    }
                }
            }
            NodeKind::Delta { .. } => {
                let sub = graph.subregion(node, 0);
                for k in (0..graph.ninputs(node)).rev() {
                    let argument = Origin::Argument { region: sub, index: k };
                    if graph.nusers(argument) == 0 {
                        graph.remove_argument(sub, k);
                        graph.remove_input(node, k);
                        changed = true;
                    }
                }
            }
            NodeKind::Gamma => {
                for k in (0..graph.ninputs(node) - 1).rev() {
                    let unused = (0..graph.nsubregions(node)).all(|r| {
                        let sub = graph.subregion(node, r);
                        graph.nusers(Origin::Argument { region: sub, index: k }) == 0
                    });
                    if unused {
                        for r in 0..graph.nsubregions(node) {
                            let sub = graph.subregion(node, r);
                            graph.remove_argument(sub, k);
                        }
                        graph.remove_input(node, k + 1);
                        changed = true;
                    }
                }
            }
            _ => {}
        }
    }
    changed
}

pub struct DeadNodeElimination;

impl Pass for DeadNodeElimination {
    fn id(&self) -> PassId {
        PassId::DeadNodeElimination
    }

    fn run(&mut self, graph: &mut Graph) {
        dead_node_elimination(graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylva_ir::{Operation, Type};
    use sylva_rvsdg::{GammaBuilder, Origin};

    #[test]
    fn removes_dead_chains() {
        let mut graph = Graph::new();
        let root = graph.root();
        let a = graph.add_simple_node(root, Operation::bitconst(32, 1), &[]);
        let b = graph.add_simple_node(
            root,
            Operation::Assignment { ty: Type::bits(32) },
            &[graph.output(a, 0)],
        );
        let _c = graph.add_simple_node(
            root,
            Operation::Assignment { ty: Type::bits(32) },
            &[graph.output(b, 0)],
        );
        let live = graph.add_simple_node(root, Operation::bitconst(32, 2), &[]);
        graph.add_export(Origin::Output { node: live, index: 0 }, "out");

        dead_node_elimination(&mut graph);
        assert_eq!(graph.region_nnodes(root), 1);
        assert!(graph.node_exists(live));
    }

    #[test]
    fn keeps_nodes_reached_from_results() {
        let mut graph = Graph::new();
        let root = graph.root();
        let a = graph.add_simple_node(root, Operation::bitconst(32, 1), &[]);
        let b = graph.add_simple_node(
            root,
            Operation::Assignment { ty: Type::bits(32) },
            &[graph.output(a, 0)],
        );
        graph.add_export(graph.output(b, 0), "out");

        dead_node_elimination(&mut graph);
        assert_eq!(graph.region_nnodes(root), 2);
    }

    #[test]
    fn unused_store_is_dead() {
        // A store whose state output has no consumer is unobservable.
        let mut graph = Graph::new();
        let root = graph.root();
        let addr = graph.add_import(Type::pointer(Type::bits(32)), "p");
        let value = graph.add_import(Type::bits(32), "v");
        let state = graph.add_import(Type::MemState, "s");
        let _store = graph.add_simple_node(
            root,
            Operation::store(Type::bits(32), 4, 1),
            &[addr, value, state],
        );

        dead_node_elimination(&mut graph);
        assert_eq!(graph.region_nnodes(root), 0);
    }

    #[test]
    fn dead_gamma_is_removed_whole() {
        let mut graph = Graph::new();
        let root = graph.root();
        let pred = graph.add_simple_node(
            root,
            Operation::CtlConstant { alternative: 0, alternatives: 2 },
            &[],
        );
        let value = graph.add_import(Type::bits(32), "x");
        let pred_out = graph.output(pred, 0);
        let gamma = GammaBuilder::new(&mut graph, pred_out, 2);
        let args = gamma.add_entryvar(&mut graph, value);
        gamma.add_exitvar(&mut graph, &args);

        dead_node_elimination(&mut graph);
        assert_eq!(graph.region_nnodes(root), 0);
    }

    #[test]
    fn live_gamma_keeps_inner_nodes_trimmed() {
        let mut graph = Graph::new();
        let root = graph.root();
        let pred = graph.add_simple_node(
            root,
            Operation::CtlConstant { alternative: 0, alternatives: 2 },
            &[],
        );
        let value = graph.add_import(Type::bits(32), "x");
        let pred_out = graph.output(pred, 0);
        let gamma = GammaBuilder::new(&mut graph, pred_out, 2);
        let args = gamma.add_entryvar(&mut graph, value);
        let exit = gamma.add_exitvar(&mut graph, &args);
        // Dead node inside a live gamma.
        let sub = graph.subregion(gamma.node(), 0);
        graph.add_simple_node(sub, Operation::bitconst(32, 9), &[]);
        graph.add_export(exit, "out");

        dead_node_elimination(&mut graph);
        assert!(graph.node_exists(gamma.node()));
        assert_eq!(graph.region_nnodes(sub), 0);
    }
}
