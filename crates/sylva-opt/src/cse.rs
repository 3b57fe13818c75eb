//! Common-subexpression elimination.
//!
//! A per-region hash index keyed on operation equality plus origin
//! identity: two simple nodes with equal operations reading the very same
//! origins compute the same values, so the later one's users are diverted
//! to the earlier one and the node is removed. Only pure operations are
//! indexed -- state-carrying operations are kept apart by their state
//! operands anyway, but allocas are distinct by identity even with equal
//! payloads.

use std::collections::HashMap;

use sylva_ir::Operation;

use sylva_rvsdg::{Graph, NodeId, NodeKind, Origin, RegionId, TopDownTraverser};

use crate::pass::{Pass, PassId};

pub fn common_subexpression_elimination(graph: &mut Graph) {
    let root = graph.root();
    cse_region(graph, root);
}

fn cse_region(graph: &mut Graph, region: RegionId) {
    let mut index: HashMap<(Operation, Vec<Origin>), NodeId> = HashMap::new();
    let mut traverser = TopDownTraverser::new(graph, region);
    while let Some(node) = traverser.next() {
        match graph.node_kind(node) {
            NodeKind::Simple(op) if !op.is_alloca() => {
                let key = (
                    op.clone(),
                    (0..graph.ninputs(node)).map(|i| graph.input_origin(node, i)).collect(),
                );
                match index.get(&key) {
                    Some(&existing) => {
                        let origins: Vec<Origin> = (0..graph.noutputs(existing))
                            .map(|i| Origin::Output { node: existing, index: i })
                            .collect();
                        graph.divert_node_users(node, &origins);
                        graph.remove_node(node);
                    }
                    None => {
                        index.insert(key, node);
                    }
                }
            }
            NodeKind::Simple(_) => {}
            _ => {
                for sub in graph.subregions(node) {
                    cse_region(graph, sub);
                }
            }
        }
    }
}

pub struct CommonSubexpressionElimination;

impl Pass for CommonSubexpressionElimination {
    fn id(&self) -> PassId {
        PassId::CommonSubexpressionElimination
    }

    fn run(&mut self, graph: &mut Graph) {
        common_subexpression_elimination(graph);
    }
}
