//! Substitution maps and region copying.
//!
//! Transformations (inlining, inversion) copy arbitrary subregions under a
//! [`SubstitutionMap`] binding origins in the source region to origins in
//! the target. Copying walks nodes in depth order, so every operand of a
//! copied node is already mapped; an unmapped operand is an invariant
//! violation and panics.

use std::collections::HashMap;

use crate::graph::{Graph, NodeId, NodeKind, Origin, RegionId};

/// Maps source origins (and regions) to their copies.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionMap {
    origins: HashMap<Origin, Origin>,
    regions: HashMap<RegionId, RegionId>,
}

impl SubstitutionMap {
    pub fn new() -> Self {
        SubstitutionMap::default()
    }

    pub fn insert(&mut self, old: Origin, new: Origin) {
        self.origins.insert(old, new);
    }

    pub fn lookup(&self, old: Origin) -> Option<Origin> {
        self.origins.get(&old).copied()
    }

    /// Like [`lookup`](Self::lookup), but an absent mapping is a programmer
    /// error.
    pub fn expect(&self, old: Origin) -> Origin {
        self.lookup(old).expect("origin has no substitution")
    }

    pub fn insert_region(&mut self, old: RegionId, new: RegionId) {
        self.regions.insert(old, new);
    }

    pub fn lookup_region(&self, old: RegionId) -> Option<RegionId> {
        self.regions.get(&old).copied()
    }
}

impl Graph {
    /// Copies the contents of `src` into `dst` under `smap`.
    ///
    /// With `copy_arguments`, fresh arguments are appended to `dst` and
    /// mapped; otherwise the caller must have mapped every used argument of
    /// `src` beforehand (the inlining case, where formals map to call-site
    /// operands). With `copy_results`, `src`'s results are appended to
    /// `dst` under substitution.
    pub fn copy_region(
        &mut self,
        src: RegionId,
        dst: RegionId,
        smap: &mut SubstitutionMap,
        copy_arguments: bool,
        copy_results: bool,
    ) {
        smap.insert_region(src, dst);

        if copy_arguments {
            for index in 0..self.narguments(src) {
                let ty = self.argument_type(src, index).clone();
                let name = self.argument_name(src, index).map(str::to_string);
                let new = self.add_argument(dst, ty, name);
                smap.insert(Origin::Argument { region: src, index }, new);
            }
        }

        let mut nodes = self.region_nodes(src);
        nodes.sort_by_key(|&node| self.node_depth(node));
        for node in nodes {
            self.copy_node(node, dst, smap);
        }

        if copy_results {
            for index in 0..self.nresults(src) {
                let origin = smap.expect(self.result_origin(src, index));
                let name = self.result_name(src, index).map(str::to_string);
                self.add_result(dst, origin, name);
            }
        }
    }

    /// Copies one node into `dst`, mapping its outputs in `smap`. Structural
    /// nodes are copied recursively, subregions included.
    pub fn copy_node(&mut self, node: NodeId, dst: RegionId, smap: &mut SubstitutionMap) -> NodeId {
        let operands: Vec<Origin> = (0..self.ninputs(node))
            .map(|index| smap.expect(self.input_origin(node, index)))
            .collect();

        let copy = match self.node_kind(node).clone() {
            NodeKind::Simple(op) => self.add_simple_node(dst, op, &operands),
            kind => {
                let output_types: Vec<_> =
                    (0..self.noutputs(node)).map(|i| self.output_type(node, i).clone()).collect();
                let nsub = self.nsubregions(node);
                let copy = self.add_structural_node(dst, kind, &operands, &output_types, nsub);
                for r in 0..nsub {
                    let src_sub = self.subregion(node, r);
                    let dst_sub = self.subregion(copy, r);
                    self.copy_region(src_sub, dst_sub, smap, true, true);
                }
                copy
            }
        };

        for index in 0..self.noutputs(node) {
            smap.insert(Origin::Output { node, index }, Origin::Output { node: copy, index });
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{theta_loopvar, theta_predicate_origin, ThetaBuilder};
    use sylva_ir::{Operation, Type};

    #[test]
    fn copy_simple_chain_under_substitution() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_import(Type::bits(32), "x");
        let y = graph.add_import(Type::bits(32), "y");
        let one = graph.add_simple_node(root, Operation::bitconst(32, 1), &[]);
        let sum =
            graph.add_simple_node(root, Operation::bitadd(32), &[x, graph.output(one, 0)]);

        // Re-instantiate the chain with y substituted for x.
        let mut smap = SubstitutionMap::new();
        smap.insert(x, y);
        let one_copy = graph.copy_node(one, root, &mut smap);
        let sum_copy = graph.copy_node(sum, root, &mut smap);

        assert_eq!(graph.input_origin(sum_copy, 0), y);
        assert_eq!(graph.input_origin(sum_copy, 1), graph.output(one_copy, 0));
        graph.verify();
    }

    #[test]
    #[should_panic(expected = "no substitution")]
    fn unmapped_operand_panics() {
        let mut graph = Graph::new();
        let root = graph.root();
        let x = graph.add_import(Type::bits(32), "x");
        let node =
            graph.add_simple_node(root, Operation::Assignment { ty: Type::bits(32) }, &[x]);
        let mut smap = SubstitutionMap::new();
        graph.copy_node(node, root, &mut smap);
    }

    #[test]
    fn copy_theta_preserves_structure() {
        let mut graph = Graph::new();
        let root = graph.root();
        let init = graph.add_import(Type::bits(32), "init");

        let theta = ThetaBuilder::new(&mut graph, root);
        let lv = theta.add_loopvar(&mut graph, init);
        let sub = theta.subregion(&graph);
        let one = graph.add_simple_node(sub, Operation::bitconst(32, 1), &[]);
        let next = graph.add_simple_node(
            sub,
            Operation::bitadd(32),
            &[lv.argument(&graph), graph.output(one, 0)],
        );
        graph.divert(lv.result(&graph), graph.output(next, 0));
        let cmp = graph.add_simple_node(
            sub,
            Operation::biteq(32),
            &[graph.output(next, 0), graph.output(one, 0)],
        );
        let pred = graph.add_simple_node(
            sub,
            Operation::Match { nbits: 1, mapping: vec![(1, 0)], default: 1, alternatives: 2 },
            &[graph.output(cmp, 0)],
        );
        let pred_out = graph.output(pred, 0);
        let theta = theta.finish(&mut graph, pred_out);

        let other_init = graph.add_import(Type::bits(32), "other");
        let mut smap = SubstitutionMap::new();
        smap.insert(init, other_init);
        let copy = graph.copy_node(theta, root, &mut smap);

        assert_eq!(graph.node_kind(copy), &NodeKind::Theta);
        let lv_copy = theta_loopvar(&graph, copy, 0);
        assert_eq!(lv_copy.init_origin(&graph), other_init);
        // The copied predicate is a match inside the copied subregion.
        let pred_copy = theta_predicate_origin(&graph, copy);
        let pred_node = graph.origin_node(pred_copy).unwrap();
        assert_eq!(graph.node_region(pred_node), graph.subregion(copy, 0));
        assert_eq!(
            graph.nnodes_recursive(graph.subregion(copy, 0)),
            graph.nnodes_recursive(graph.subregion(theta, 0))
        );
        graph.verify();
    }
}
