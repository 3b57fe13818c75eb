//! Gamma and theta reductions.
//!
//! Three structural rewrites with per-rule switches:
//!
//! - *Gamma constant predicate*: the predicate is a control constant, so
//!   the selected alternative is spliced into the surrounding region and
//!   the gamma removed.
//! - *Gamma invariant exit*: an exit variable whose every alternative
//!   passes one and the same entry variable through is diverted to that
//!   entry variable's origin.
//! - *Theta invariant loop variable*: a loop variable whose result is the
//!   identity never changes; its output is diverted to the initializer.
//!
//! The pass iterates to a fixed point; dead gammas and thetas whose outputs
//! all became unused are left for dead-node elimination.

use sylva_ir::Operation;

use sylva_rvsdg::{
    gamma_entryvar_origin, theta_loopvars, Graph, NodeId, NodeKind, Origin, RegionId,
    SubstitutionMap,
};

use crate::pass::{Pass, PassId};

/// Rule switches for the structural reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionFlags {
    pub gamma_constant_predicate: bool,
    pub gamma_invariant_exit: bool,
    pub theta_invariant_loopvar: bool,
}

impl Default for ReductionFlags {
    fn default() -> Self {
        ReductionFlags {
            gamma_constant_predicate: true,
            gamma_invariant_exit: true,
            theta_invariant_loopvar: true,
        }
    }
}

pub fn reduce(graph: &mut Graph, flags: ReductionFlags) {
    loop {
        let root = graph.root();
        if !reduce_region(graph, root, flags) {
            return;
        }
    }
}

fn reduce_region(graph: &mut Graph, region: RegionId, flags: ReductionFlags) -> bool {
    let mut changed = false;
    for node in graph.region_nodes(region) {
        if !graph.node_exists(node) {
            continue;
        }
        for sub in graph.subregions(node) {
            changed |= reduce_region(graph, sub, flags);
        }
        match graph.node_kind(node) {
            NodeKind::Gamma => {
                if flags.gamma_constant_predicate && splice_constant_gamma(graph, node) {
                    changed = true;
                    continue;
                }
                if flags.gamma_invariant_exit {
                    changed |= divert_invariant_exits(graph, node);
                }
            }
            NodeKind::Theta => {
                if flags.theta_invariant_loopvar {
                    changed |= divert_invariant_loopvars(graph, node);
                }
            }
            _ => {}
        }
    }
    changed
}

/// With a constant predicate, splice the selected alternative into the
/// gamma's region and remove the gamma.
fn splice_constant_gamma(graph: &mut Graph, gamma: NodeId) -> bool {
    let predicate = graph.input_origin(gamma, 0);
    let selected = match graph.origin_node(predicate).map(|n| graph.node_kind(n)) {
        Some(NodeKind::Simple(Operation::CtlConstant { alternative, .. })) => {
            *alternative as usize
        }
        _ => return false,
    };

    let region = graph.node_region(gamma);
    let case = graph.subregion(gamma, selected);
    let mut smap = SubstitutionMap::new();
    for k in 0..graph.narguments(case) {
        smap.insert(
            Origin::Argument { region: case, index: k },
            gamma_entryvar_origin(graph, gamma, k),
        );
    }
    graph.copy_region(case, region, &mut smap, false, false);

    for index in 0..graph.noutputs(gamma) {
        let substituted = smap.expect(graph.result_origin(case, index));
        graph.divert_users(Origin::Output { node: gamma, index }, substituted);
    }
    graph.remove_node(gamma);
    true
}

/// Divert exit variables whose alternatives all pass the same entry
/// variable through unchanged.
fn divert_invariant_exits(graph: &mut Graph, gamma: NodeId) -> bool {
    let mut changed = false;
    for j in 0..graph.noutputs(gamma) {
        let output = Origin::Output { node: gamma, index: j };
        if graph.nusers(output) == 0 {
            continue;
        }
        let mut invariant_entry: Option<usize> = None;
        let passthrough = (0..graph.nsubregions(gamma)).all(|r| {
            let sub = graph.subregion(gamma, r);
            match graph.result_origin(sub, j) {
                Origin::Argument { region, index } if region == sub => match invariant_entry {
                    None => {
                        invariant_entry = Some(index);
                        true
                    }
                    Some(k) => k == index,
                },
                _ => false,
            }
        });
        if passthrough {
            if let Some(k) = invariant_entry {
                let origin = gamma_entryvar_origin(graph, gamma, k);
                graph.divert_users(output, origin);
                changed = true;
            }
        }
    }
    changed
}

/// Divert outputs of identity loop variables to their initializers.
fn divert_invariant_loopvars(graph: &mut Graph, theta: NodeId) -> bool {
    let mut changed = false;
    for lv in theta_loopvars(graph, theta) {
        if graph.nusers(lv.output()) == 0 {
            continue;
        }
        if lv.result_origin(graph) == lv.argument(graph) {
            let init = lv.init_origin(graph);
            graph.divert_users(lv.output(), init);
            changed = true;
        }
    }
    changed
}

pub struct Reduction {
    pub flags: ReductionFlags,
}

impl Default for Reduction {
    fn default() -> Self {
        Reduction { flags: ReductionFlags::default() }
    }
}

impl Pass for Reduction {
    fn id(&self) -> PassId {
        PassId::Reduction
    }

    fn run(&mut self, graph: &mut Graph) {
        reduce(graph, self.flags);
    }
}
