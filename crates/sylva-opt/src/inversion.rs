//! Theta/gamma inversion: loop-invariant branch hoisting.
//!
//! A theta whose predicate comes from a match that also feeds exactly one
//! gamma inside the loop body -- with every loop-variable result either an
//! identity or a gamma output, and every gamma entry variable reading a
//! theta argument -- computes the same branch decision on every iteration.
//! The match is hoisted out of the loop and the nesting flipped:
//! `theta(gamma(match))` becomes `gamma(match, theta-per-case)`, where each
//! case's fresh theta mirrors the original loop variables and carries the
//! corresponding gamma alternative as its body. This unlocks per-case
//! specialization of the loop body.
//!
//! Non-applicability is not an error; the pass just moves on to the next
//! candidate.

use sylva_rvsdg::{
    gamma_entryvar_origin, gamma_nentryvars, theta_loopvars, theta_predicate_origin, GammaBuilder,
    Graph, NodeId, NodeKind, Origin, RegionId, SubstitutionMap, ThetaBuilder, User,
};

use crate::pass::{Pass, PassId};

/// Inverts every applicable theta in the graph, innermost first.
pub fn invert(graph: &mut Graph) {
    let root = graph.root();
    invert_region(graph, root);
}

fn invert_region(graph: &mut Graph, region: RegionId) {
    for node in graph.region_nodes(region) {
        if graph.node_kind(node).is_structural() {
            for sub in graph.subregions(node) {
                invert_region(graph, sub);
            }
            if graph.node_kind(node) == &NodeKind::Theta {
                invert_theta(graph, node);
            }
        }
    }
}

/// The gamma node the inversion revolves around, if the theta qualifies.
fn applicable_gamma(graph: &Graph, theta: NodeId) -> Option<NodeId> {
    let sub = graph.subregion(theta, 0);
    let predicate = theta_predicate_origin(graph, theta);
    let match_node = graph.origin_node(predicate)?;
    if !matches!(
        graph.node_kind(match_node),
        NodeKind::Simple(sylva_ir::Operation::Match { .. })
    ) {
        return None;
    }

    let match_out = Origin::Output { node: match_node, index: 0 };
    if graph.nusers(match_out) != 2 {
        return None;
    }
    let mut gamma = None;
    for user in graph.users(match_out) {
        if user == (User::Result { region: sub, index: 0 }) {
            continue;
        }
        match user {
            User::Input { node, index: 0 } if graph.node_kind(node) == &NodeKind::Gamma => {
                gamma = Some(node);
            }
            _ => return None,
        }
    }
    let gamma = gamma?;

    // Every loop variable is an identity or flows through the gamma.
    for lv in theta_loopvars(graph, theta) {
        let origin = lv.result_origin(graph);
        if origin == lv.argument(graph) {
            continue;
        }
        if graph.origin_node(origin) != Some(gamma) {
            return None;
        }
    }

    // Every gamma entry variable reads a theta argument directly.
    for k in 0..gamma_nentryvars(graph, gamma) {
        match gamma_entryvar_origin(graph, gamma, k) {
            Origin::Argument { region, .. } if region == sub => {}
            _ => return None,
        }
    }

    // The condition computation must not read back out of the gamma, or it
    // could not be hoisted in front of the loop.
    for node in graph.region_nodes(sub) {
        if node == gamma {
            continue;
        }
        for index in 0..graph.ninputs(node) {
            if graph.origin_node(graph.input_origin(node, index)) == Some(gamma) {
                return None;
            }
        }
    }
    Some(gamma)
}

/// The condition-producing nodes between the theta arguments and the
/// match, bucketed by depth.
fn collect_condition_nodes(graph: &Graph, theta: NodeId, gamma: NodeId) -> Vec<Vec<NodeId>> {
    let mut buckets: Vec<Vec<NodeId>> = vec![];
    for node in graph.region_nodes(graph.subregion(theta, 0)) {
        if node == gamma {
            continue;
        }
        let depth = graph.node_depth(node);
        if depth >= buckets.len() {
            buckets.resize(depth + 1, vec![]);
        }
        buckets[depth].push(node);
    }
    buckets
}

fn copy_condition_nodes(
    graph: &mut Graph,
    target: RegionId,
    smap: &mut SubstitutionMap,
    buckets: &[Vec<NodeId>],
) {
    for bucket in buckets {
        for &node in bucket {
            graph.copy_node(node, target, smap);
        }
    }
}

/// Applies the inversion to one theta if its precondition holds. Returns
/// whether it fired.
pub fn invert_theta(graph: &mut Graph, theta: NodeId) -> bool {
    let Some(gamma) = applicable_gamma(graph, theta) else {
        return false;
    };

    let region = graph.node_region(theta);
    let old_loopvars = theta_loopvars(graph, theta);
    let predicate = theta_predicate_origin(graph, theta);
    let nsub = graph.nsubregions(gamma);

    // Copy the condition computation in front of the loop, reading the
    // loop-variable initializers.
    let mut smap = SubstitutionMap::new();
    let condition_nodes = collect_condition_nodes(graph, theta, gamma);
    for lv in &old_loopvars {
        smap.insert(lv.argument(graph), lv.init_origin(graph));
    }
    copy_condition_nodes(graph, region, &mut smap, &condition_nodes);

    let outer_gamma = GammaBuilder::new(graph, smap.expect(predicate), nsub);
    // One entry variable per loop variable, shared by every case.
    let entry_args: Vec<Vec<Origin>> = old_loopvars
        .iter()
        .map(|lv| {
            let init = lv.init_origin(graph);
            outer_gamma.add_entryvar(graph, init)
        })
        .collect();

    let mut case_maps: Vec<SubstitutionMap> = vec![];
    for r in 0..nsub {
        let case_region = graph.subregion(outer_gamma.node(), r);
        let mut rmap = SubstitutionMap::new();

        // A fresh theta mirroring the original loop variables.
        let new_theta = ThetaBuilder::new(graph, case_region);
        let new_loopvars: Vec<_> = old_loopvars
            .iter()
            .enumerate()
            .map(|(i, lv)| {
                let nlv = new_theta.add_loopvar(graph, entry_args[i][r]);
                rmap.insert(lv.argument(graph), nlv.argument(graph));
                nlv
            })
            .collect();

        // The old gamma alternative's arguments read theta arguments; remap
        // them into the new loop.
        let old_case = graph.subregion(gamma, r);
        for k in 0..graph.narguments(old_case) {
            let origin = gamma_entryvar_origin(graph, gamma, k);
            let mapped = rmap.expect(origin);
            rmap.insert(Origin::Argument { region: old_case, index: k }, mapped);
        }

        // Copy the alternative's body into the new loop.
        let new_sub = new_theta.subregion(graph);
        graph.copy_region(old_case, new_sub, &mut rmap, false, false);

        // Loop-variable feedback: gamma-produced results read the copied
        // case result, identities stay identities.
        for (lv, nlv) in old_loopvars.iter().zip(&new_loopvars) {
            let origin = lv.result_origin(graph);
            if let Origin::Output { node, index } = origin {
                if node == gamma {
                    let case_result = graph.result_origin(old_case, index);
                    let substitute = rmap.expect(case_result);
                    graph.divert(nlv.result(graph), substitute);
                }
            }
        }

        // The next iteration's condition reads the updated loop values.
        for (lv, nlv) in old_loopvars.iter().zip(&new_loopvars) {
            rmap.insert(lv.argument(graph), nlv.result_origin(graph));
        }
        copy_condition_nodes(graph, new_sub, &mut rmap, &condition_nodes);
        let case_predicate = rmap.expect(predicate);

        // Record where each old loop value ends up for the exit variables.
        for (lv, nlv) in old_loopvars.iter().zip(&new_loopvars) {
            rmap.insert(lv.result_origin(graph), nlv.output());
        }

        new_theta.finish(graph, case_predicate);
        case_maps.push(rmap);
    }

    // Aggregate each case's loop outputs into exit variables and replace
    // the original theta outputs.
    for lv in &old_loopvars {
        let per_case: Vec<Origin> =
            case_maps.iter().map(|rmap| rmap.expect(lv.result_origin(graph))).collect();
        let exit = outer_gamma.add_exitvar(graph, &per_case);
        graph.divert_users(lv.output(), exit);
    }
    graph.remove_node(theta);
    true
}

pub struct ThetaGammaInversion;

impl Pass for ThetaGammaInversion {
    fn id(&self) -> PassId {
        PassId::ThetaGammaInversion
    }

    fn run(&mut self, graph: &mut Graph) {
        invert(graph);
    }
}
