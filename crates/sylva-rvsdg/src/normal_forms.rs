//! Per-operator normal forms.
//!
//! Each memory operator carries a rewrite-rule set with per-rule switches,
//! held per-graph in [`NormalForms`] and seeded at graph construction. A rule
//! fires only when its switch is on and the graph is in mutable mode.
//!
//! Two application points:
//! - the `create_store`/`create_load`/`create_mux` constructors apply the
//!   operand-level reductions before a node is ever built;
//! - [`normalize_node`] rewrites an existing node, diverting its users to
//!   the reduced outputs and removing it. [`normalize`] drives node-level
//!   rewriting to a fixed point over the whole graph.
//!
//! The rules:
//! - `store_mux`: all state operands trace to one state mux -- push the
//!   store past the mux (store over the mux operands, re-mux its outputs).
//! - `store_store`: the previous operation on every state operand is a
//!   store to the same address whose outputs are consumed only here, with
//!   equal alignment -- last write wins, drop the earlier store.
//! - `store_alloca`: the address is an alloca output and the alloca's state
//!   (with no other consumer) is among the operands -- the store needs
//!   ordering against the alloca state only; unrelated states pass through.
//! - `multiple_origin`: duplicated state operands collapse to one; state
//!   inputs are semantically a set of distinct streams.
//!
//! The load rules mirror these (`load_mux`, `load_store` forwarding,
//! `load_alloca`, `load_load_state`, `multiple_origin`); the state-mux rules
//! flatten nested muxes and deduplicate operands.

use indexmap::IndexSet;

use sylva_ir::{Operation, Type};

use crate::graph::{Graph, NodeId, NodeKind, Origin};

/// Rule switches for the store operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreNormalForm {
    pub store_mux: bool,
    pub store_store: bool,
    pub store_alloca: bool,
    pub multiple_origin: bool,
}

impl Default for StoreNormalForm {
    fn default() -> Self {
        StoreNormalForm {
            store_mux: true,
            store_store: true,
            store_alloca: true,
            multiple_origin: true,
        }
    }
}

/// Rule switches for the load operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadNormalForm {
    pub load_mux: bool,
    pub load_store: bool,
    pub load_alloca: bool,
    pub load_load_state: bool,
    pub multiple_origin: bool,
}

impl Default for LoadNormalForm {
    fn default() -> Self {
        LoadNormalForm {
            load_mux: true,
            load_store: true,
            load_alloca: true,
            load_load_state: true,
            multiple_origin: true,
        }
    }
}

/// Rule switches for the memory state mux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxNormalForm {
    pub mux_mux: bool,
    pub multiple_origin: bool,
}

impl Default for MuxNormalForm {
    fn default() -> Self {
        MuxNormalForm { mux_mux: true, multiple_origin: true }
    }
}

/// The per-graph normal-form table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NormalForms {
    pub store: StoreNormalForm,
    pub load: LoadNormalForm,
    pub mux: MuxNormalForm,
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

fn producer_with<F>(graph: &Graph, origin: Origin, pred: F) -> Option<NodeId>
where
    F: Fn(&Operation) -> bool,
{
    let node = graph.origin_node(origin)?;
    match graph.node_kind(node) {
        NodeKind::Simple(op) if pred(op) => Some(node),
        _ => None,
    }
}

/// All states come from one and the same state mux node.
fn is_state_mux_reducible(graph: &Graph, states: &[Origin]) -> Option<NodeId> {
    let first = *states.first()?;
    let mux = producer_with(graph, first, Operation::is_mem_state_mux)?;
    states
        .iter()
        .all(|&s| graph.origin_node(s) == Some(mux))
        .then_some(mux)
}

/// The address is an alloca's address output and the alloca's state output,
/// consumed only here, is among the states. Requiring the single consumer
/// keeps the rule conservative: no other operation is ordered against the
/// alloca when its state is pulled out of the threaded set.
///
/// `allowed_users` is 0 when checking operands of a node not yet created and
/// 1 when checking an existing node (whose input is itself a user).
fn is_alloca_reducible(
    graph: &Graph,
    addr: Origin,
    states: &[Origin],
    allowed_users: usize,
) -> Option<Origin> {
    if states.len() < 2 {
        return None;
    }
    let alloca = match addr {
        Origin::Output { node, index: 0 } => {
            match graph.node_kind(node) {
                NodeKind::Simple(op) if op.is_alloca() => node,
                _ => return None,
            }
        }
        _ => return None,
    };
    let alloca_state = Origin::Output { node: alloca, index: 1 };
    if !states.contains(&alloca_state) || graph.nusers(alloca_state) != allowed_users {
        return None;
    }
    Some(alloca_state)
}

fn has_multiple_origins(states: &[Origin]) -> bool {
    let distinct: IndexSet<Origin> = states.iter().copied().collect();
    distinct.len() != states.len()
}

fn dedup(states: &[Origin]) -> Vec<Origin> {
    let distinct: IndexSet<Origin> = states.iter().copied().collect();
    distinct.into_iter().collect()
}

fn mux_operand_origins(graph: &Graph, mux: NodeId) -> Vec<Origin> {
    (0..graph.ninputs(mux)).map(|n| graph.input_origin(mux, n)).collect()
}

fn store_fields(op: &Operation) -> (Type, u32) {
    match op {
        Operation::Store { ty, alignment, .. } => (ty.clone(), *alignment),
        _ => panic!("not a store"),
    }
}

/// Store-to-load forwarding: every state comes from one store to the same
/// address storing a value of the loaded type.
fn forwardable_store(
    graph: &Graph,
    addr: Origin,
    states: &[Origin],
    load_ty: &Type,
) -> Option<NodeId> {
    let prev = producer_with(graph, *states.first()?, Operation::is_store)?;
    if graph.noutputs(prev) != states.len() {
        return None;
    }
    if graph.input_origin(prev, 0) != addr {
        return None;
    }
    if !states.iter().all(|&s| graph.origin_node(s) == Some(prev)) {
        return None;
    }
    let (store_ty, _) = store_fields(graph.node_kind(prev).operation().unwrap());
    (&store_ty == load_ty).then_some(prev)
}

// ---------------------------------------------------------------------------
// Normalizing constructors
// ---------------------------------------------------------------------------

/// Creates a store, applying the enabled operand-level reductions first.
/// Returns the resulting state origins; their number can shrink under the
/// `multiple_origin` rule.
pub fn create_store(
    graph: &mut Graph,
    addr: Origin,
    value: Origin,
    states: &[Origin],
    alignment: u32,
) -> Vec<Origin> {
    let flags = graph.normal_forms.store;
    let enabled = graph.is_mutable();
    let ty = graph.origin_type(value).clone();

    if enabled && flags.store_mux {
        if let Some(mux) = is_state_mux_reducible(graph, states) {
            let inner_states = mux_operand_origins(graph, mux);
            let stored = create_store(graph, addr, value, &inner_states, alignment);
            return create_mux(graph, &stored, states.len() as u32);
        }
    }

    if enabled && flags.store_alloca {
        if let Some(alloca_state) = is_alloca_reducible(graph, addr, states, 0) {
            let stored = create_store(graph, addr, value, &[alloca_state], alignment);
            debug_assert_eq!(stored.len(), 1);
            return states
                .iter()
                .map(|&s| if s == alloca_state { stored[0] } else { s })
                .collect();
        }
    }

    if enabled && flags.multiple_origin && has_multiple_origins(states) {
        let states = dedup(states);
        return create_store(graph, addr, value, &states, alignment);
    }

    let region = graph.origin_region(addr);
    let mut operands = vec![addr, value];
    operands.extend_from_slice(states);
    let node = graph.add_simple_node(
        region,
        Operation::Store { ty, alignment, nstates: states.len() as u32 },
        &operands,
    );
    (0..states.len()).map(|index| Origin::Output { node, index }).collect()
}

/// Creates a load, applying the enabled operand-level reductions first.
/// Returns the loaded value followed by the state origins.
pub fn create_load(
    graph: &mut Graph,
    addr: Origin,
    states: &[Origin],
    alignment: u32,
) -> Vec<Origin> {
    let flags = graph.normal_forms.load;
    let enabled = graph.is_mutable();
    let ty = graph
        .origin_type(addr)
        .pointee()
        .expect("load address must be a pointer")
        .clone();

    if enabled && flags.load_mux {
        if let Some(mux) = is_state_mux_reducible(graph, states) {
            let inner_states = mux_operand_origins(graph, mux);
            let loaded = create_load(graph, addr, &inner_states, alignment);
            let mut result = vec![loaded[0]];
            result.extend(create_mux(graph, &loaded[1..], states.len() as u32));
            return result;
        }
    }

    if enabled && flags.load_store {
        if let Some(prev) = forwardable_store(graph, addr, states, &ty) {
            let mut result = vec![graph.input_origin(prev, 1)];
            result.extend_from_slice(states);
            return result;
        }
    }

    if enabled && flags.load_alloca {
        if let Some(alloca_state) = is_alloca_reducible(graph, addr, states, 0) {
            let loaded = create_load(graph, addr, &[alloca_state], alignment);
            let mut result = vec![loaded[0]];
            result.extend(
                states.iter().map(|&s| if s == alloca_state { loaded[1] } else { s }),
            );
            return result;
        }
    }

    if enabled && flags.multiple_origin && has_multiple_origins(states) {
        let states = dedup(states);
        return create_load(graph, addr, &states, alignment);
    }

    let region = graph.origin_region(addr);
    let mut operands = vec![addr];
    operands.extend_from_slice(states);
    let node = graph.add_simple_node(
        region,
        Operation::Load { ty, alignment, nstates: states.len() as u32 },
        &operands,
    );
    (0..states.len() + 1).map(|index| Origin::Output { node, index }).collect()
}

/// Creates a memory state mux, flattening nested muxes and deduplicating
/// operands where enabled.
pub fn create_mux(graph: &mut Graph, operands: &[Origin], nresults: u32) -> Vec<Origin> {
    let flags = graph.normal_forms.mux;
    let enabled = graph.is_mutable();

    if enabled && flags.mux_mux {
        if let Some(inner) = spliceable_mux(graph, operands) {
            let spliced = splice_mux_operands(graph, operands, inner);
            return create_mux(graph, &spliced, nresults);
        }
    }

    if enabled && flags.multiple_origin && has_multiple_origins(operands) {
        let operands = dedup(operands);
        return create_mux(graph, &operands, nresults);
    }

    let region = graph.origin_region(operands[0]);
    let node = graph.add_simple_node(
        region,
        Operation::MemStateMux { noperands: operands.len() as u32, nresults },
        operands,
    );
    (0..nresults as usize).map(|index| Origin::Output { node, index }).collect()
}

/// An operand-producing mux every one of whose outputs occurs in `operands`
/// and has exactly one user.
fn spliceable_mux(graph: &Graph, operands: &[Origin]) -> Option<NodeId> {
    for &operand in operands {
        let Some(mux) = producer_with(graph, operand, Operation::is_mem_state_mux) else {
            continue;
        };
        let all_consumed_here = (0..graph.noutputs(mux)).all(|index| {
            let out = Origin::Output { node: mux, index };
            graph.nusers(out) <= 1 && operands.contains(&out)
        });
        if all_consumed_here {
            return Some(mux);
        }
    }
    None
}

/// Replaces the first occurrence of `inner`'s outputs with `inner`'s
/// operands and drops the rest.
fn splice_mux_operands(graph: &Graph, operands: &[Origin], inner: NodeId) -> Vec<Origin> {
    let mut spliced = vec![];
    let mut inserted = false;
    for &operand in operands {
        if graph.origin_node(operand) == Some(inner) {
            if !inserted {
                spliced.extend(mux_operand_origins(graph, inner));
                inserted = true;
            }
        } else {
            spliced.push(operand);
        }
    }
    spliced
}

// ---------------------------------------------------------------------------
// Node-level normalization
// ---------------------------------------------------------------------------

/// Rewrites one node if an enabled rule matches. Returns `true` when the
/// node is already normal; `false` when it was rewritten and removed.
pub fn normalize_node(graph: &mut Graph, node: NodeId) -> bool {
    if !graph.is_mutable() {
        return true;
    }
    let op = match graph.node_kind(node) {
        NodeKind::Simple(op) => op.clone(),
        _ => return true,
    };
    match op {
        Operation::Store { .. } => normalize_store(graph, node, &op),
        Operation::Load { .. } => normalize_load(graph, node, &op),
        Operation::MemStateMux { .. } => normalize_mux(graph, node),
        _ => true,
    }
}

fn store_states(graph: &Graph, node: NodeId) -> Vec<Origin> {
    (2..graph.ninputs(node)).map(|n| graph.input_origin(node, n)).collect()
}

fn load_states(graph: &Graph, node: NodeId) -> Vec<Origin> {
    (1..graph.ninputs(node)).map(|n| graph.input_origin(node, n)).collect()
}

/// The previous operation on every state operand is a store to the same
/// address whose every output is consumed only by this store.
fn is_store_store_reducible(graph: &Graph, node: NodeId, op: &Operation) -> Option<NodeId> {
    let states = store_states(graph, node);
    let prev = producer_with(graph, *states.first()?, Operation::is_store)?;
    if graph.noutputs(prev) != states.len() {
        return None;
    }
    if graph.input_origin(prev, 0) != graph.input_origin(node, 0) {
        return None;
    }
    for &state in &states {
        if graph.origin_node(state) != Some(prev) || graph.nusers(state) != 1 {
            return None;
        }
    }
    let (_, alignment) = store_fields(op);
    let (_, prev_alignment) = store_fields(graph.node_kind(prev).operation().unwrap());
    (alignment == prev_alignment).then_some(prev)
}

fn normalize_store(graph: &mut Graph, node: NodeId, op: &Operation) -> bool {
    let flags = graph.normal_forms.store;
    let (_, alignment) = store_fields(op);
    let addr = graph.input_origin(node, 0);
    let value = graph.input_origin(node, 1);
    let states = store_states(graph, node);

    if flags.store_mux {
        if let Some(mux) = is_state_mux_reducible(graph, &states) {
            let inner_states = mux_operand_origins(graph, mux);
            let stored = create_store(graph, addr, value, &inner_states, alignment);
            let outs = create_mux(graph, &stored, states.len() as u32);
            graph.divert_node_users(node, &outs);
            graph.remove_node(node);
            if graph.is_unused(mux) {
                graph.remove_node(mux);
            }
            return false;
        }
    }

    if flags.store_store {
        if let Some(prev) = is_store_store_reducible(graph, node, op) {
            let prev_states = store_states(graph, prev);
            let outs = create_store(graph, addr, value, &prev_states, alignment);
            graph.divert_node_users(node, &outs);
            graph.remove_node(node);
            // The earlier store's only consumers were this store's inputs.
            if graph.is_unused(prev) {
                graph.remove_node(prev);
            }
            return false;
        }
    }

    if flags.store_alloca {
        if let Some(alloca_state) = is_alloca_reducible(graph, addr, &states, 1) {
            let stored = create_store(graph, addr, value, &[alloca_state], alignment);
            let outs: Vec<Origin> = states
                .iter()
                .map(|&s| if s == alloca_state { stored[0] } else { s })
                .collect();
            graph.divert_node_users(node, &outs);
            graph.remove_node(node);
            return false;
        }
    }

    if flags.multiple_origin && has_multiple_origins(&states) {
        let deduped = dedup(&states);
        let outs = create_store(graph, addr, value, &deduped, alignment);
        // Map every original state output to the output produced for its
        // origin's first occurrence.
        let mapped: Vec<Origin> = states
            .iter()
            .map(|s| outs[deduped.iter().position(|d| d == s).unwrap()])
            .collect();
        graph.divert_node_users(node, &mapped);
        graph.remove_node(node);
        return false;
    }

    true
}

fn is_load_store_reducible(graph: &Graph, node: NodeId, op: &Operation) -> Option<NodeId> {
    let load_ty = match op {
        Operation::Load { ty, .. } => ty,
        _ => unreachable!(),
    };
    let states = load_states(graph, node);
    forwardable_store(graph, graph.input_origin(node, 0), &states, load_ty)
}

fn normalize_load(graph: &mut Graph, node: NodeId, op: &Operation) -> bool {
    let flags = graph.normal_forms.load;
    let alignment = match op {
        Operation::Load { alignment, .. } => *alignment,
        _ => unreachable!(),
    };
    let addr = graph.input_origin(node, 0);
    let states = load_states(graph, node);

    if flags.load_mux {
        if let Some(mux) = is_state_mux_reducible(graph, &states) {
            let inner_states = mux_operand_origins(graph, mux);
            let loaded = create_load(graph, addr, &inner_states, alignment);
            let mut outs = vec![loaded[0]];
            outs.extend(create_mux(graph, &loaded[1..], states.len() as u32));
            graph.divert_node_users(node, &outs);
            graph.remove_node(node);
            if graph.is_unused(mux) {
                graph.remove_node(mux);
            }
            return false;
        }
    }

    if flags.load_store {
        if let Some(prev) = is_load_store_reducible(graph, node, op) {
            let mut outs = vec![graph.input_origin(prev, 1)];
            outs.extend(states.iter().copied());
            graph.divert_node_users(node, &outs);
            graph.remove_node(node);
            return false;
        }
    }

    if flags.load_alloca {
        if let Some(alloca_state) = is_alloca_reducible(graph, addr, &states, 1) {
            let loaded = create_load(graph, addr, &[alloca_state], alignment);
            let mut outs = vec![loaded[0]];
            outs.extend(
                states.iter().map(|&s| if s == alloca_state { loaded[1] } else { s }),
            );
            graph.divert_node_users(node, &outs);
            graph.remove_node(node);
            return false;
        }
    }

    if flags.load_load_state {
        let rerouted: Vec<Origin> = states
            .iter()
            .map(|&s| match s {
                Origin::Output { node: producer, index } if index >= 1 => {
                    match graph.node_kind(producer) {
                        NodeKind::Simple(op) if op.is_load() => {
                            // Loads commute; read the state the other load
                            // consumed.
                            graph.input_origin(producer, index)
                        }
                        _ => s,
                    }
                }
                _ => s,
            })
            .collect();
        if rerouted != states {
            let loaded = create_load(graph, addr, &rerouted, alignment);
            graph.divert_node_users(node, &loaded);
            graph.remove_node(node);
            return false;
        }
    }

    if flags.multiple_origin && has_multiple_origins(&states) {
        let deduped = dedup(&states);
        let loaded = create_load(graph, addr, &deduped, alignment);
        let mut mapped = vec![loaded[0]];
        mapped.extend(
            states
                .iter()
                .map(|s| loaded[1 + deduped.iter().position(|d| d == s).unwrap()]),
        );
        graph.divert_node_users(node, &mapped);
        graph.remove_node(node);
        return false;
    }

    true
}

fn normalize_mux(graph: &mut Graph, node: NodeId) -> bool {
    let flags = graph.normal_forms.mux;
    let operands = mux_operand_origins(graph, node);
    let nresults = graph.noutputs(node) as u32;

    if flags.mux_mux {
        if let Some(inner) = spliceable_mux(graph, &operands) {
            let spliced = splice_mux_operands(graph, &operands, inner);
            let outs = create_mux(graph, &spliced, nresults);
            graph.divert_node_users(node, &outs);
            graph.remove_node(node);
            if graph.is_unused(inner) {
                graph.remove_node(inner);
            }
            return false;
        }
    }

    if flags.multiple_origin && has_multiple_origins(&operands) {
        let deduped = dedup(&operands);
        let outs = create_mux(graph, &deduped, nresults);
        graph.divert_node_users(node, &outs);
        graph.remove_node(node);
        return false;
    }

    true
}

/// Applies the enabled rules everywhere until no rule matches.
pub fn normalize(graph: &mut Graph) {
    loop {
        let mut changed = false;
        let mut regions = vec![graph.root()];
        while let Some(region) = regions.pop() {
            for node in graph.region_nodes(region) {
                if !graph.node_exists(node) {
                    continue;
                }
                regions.extend(graph.subregions(node));
                if !normalize_node(graph, node) {
                    changed = true;
                }
            }
        }
        if !changed {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylva_ir::Operation;

    fn setup() -> (Graph, Origin, Origin, Origin, Origin) {
        // An address and value from imports, two independent state edges.
        let mut graph = Graph::new();
        let addr = graph.add_import(Type::pointer(Type::bits(32)), "p");
        let value = graph.add_import(Type::bits(32), "v");
        let s1 = graph.add_import(Type::MemState, "s1");
        let s2 = graph.add_import(Type::MemState, "s2");
        (graph, addr, value, s1, s2)
    }

    #[test]
    fn store_mux_pushes_store_past_mux() {
        let (mut graph, addr, value, s1, s2) = setup();
        let muxed = create_mux(&mut graph, &[s1, s2], 1);
        let outs = create_store(&mut graph, addr, value, &muxed, 4);
        assert_eq!(outs.len(), 1);

        // The store reads s1 and s2 directly; a mux merges its outputs.
        let mux_node = graph.origin_node(outs[0]).unwrap();
        assert!(graph.node_kind(mux_node).operation().unwrap().is_mem_state_mux());
        let store_node = graph.origin_node(graph.input_origin(mux_node, 0)).unwrap();
        assert!(graph.node_kind(store_node).operation().unwrap().is_store());
        assert_eq!(graph.input_origin(store_node, 2), s1);
        assert_eq!(graph.input_origin(store_node, 3), s2);
        graph.verify();
    }

    #[test]
    fn store_mux_disabled_keeps_mux() {
        let (mut graph, addr, value, s1, s2) = setup();
        graph.normal_forms.store.store_mux = false;
        let muxed = create_mux(&mut graph, &[s1, s2], 1);
        let outs = create_store(&mut graph, addr, value, &muxed, 4);
        let store_node = graph.origin_node(outs[0]).unwrap();
        assert!(graph.node_kind(store_node).operation().unwrap().is_store());
        assert_eq!(graph.input_origin(store_node, 2), muxed[0]);
    }

    #[test]
    fn store_store_drops_earlier_store() {
        let (mut graph, addr, value, s1, _) = setup();
        let v1 = graph.add_import(Type::bits(32), "v1");
        graph.normal_forms.store.store_store = false; // build the chain first
        let first = create_store(&mut graph, addr, v1, &[s1], 4);
        let second_node = {
            let mut operands = vec![addr, value];
            operands.extend_from_slice(&first);
            graph.add_simple_node(
                graph.root(),
                Operation::store(Type::bits(32), 4, 1),
                &operands,
            )
        };
        let result = graph.add_export(Origin::Output { node: second_node, index: 0 }, "s");

        graph.normal_forms.store.store_store = true;
        assert!(!normalize_node(&mut graph, second_node));

        // One store remains, reading s1 directly, last value wins.
        let final_origin = graph.result_origin(graph.root(), result);
        let store = graph.origin_node(final_origin).unwrap();
        assert!(graph.node_kind(store).operation().unwrap().is_store());
        assert_eq!(graph.input_origin(store, 1), value);
        assert_eq!(graph.input_origin(store, 2), s1);
        assert_eq!(graph.region_nnodes(graph.root()), 1);
        graph.verify();
    }

    #[test]
    fn store_duplicate_state_is_deduplicated() {
        let (mut graph, addr, value, s1, s2) = setup();
        let outs = create_store(&mut graph, addr, value, &[s1, s1, s2], 4);
        // store(p, v, s, s, t) -> store(p, v, s, t)
        assert_eq!(outs.len(), 2);
        let store = graph.origin_node(outs[0]).unwrap();
        assert_eq!(graph.ninputs(store), 4);
        assert_eq!(graph.input_origin(store, 2), s1);
        assert_eq!(graph.input_origin(store, 3), s2);
    }

    #[test]
    fn store_alloca_requires_single_state_user() {
        let (mut graph, _, value, s1, _) = setup();
        let alloca = graph.add_simple_node(
            graph.root(),
            Operation::Alloca { ty: Type::bits(32), alignment: 4 },
            &[],
        );
        let addr = Origin::Output { node: alloca, index: 0 };
        let alloca_state = Origin::Output { node: alloca, index: 1 };

        // A second consumer of the alloca state blocks the rule.
        let blocker = create_mux(&mut graph, &[alloca_state, s1], 1);
        let outs = create_store(&mut graph, addr, value, &[alloca_state, s1], 4);
        let store = graph.origin_node(outs[0]).unwrap();
        assert_eq!(graph.ninputs(store), 4, "rule must not fire with two state users");
        assert!(graph.nusers(blocker[0]) == 0);
    }

    #[test]
    fn store_alloca_splits_unrelated_states() {
        let (mut graph, _, value, s1, _) = setup();
        let alloca = graph.add_simple_node(
            graph.root(),
            Operation::Alloca { ty: Type::bits(32), alignment: 4 },
            &[],
        );
        let addr = Origin::Output { node: alloca, index: 0 };
        let alloca_state = Origin::Output { node: alloca, index: 1 };

        let outs = create_store(&mut graph, addr, value, &[alloca_state, s1], 4);
        assert_eq!(outs.len(), 2);
        // The store orders against the alloca state only; s1 passes through.
        assert_eq!(outs[1], s1);
        let store = graph.origin_node(outs[0]).unwrap();
        assert_eq!(graph.ninputs(store), 3);
        assert_eq!(graph.input_origin(store, 2), alloca_state);
        graph.verify();
    }

    #[test]
    fn load_store_forwards_value() {
        let (mut graph, addr, value, s1, _) = setup();
        let stored = create_store(&mut graph, addr, value, &[s1], 4);
        let loaded = {
            let mut operands = vec![addr];
            operands.extend_from_slice(&stored);
            let node = graph.add_simple_node(
                graph.root(),
                Operation::load(Type::bits(32), 4, 1),
                &operands,
            );
            node
        };
        let value_export =
            graph.add_export(Origin::Output { node: loaded, index: 0 }, "out");

        assert!(!normalize_node(&mut graph, loaded));
        // The load is gone; its value users read the stored value.
        assert_eq!(graph.result_origin(graph.root(), value_export), value);
        graph.verify();
    }

    #[test]
    fn load_load_state_reroutes_states() {
        let (mut graph, addr, _, s1, _) = setup();
        graph.normal_forms.load.load_load_state = false;
        let first = create_load(&mut graph, addr, &[s1], 4);
        let second = {
            let node = graph.add_simple_node(
                graph.root(),
                Operation::load(Type::bits(32), 4, 1),
                &[addr, first[1]],
            );
            node
        };
        graph.normal_forms.load.load_load_state = true;

        assert!(!normalize_node(&mut graph, second));
        // Both loads now read s1 directly.
        let first_node = graph.origin_node(first[0]).unwrap();
        assert_eq!(graph.input_origin(first_node, 1), s1);
        let remaining: Vec<NodeId> = graph
            .region_nodes(graph.root())
            .into_iter()
            .filter(|&n| graph.node_kind(n).operation().unwrap().is_load())
            .collect();
        assert_eq!(remaining.len(), 2);
        for load in remaining {
            assert_eq!(graph.input_origin(load, 1), s1);
        }
        graph.verify();
    }

    #[test]
    fn mux_mux_flattens() {
        let (mut graph, _, _, s1, s2) = setup();
        let s3 = graph.add_import(Type::MemState, "s3");
        graph.normal_forms.mux.mux_mux = false;
        let inner = create_mux(&mut graph, &[s1, s2], 1);
        graph.normal_forms.mux.mux_mux = true;
        let outer = create_mux(&mut graph, &[inner[0], s3], 1);

        let node = graph.origin_node(outer[0]).unwrap();
        assert_eq!(graph.ninputs(node), 3);
        assert_eq!(graph.input_origin(node, 0), s1);
        assert_eq!(graph.input_origin(node, 1), s2);
        assert_eq!(graph.input_origin(node, 2), s3);
    }

    #[test]
    fn immutable_graph_is_never_rewritten() {
        let (mut graph, addr, value, s1, s2) = setup();
        graph.set_mutable(false);
        let muxed_node = graph.add_simple_node(
            graph.root(),
            Operation::MemStateMux { noperands: 2, nresults: 1 },
            &[s1, s2],
        );
        let store_node = graph.add_simple_node(
            graph.root(),
            Operation::store(Type::bits(32), 4, 1),
            &[addr, value, Origin::Output { node: muxed_node, index: 0 }],
        );
        assert!(normalize_node(&mut graph, store_node));
        assert_eq!(graph.region_nnodes(graph.root()), 2);
    }

    #[test]
    fn normalize_reaches_fixed_point() {
        let (mut graph, addr, value, s1, s2) = setup();
        graph.set_mutable(false);
        let mux = graph.add_simple_node(
            graph.root(),
            Operation::MemStateMux { noperands: 2, nresults: 1 },
            &[s1, s2],
        );
        let store = graph.add_simple_node(
            graph.root(),
            Operation::store(Type::bits(32), 4, 1),
            &[addr, value, Origin::Output { node: mux, index: 0 }],
        );
        graph.add_export(Origin::Output { node: store, index: 0 }, "s");

        graph.set_mutable(true);
        normalize(&mut graph);

        // Fixed point: store past the mux, then nothing more fires.
        let out = graph.result_origin(graph.root(), 0);
        let mux_node = graph.origin_node(out).unwrap();
        assert!(graph.node_kind(mux_node).operation().unwrap().is_mem_state_mux());
        normalize(&mut graph);
        graph.verify();
    }
}
