//! CFG restructuring.
//!
//! Transforms an arbitrary CFG -- irreducible loops and unstructured
//! branches included -- into proper-structured form: every loop becomes
//! tail-controlled with a unique header and a unique exit dispatcher, and
//! every branch joins at a single node with one block per alternative. The
//! result admits direct translation to theta/gamma nodes.
//!
//! Loops: per strongly connected component, classify entry, exit, and
//! repetition edges. A component that is already a tail-controlled loop is
//! left untouched. Otherwise a fresh selector variable `q` routes entries
//! through a loop-entry dispatcher and exits through an exit dispatcher,
//! and a repeat flag `r` drives the synthesized tail. Nested components are
//! restructured recursively with the back edge masked out.
//!
//! Branches: walking from the region entry, each branch head's join is its
//! immediate post-dominator. Arms that are disjoint and exit only into the
//! join are recursed into directly. Side entries and shared arm suffixes are
//! routed through an auxiliary selector `p` and a join dispatcher: every
//! edge from the branch construct into a continuation target is replaced by
//! an assignment block setting `p`, converging on a dispatcher that
//! switches on `p`. Empty alternatives get a dedicated block either way.
//!
//! Restructuring is total: any finite CFG comes out proper-structured. Node
//! counts may grow; no partial results.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use petgraph::algo::{dominators, tarjan_scc};
use petgraph::graph::DiGraph;

use sylva_ir::cfg::{Cfg, CfgNodeId};
use sylva_ir::ops::Operation;
use sylva_ir::tac::Tac;
use sylva_ir::types::Type;
use sylva_ir::variable::{Globals, Var, VarId};

/// An edge addressed as (source, out-edge ordinal); stable across rewrites
/// of other edges.
pub(crate) type Edge = (CfgNodeId, usize);

/// Restructures loops, then branches.
pub fn restructure(cfg: &mut Cfg, globals: &Globals) {
    restructure_loops(cfg, globals);
    restructure_branches(cfg, globals);
}

// ---------------------------------------------------------------------------
// Loop restructuring
// ---------------------------------------------------------------------------

pub fn restructure_loops(cfg: &mut Cfg, globals: &Globals) {
    let all: IndexSet<CfgNodeId> = cfg.node_ids().into_iter().collect();
    process_components(cfg, globals, &all, &HashSet::new());
}

fn process_components(
    cfg: &mut Cfg,
    globals: &Globals,
    subset: &IndexSet<CfgNodeId>,
    masked: &HashSet<Edge>,
) {
    for component in subgraph_sccs(cfg, subset, masked) {
        let Some((body, back_edge)) = restructure_component(cfg, globals, &component, masked)
        else {
            continue;
        };
        let mut masked = masked.clone();
        masked.insert(back_edge);
        process_components(cfg, globals, &body, &masked);
    }
}

/// Non-trivial SCCs of the subgraph induced by `subset` minus `masked`
/// edges.
pub(crate) fn subgraph_sccs(
    cfg: &Cfg,
    subset: &IndexSet<CfgNodeId>,
    masked: &HashSet<Edge>,
) -> Vec<IndexSet<CfgNodeId>> {
    let mut graph = DiGraph::<CfgNodeId, ()>::new();
    let indices: HashMap<CfgNodeId, _> =
        subset.iter().map(|&id| (id, graph.add_node(id))).collect();
    for &id in subset {
        for (ordinal, sink) in cfg.outedges(id) {
            if masked.contains(&(id, ordinal)) {
                continue;
            }
            if let Some(&target) = indices.get(&sink) {
                graph.add_edge(indices[&id], target, ());
            }
        }
    }
    tarjan_scc(&graph)
        .into_iter()
        .map(|component| {
            component.into_iter().map(|idx| graph[idx]).collect::<IndexSet<CfgNodeId>>()
        })
        .filter(|component| {
            component.len() > 1 || {
                let &only = component.iter().next().unwrap();
                cfg.outedges(only)
                    .into_iter()
                    .any(|(ordinal, sink)| sink == only && !masked.contains(&(only, ordinal)))
            }
        })
        .collect()
}

struct ComponentEdges {
    entry_edges: Vec<Edge>,
    entries: IndexSet<CfgNodeId>,
    exit_edges: Vec<Edge>,
    exits: IndexSet<CfgNodeId>,
    repetition_edges: Vec<Edge>,
}

fn classify(cfg: &Cfg, component: &IndexSet<CfgNodeId>, masked: &HashSet<Edge>) -> ComponentEdges {
    let mut edges = ComponentEdges {
        entry_edges: vec![],
        entries: IndexSet::new(),
        exit_edges: vec![],
        exits: IndexSet::new(),
        repetition_edges: vec![],
    };
    // Entries first, so repetition edges (which target entries) see them.
    for &node in component {
        for (source, ordinal) in cfg.inedges(node) {
            if !component.contains(&source) && !masked.contains(&(source, ordinal)) {
                edges.entry_edges.push((source, ordinal));
                edges.entries.insert(node);
            }
        }
    }
    for &node in component {
        for (ordinal, sink) in cfg.outedges(node) {
            if masked.contains(&(node, ordinal)) {
                continue;
            }
            if !component.contains(&sink) {
                edges.exit_edges.push((node, ordinal));
                edges.exits.insert(sink);
            } else if edges.entries.contains(&sink) {
                edges.repetition_edges.push((node, ordinal));
            }
        }
    }
    edges
}

/// The (header, back edge) of a component that already is a tail-controlled
/// loop. Every component of a restructured CFG satisfies this.
pub(crate) fn tail_controlled_component(
    cfg: &Cfg,
    component: &IndexSet<CfgNodeId>,
    masked: &HashSet<Edge>,
) -> Option<(CfgNodeId, Edge)> {
    tail_controlled(cfg, &classify(cfg, component, masked))
}

/// A component that is already a tail-controlled loop: one entry node, one
/// repetition edge from a tail whose only other edge is the single exit.
fn tail_controlled(cfg: &Cfg, edges: &ComponentEdges) -> Option<(CfgNodeId, Edge)> {
    if edges.entries.len() != 1 || edges.repetition_edges.len() != 1 || edges.exits.len() != 1 {
        return None;
    }
    let (tail, ordinal) = edges.repetition_edges[0];
    if cfg.noutedges(tail) != 2 {
        return None;
    }
    if !edges.exit_edges.iter().all(|&(source, _)| source == tail) {
        return None;
    }
    let header = *edges.entries.iter().next().unwrap();
    Some((header, (tail, ordinal)))
}

/// Restructures one component into a tail-controlled loop. Returns the loop
/// body node set and the unique back edge.
fn restructure_component(
    cfg: &mut Cfg,
    globals: &Globals,
    component: &IndexSet<CfgNodeId>,
    masked: &HashSet<Edge>,
) -> Option<(IndexSet<CfgNodeId>, Edge)> {
    let edges = classify(cfg, component, masked);

    // Only closed CFGs are restructured; a component without entry or exit
    // edges is unreachable or endless and is left alone.
    if edges.entries.is_empty() || edges.exits.is_empty() {
        return None;
    }

    if let Some((_, back_edge)) = tail_controlled(cfg, &edges) {
        return Some((component.clone(), back_edge));
    }

    let mut body = component.clone();
    let entries: Vec<CfgNodeId> = edges.entries.iter().copied().collect();
    let exits: Vec<CfgNodeId> = edges.exits.iter().copied().collect();
    let multiple_entries = entries.len() > 1;
    let multiple_exits = exits.len() > 1;

    // Selector and repeat-flag variables.
    let q = cfg.create_named_variable("q", Type::bits(32));
    let r = cfg.create_named_variable("r", Type::bits(1));

    // Loop-entry dispatcher: switches on q to the former entries. With a
    // single entry the entry node itself stays the header.
    let header = if multiple_entries {
        let vt = dispatcher(cfg, globals, q, &entries);
        body.insert(vt);
        vt
    } else {
        entries[0]
    };

    // Exit dispatcher.
    let continuation = if multiple_exits {
        dispatcher(cfg, globals, q, &exits)
    } else {
        exits[0]
    };

    // The synthesized tail: branch on r, alternative 0 leaves the loop,
    // alternative 1 repeats.
    let tail = cfg.add_basic_block();
    body.insert(tail);
    let c = cfg.create_variable(Type::control(2));
    cfg.append_tac(
        tail,
        Tac::new(
            Operation::Match { nbits: 1, mapping: vec![(0, 0)], default: 1, alternatives: 2 },
            vec![Var::Local(r)],
            vec![Var::Local(c)],
        ),
        globals,
    );
    cfg.append_tac(
        tail,
        Tac::new(Operation::Branch { alternatives: 2 }, vec![Var::Local(c)], vec![]),
        globals,
    );
    assert_eq!(cfg.add_outedge(tail, continuation), 0);
    let back_ordinal = cfg.add_outedge(tail, header);
    let back_edge = (tail, back_ordinal);

    // Entry edges: set q, jump to the header.
    for &(source, ordinal) in &edges.entry_edges {
        let target = cfg.outedge(source, ordinal);
        let position = entries.iter().position(|&e| e == target).unwrap();
        let block = cfg.add_basic_block();
        if multiple_entries {
            assign_const(cfg, globals, block, q, position as u64);
        }
        cfg.redirect_outedge(source, ordinal, block);
        cfg.add_outedge(block, header);
    }

    // Repetition edges: set q for the next entry, raise r, go to the tail.
    for &(source, ordinal) in &edges.repetition_edges {
        let target = cfg.outedge(source, ordinal);
        let position = entries.iter().position(|&e| e == target).unwrap();
        let block = cfg.add_basic_block();
        body.insert(block);
        if multiple_entries {
            assign_const(cfg, globals, block, q, position as u64);
        }
        assign_const_width(cfg, globals, block, r, 1, 1);
        cfg.redirect_outedge(source, ordinal, block);
        cfg.add_outedge(block, tail);
    }

    // Exit edges: set q for the continuation, clear r, go to the tail.
    for &(source, ordinal) in &edges.exit_edges {
        let target = cfg.outedge(source, ordinal);
        let position = exits.iter().position(|&x| x == target).unwrap();
        let block = cfg.add_basic_block();
        body.insert(block);
        if multiple_exits {
            assign_const(cfg, globals, block, q, position as u64);
        }
        assign_const_width(cfg, globals, block, r, 1, 0);
        cfg.redirect_outedge(source, ordinal, block);
        cfg.add_outedge(block, tail);
    }

    Some((body, back_edge))
}

/// A block switching on `selector` to `targets` in order.
fn dispatcher(
    cfg: &mut Cfg,
    globals: &Globals,
    selector: VarId,
    targets: &[CfgNodeId],
) -> CfgNodeId {
    let block = cfg.add_basic_block();
    let alternatives = targets.len() as u32;
    let c = cfg.create_variable(Type::control(alternatives));
    cfg.append_tac(
        block,
        Tac::new(
            Operation::Match {
                nbits: 32,
                mapping: (0..alternatives as u64 - 1).map(|v| (v, v)).collect(),
                default: alternatives as u64 - 1,
                alternatives,
            },
            vec![Var::Local(selector)],
            vec![Var::Local(c)],
        ),
        globals,
    );
    cfg.append_tac(
        block,
        Tac::new(Operation::Branch { alternatives }, vec![Var::Local(c)], vec![]),
        globals,
    );
    for &target in targets {
        cfg.add_outedge(block, target);
    }
    block
}

fn assign_const(cfg: &mut Cfg, globals: &Globals, block: CfgNodeId, var: VarId, value: u64) {
    assign_const_width(cfg, globals, block, var, 32, value);
}

fn assign_const_width(
    cfg: &mut Cfg,
    globals: &Globals,
    block: CfgNodeId,
    var: VarId,
    width: u32,
    value: u64,
) {
    cfg.append_tac(
        block,
        Tac::new(Operation::BitConstant { width, value }, vec![], vec![Var::Local(var)]),
        globals,
    );
}

// ---------------------------------------------------------------------------
// Branch restructuring
// ---------------------------------------------------------------------------

/// Back edges of the (already loop-restructured) CFG: edges closing a cycle
/// on the DFS stack.
pub fn back_edges(cfg: &Cfg) -> HashSet<Edge> {
    let mut back = HashSet::new();
    let mut finished = HashSet::new();
    let mut on_stack = HashSet::new();
    // (node, next ordinal to explore)
    let mut stack = vec![(cfg.entry(), 0usize)];
    on_stack.insert(cfg.entry());
    while let Some(&(node, next)) = stack.last() {
        let outedges = cfg.outedges(node);
        if next < outedges.len() {
            stack.last_mut().unwrap().1 += 1;
            let (ordinal, sink) = outedges[next];
            if on_stack.contains(&sink) {
                back.insert((node, ordinal));
            } else if !finished.contains(&sink) {
                on_stack.insert(sink);
                stack.push((sink, 0));
            }
        } else {
            on_stack.remove(&node);
            finished.insert(node);
            stack.pop();
        }
    }
    back
}

pub fn restructure_branches(cfg: &mut Cfg, globals: &Globals) {
    let masked = back_edges(cfg);
    restructure_branch_region(cfg, globals, &masked, cfg.entry(), cfg.exit());
}

fn visible_outedges(cfg: &Cfg, masked: &HashSet<Edge>, node: CfgNodeId) -> Vec<(usize, CfgNodeId)> {
    cfg.outedges(node)
        .into_iter()
        .filter(|&(ordinal, _)| !masked.contains(&(node, ordinal)))
        .collect()
}

/// Immediate post-dominator of `node` in the back-edge-masked skeleton.
pub(crate) fn immediate_postdominator(
    cfg: &Cfg,
    masked: &HashSet<Edge>,
    node: CfgNodeId,
    exit: CfgNodeId,
) -> CfgNodeId {
    // Dominators of the reversed skeleton, rooted at the exit.
    let mut graph = DiGraph::<CfgNodeId, ()>::new();
    let indices: HashMap<CfgNodeId, _> =
        cfg.node_ids().into_iter().map(|id| (id, graph.add_node(id))).collect();
    for id in cfg.node_ids() {
        for (ordinal, sink) in cfg.outedges(id) {
            if !masked.contains(&(id, ordinal)) {
                graph.add_edge(indices[&sink], indices[&id], ());
            }
        }
    }
    let doms = dominators::simple_fast(&graph, indices[&exit]);
    let idom = doms
        .immediate_dominator(indices[&node])
        .expect("branch head must reach the exit");
    graph[idom]
}

/// Nodes reachable from `start` in the skeleton without passing through any
/// node of `stop`.
fn reachable_until(
    cfg: &Cfg,
    masked: &HashSet<Edge>,
    start: CfgNodeId,
    stop: &IndexSet<CfgNodeId>,
) -> IndexSet<CfgNodeId> {
    let mut seen = IndexSet::new();
    if stop.contains(&start) {
        return seen;
    }
    let mut queue = vec![start];
    while let Some(node) = queue.pop() {
        if !seen.insert(node) {
            continue;
        }
        for (_, sink) in visible_outedges(cfg, masked, node) {
            if !stop.contains(&sink) && !seen.contains(&sink) {
                queue.push(sink);
            }
        }
    }
    seen
}

fn restructure_branch_region(
    cfg: &mut Cfg,
    globals: &Globals,
    masked: &HashSet<Edge>,
    entry: CfgNodeId,
    exit: CfgNodeId,
) {
    let mut head = entry;
    loop {
        if head == exit {
            return;
        }
        let outs = visible_outedges(cfg, masked, head);
        match outs.len() {
            0 => return,
            1 => {
                head = outs[0].1;
                continue;
            }
            _ => {}
        }

        let join = immediate_postdominator(cfg, masked, head, exit);
        let stop = IndexSet::from([join]);
        let arms: Vec<IndexSet<CfgNodeId>> = outs
            .iter()
            .map(|&(_, sink)| reachable_until(cfg, masked, sink, &stop))
            .collect();

        if arms_are_structured(cfg, masked, head, join, &outs, &arms) {
            for &(ordinal, sink) in &outs {
                let arm_entry = if sink == join {
                    // An empty alternative still gets its own block.
                    let block = cfg.add_basic_block();
                    cfg.redirect_outedge(head, ordinal, block);
                    cfg.add_outedge(block, join);
                    block
                } else {
                    sink
                };
                restructure_branch_region(cfg, globals, masked, arm_entry, join);
            }
            head = join;
        } else {
            head = reroute_through_selector(cfg, globals, masked, head, join, &outs, &arms);
        }
    }
}

/// Structured: arms are pairwise disjoint, entered only through the branch
/// head, and leave only into the join.
fn arms_are_structured(
    cfg: &Cfg,
    masked: &HashSet<Edge>,
    head: CfgNodeId,
    join: CfgNodeId,
    outs: &[(usize, CfgNodeId)],
    arms: &[IndexSet<CfgNodeId>],
) -> bool {
    for (i, arm) in arms.iter().enumerate() {
        for (j, other) in arms.iter().enumerate() {
            if i != j && arm.iter().any(|n| other.contains(n)) {
                return false;
            }
        }
        for &node in arm {
            for (source, ordinal) in cfg.inedges(node) {
                if masked.contains(&(source, ordinal)) {
                    continue;
                }
                if node == outs[i].1 {
                    if source != head && !arm.contains(&source) {
                        return false;
                    }
                } else if !arm.contains(&source) {
                    return false;
                }
            }
            for (_, sink) in visible_outedges(cfg, masked, node) {
                if sink != join && !arm.contains(&sink) {
                    return false;
                }
            }
        }
    }
    true
}

/// Unstructured fallback: route every edge that leaves the branch construct
/// through an assignment to a fresh selector `p` converging on a dispatcher
/// that switches on `p`. Returns the dispatcher, which the caller continues
/// from.
fn reroute_through_selector(
    cfg: &mut Cfg,
    globals: &Globals,
    masked: &HashSet<Edge>,
    head: CfgNodeId,
    join: CfgNodeId,
    outs: &[(usize, CfgNodeId)],
    arms: &[IndexSet<CfgNodeId>],
) -> CfgNodeId {
    // Continuation targets: the join, plus every node shared between arms.
    let mut shared: IndexSet<CfgNodeId> = IndexSet::new();
    for (i, arm) in arms.iter().enumerate() {
        for &node in arm {
            if arms.iter().enumerate().any(|(j, other)| i != j && other.contains(&node)) {
                shared.insert(node);
            }
        }
    }
    let mut targets: IndexSet<CfgNodeId> = shared;
    targets.insert(join);

    // Clean arm nodes: reachable from an alternative without touching a
    // continuation target.
    let mut clean: IndexSet<CfgNodeId> = IndexSet::new();
    clean.insert(head);
    for &(_, sink) in outs {
        clean.extend(reachable_until(cfg, masked, sink, &targets));
    }

    let p = cfg.create_named_variable("p", Type::bits(32));
    let target_list: Vec<CfgNodeId> = targets.iter().copied().collect();
    let dispatcher = dispatcher(cfg, globals, p, &target_list);

    // Replace every edge from the construct into a continuation target.
    for &node in &clean {
        for (ordinal, sink) in visible_outedges(cfg, masked, node) {
            if let Some(position) = target_list.iter().position(|&t| t == sink) {
                let block = cfg.add_basic_block();
                assign_const(cfg, globals, block, p, position as u64);
                cfg.redirect_outedge(node, ordinal, block);
                cfg.add_outedge(block, dispatcher);
            }
        }
    }

    // The arms now converge on the dispatcher; recurse into each non-empty
    // alternative with the dispatcher as its join.
    for (_, sink) in visible_outedges(cfg, masked, head) {
        restructure_branch_region(cfg, globals, masked, sink, dispatcher);
    }
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylva_ir::cfg_structure::{is_proper_structured, sccs};

    fn empty_globals() -> Globals {
        Globals::new()
    }

    /// entry -> b1 -> {b2, b3} -> b4 -> exit
    #[test]
    fn acyclic_structured_is_untouched() {
        let globals = empty_globals();
        let mut cfg = Cfg::new();
        let b1 = cfg.add_basic_block();
        let b2 = cfg.add_basic_block();
        let b3 = cfg.add_basic_block();
        let b4 = cfg.add_basic_block();
        cfg.divert_inedges(cfg.exit(), b1);
        cfg.add_outedge(b1, b2);
        cfg.add_outedge(b1, b3);
        cfg.add_outedge(b2, b4);
        cfg.add_outedge(b3, b4);
        cfg.add_outedge(b4, cfg.exit());

        let nnodes = cfg.nnodes();
        restructure_branches(&mut cfg, &globals);

        assert_eq!(nnodes, cfg.nnodes());
        assert_eq!(cfg.outedge(b1, 0), b2);
        assert_eq!(cfg.outedge(b1, 1), b3);
        assert!(is_proper_structured(&cfg));
    }

    /// b1 -> {b2, b3}; b2 -> {b3, b4}; b3 -> b4: b3 is entered from two
    /// alternatives.
    #[test]
    fn acyclic_unstructured_becomes_proper() {
        let globals = empty_globals();
        let mut cfg = Cfg::new();
        let b1 = cfg.add_basic_block();
        let b2 = cfg.add_basic_block();
        let b3 = cfg.add_basic_block();
        let b4 = cfg.add_basic_block();
        cfg.divert_inedges(cfg.exit(), b1);
        cfg.add_outedge(b1, b2);
        cfg.add_outedge(b1, b3);
        cfg.add_outedge(b2, b3);
        cfg.add_outedge(b2, b4);
        cfg.add_outedge(b3, b4);
        cfg.add_outedge(b4, cfg.exit());

        restructure_branches(&mut cfg, &globals);
        cfg.verify();
        assert!(is_proper_structured(&cfg));
    }

    /// b1 -> b2; b2 -> {b2, b3}; b3 -> {b1, exit}: nested do-while loops,
    /// already tail-controlled.
    #[test]
    fn dowhile_is_preserved() {
        let globals = empty_globals();
        let mut cfg = Cfg::new();
        let b1 = cfg.add_basic_block();
        let b2 = cfg.add_basic_block();
        let b3 = cfg.add_basic_block();
        cfg.divert_inedges(cfg.exit(), b1);
        cfg.add_outedge(b1, b2);
        cfg.add_outedge(b2, b2);
        cfg.add_outedge(b2, b3);
        cfg.add_outedge(b3, b1);
        cfg.add_outedge(b3, cfg.exit());

        let nnodes = cfg.nnodes();
        restructure(&mut cfg, &globals);

        assert_eq!(nnodes, cfg.nnodes());
        assert_eq!(cfg.outedge(b2, 0), b2);
        assert_eq!(cfg.outedge(b3, 0), b1);
        assert!(is_proper_structured(&cfg));
    }

    /// b1 -> {exit-bound, b2}; b2 -> b1: a while loop; the exit edge leaves
    /// from the header, so a tail must be synthesized.
    #[test]
    fn while_loop_becomes_tail_controlled() {
        let globals = empty_globals();
        let mut cfg = Cfg::new();
        let b1 = cfg.add_basic_block();
        let b2 = cfg.add_basic_block();
        cfg.divert_inedges(cfg.exit(), b1);
        cfg.add_outedge(b1, cfg.exit());
        cfg.add_outedge(b1, b2);
        cfg.add_outedge(b2, b1);

        restructure(&mut cfg, &globals);
        cfg.verify();
        assert!(is_proper_structured(&cfg));
    }

    /// b1 -> {b2, b3}; b2 -> {b4, b3}; b3 -> {b2, b5}: an irreducible loop
    /// with two entries; a dispatcher must appear.
    #[test]
    fn irreducible_loop_gets_a_dispatcher() {
        let globals = empty_globals();
        let mut cfg = Cfg::new();
        let b1 = cfg.add_basic_block();
        let b2 = cfg.add_basic_block();
        let b3 = cfg.add_basic_block();
        let b4 = cfg.add_basic_block();
        let b5 = cfg.add_basic_block();
        cfg.divert_inedges(cfg.exit(), b1);
        cfg.add_outedge(b1, b2);
        cfg.add_outedge(b1, b3);
        cfg.add_outedge(b2, b4);
        cfg.add_outedge(b2, b3);
        cfg.add_outedge(b3, b2);
        cfg.add_outedge(b3, b5);
        cfg.add_outedge(b4, cfg.exit());
        cfg.add_outedge(b5, cfg.exit());

        let nnodes = cfg.nnodes();
        restructure(&mut cfg, &globals);

        cfg.verify();
        assert!(cfg.nnodes() > nnodes, "a dispatcher and routing blocks must be introduced");
        assert!(is_proper_structured(&cfg));
        // Exactly one loop remains, single-entry.
        assert_eq!(sccs(&cfg).len(), 1);
    }

    /// Unstructured acyclic region nested inside a do-while body.
    #[test]
    fn unstructured_region_inside_dowhile() {
        let globals = empty_globals();
        let mut cfg = Cfg::new();
        let b1 = cfg.add_basic_block();
        let b2 = cfg.add_basic_block();
        let b3 = cfg.add_basic_block();
        let b4 = cfg.add_basic_block();
        cfg.divert_inedges(cfg.exit(), b1);
        cfg.add_outedge(b1, b3);
        cfg.add_outedge(b1, b2);
        cfg.add_outedge(b2, b3);
        cfg.add_outedge(b2, b4);
        cfg.add_outedge(b3, b4);
        cfg.add_outedge(b4, b1);
        cfg.add_outedge(b4, cfg.exit());

        restructure(&mut cfg, &globals);
        cfg.verify();
        assert!(is_proper_structured(&cfg));
    }

    /// A short-circuit branch in front of a self-loop.
    #[test]
    fn lor_before_dowhile() {
        let globals = empty_globals();
        let mut cfg = Cfg::new();
        let b1 = cfg.add_basic_block();
        let b2 = cfg.add_basic_block();
        let b3 = cfg.add_basic_block();
        let b4 = cfg.add_basic_block();
        cfg.divert_inedges(cfg.exit(), b1);
        cfg.add_outedge(b1, b2);
        cfg.add_outedge(b1, b3);
        cfg.add_outedge(b2, b4);
        cfg.add_outedge(b2, b3);
        cfg.add_outedge(b3, b4);
        cfg.add_outedge(b4, cfg.exit());
        cfg.add_outedge(b4, b4);

        restructure(&mut cfg, &globals);
        cfg.verify();
        assert!(is_proper_structured(&cfg));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        /// Random CFGs: a handful of blocks with arbitrary edges, patched
        /// to be closed (every block reaches the exit, every block is
        /// reachable).
        fn arbitrary_cfg(
            nblocks: usize,
            edge_picks: Vec<(usize, usize)>,
        ) -> Cfg {
            let mut cfg = Cfg::new();
            let blocks: Vec<CfgNodeId> = (0..nblocks).map(|_| cfg.add_basic_block()).collect();
            cfg.divert_inedges(cfg.exit(), blocks[0]);
            for (from, to) in edge_picks {
                let from = blocks[from % nblocks];
                let to = blocks[to % nblocks];
                cfg.add_outedge(from, to);
            }
            // Patch closedness: every sink-less block goes to the exit;
            // unreachable blocks hang off the first block.
            for &block in &blocks {
                if cfg.noutedges(block) == 0 {
                    cfg.add_outedge(block, cfg.exit());
                }
            }
            let reachable = sylva_ir::cfg_structure::reachable(&cfg);
            for &block in &blocks {
                if !reachable.contains(&block) {
                    cfg.add_outedge(blocks[0], block);
                }
            }
            // Blocks that cannot reach the exit get an escape edge.
            loop {
                let mut exits_reaching = HashSet::new();
                let mut changed = true;
                exits_reaching.insert(cfg.exit());
                while changed {
                    changed = false;
                    for id in cfg.node_ids() {
                        if !exits_reaching.contains(&id)
                            && cfg.outedges(id).iter().any(|(_, s)| exits_reaching.contains(s))
                        {
                            exits_reaching.insert(id);
                            changed = true;
                        }
                    }
                }
                match cfg.node_ids().into_iter().find(|id| !exits_reaching.contains(id)) {
                    Some(stuck) => {
                        cfg.add_outedge(stuck, cfg.exit());
                    }
                    None => break,
                }
            }
            cfg
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            // Restructuring is total: any closed CFG comes out
            // proper-structured.
            #[test]
            fn restructuring_is_total(
                nblocks in 1usize..7,
                edges in prop::collection::vec((0usize..8, 0usize..8), 0..14),
            ) {
                let globals = Globals::new();
                let mut cfg = arbitrary_cfg(nblocks, edges);
                restructure(&mut cfg, &globals);
                cfg.verify();
                prop_assert!(is_proper_structured(&cfg));
            }
        }
    }
}
