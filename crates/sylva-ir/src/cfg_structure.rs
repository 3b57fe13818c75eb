//! Structural analyses over CFGs.
//!
//! Reachability and shape predicates (`is_closed`, `is_linear`,
//! `is_acyclic`), strongly connected components, the `straighten`/`prune`
//! cleanups, and the structural-reduction verifier behind
//! [`is_structured`]/[`is_proper_structured`].
//!
//! The verifier reduces a scratch copy of the graph with three rules until a
//! fixed point: self-loop removal, linear-chain contraction, and
//! branch-with-common-join collapse. The CFG is structured iff the copy
//! reduces to the single edge entry -> exit. *Proper* structure additionally
//! requires every branch alternative to pass through its own block -- no edge
//! from a branch head directly to the join -- which is exactly the shape the
//! restructuring pass establishes.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::{is_cyclic_directed, tarjan_scc};

use crate::cfg::{Cfg, CfgNode, CfgNodeId};

/// Nodes reachable from the entry node.
pub fn reachable(cfg: &Cfg) -> HashSet<CfgNodeId> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([cfg.entry()]);
    while let Some(node) = queue.pop_front() {
        if !seen.insert(node) {
            continue;
        }
        for (_, sink) in cfg.outedges(node) {
            queue.push_back(sink);
        }
    }
    seen
}

/// Every node is reachable from entry and every node reaches exit.
pub fn is_closed(cfg: &Cfg) -> bool {
    let fwd = reachable(cfg);
    if fwd.len() != cfg.nnodes() {
        return false;
    }

    // Backward reachability from exit.
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([cfg.exit()]);
    while let Some(node) = queue.pop_front() {
        if !seen.insert(node) {
            continue;
        }
        for (src, _) in cfg.inedges(node) {
            queue.push_back(src);
        }
    }
    seen.len() == cfg.nnodes()
}

/// The CFG is a single chain entry -> b1 -> ... -> bn -> exit.
pub fn is_linear(cfg: &Cfg) -> bool {
    cfg.node_ids().iter().all(|&id| {
        (id == cfg.exit() || cfg.noutedges(id) == 1) && (id == cfg.entry() || cfg.ninedges(id) == 1)
    })
}

pub fn is_acyclic(cfg: &Cfg) -> bool {
    !is_cyclic_directed(cfg.graph())
}

/// Non-trivial strongly connected components (more than one node, or a
/// single node with a self-edge).
pub fn sccs(cfg: &Cfg) -> Vec<Vec<CfgNodeId>> {
    tarjan_scc(cfg.graph())
        .into_iter()
        .map(|component| component.into_iter().map(CfgNodeId::from).collect::<Vec<_>>())
        .filter(|component: &Vec<CfgNodeId>| {
            component.len() > 1
                || component
                    .iter()
                    .any(|&n| cfg.outedges(n).iter().any(|&(_, sink)| sink == n))
        })
        .collect()
}

/// Merges every basic block with a single out-edge into a successor block
/// with a single in-edge. Runs to fixed point.
pub fn straighten(cfg: &mut Cfg) {
    loop {
        let candidate = cfg.node_ids().into_iter().find(|&b| {
            if !cfg.is_block(b) || cfg.noutedges(b) != 1 {
                return false;
            }
            let (_, sink) = cfg.outedges(b)[0];
            sink != b && cfg.is_block(sink) && cfg.ninedges(sink) == 1
        });

        let Some(b) = candidate else { break };
        let (_, sink) = cfg.outedges(b)[0];
        cfg.merge_into_predecessor(b, sink);
    }
}

/// Removes every node unreachable from entry.
pub fn prune(cfg: &mut Cfg) {
    let live = reachable(cfg);
    let dead: Vec<CfgNodeId> =
        cfg.node_ids().into_iter().filter(|id| !live.contains(id)).collect();
    for &id in &dead {
        cfg.remove_outedges(id);
    }
    for id in dead {
        cfg.remove_node(id);
    }
}

/// Structured: reduces to entry -> exit, allowing branch edges straight to
/// the join.
pub fn is_structured(cfg: &Cfg) -> bool {
    reduce(cfg, false)
}

/// Proper-structured: reduces to entry -> exit with every branch alternative
/// passing through a dedicated block. This is the shape RVSDG construction
/// requires (one block per gamma subregion, tail-controlled loops).
pub fn is_proper_structured(cfg: &Cfg) -> bool {
    reduce(cfg, true)
}

/// The scratch multigraph the reduction works on.
struct Scratch {
    entry: u32,
    exit: u32,
    nodes: HashSet<u32>,
    edges: Vec<(u32, u32)>,
}

impl Scratch {
    fn from_cfg(cfg: &Cfg) -> Self {
        let nodes: HashSet<u32> = cfg.node_ids().into_iter().map(|id| id.0).collect();
        let mut edges = vec![];
        for &id in &nodes {
            for (_, sink) in cfg.outedges(CfgNodeId(id)) {
                edges.push((id, sink.0));
            }
        }
        Scratch { entry: cfg.entry().0, exit: cfg.exit().0, nodes, edges }
    }

    fn out(&self, n: u32) -> Vec<u32> {
        self.edges.iter().filter(|&&(s, _)| s == n).map(|&(_, t)| t).collect()
    }

    fn nin(&self, n: u32) -> usize {
        self.edges.iter().filter(|&&(_, t)| t == n).count()
    }

    fn remove_node(&mut self, n: u32) {
        self.nodes.remove(&n);
        self.edges.retain(|&(s, t)| s != n && t != n);
    }

    /// Contracts edge (u, v): v's out-edges move to u, v disappears.
    fn contract(&mut self, u: u32, v: u32) {
        let vout = self.out(v);
        self.edges.retain(|&(s, t)| !(s == u && t == v) && s != v);
        for t in vout {
            self.edges.push((u, t));
        }
        self.nodes.remove(&v);
    }
}

fn reduce(cfg: &Cfg, proper: bool) -> bool {
    let mut g = Scratch::from_cfg(cfg);

    loop {
        let mut changed = false;

        // Self-loop removal.
        if let Some(pos) = g.edges.iter().position(|&(s, t)| s == t) {
            g.edges.remove(pos);
            changed = true;
        }

        // Linear contraction: u single-out to v, v single-in, v not exit.
        if !changed {
            let candidate = g.nodes.iter().copied().find_map(|u| {
                let out = g.out(u);
                if out.len() != 1 {
                    return None;
                }
                let v = out[0];
                if v == u || v == g.exit || g.nin(v) != 1 {
                    return None;
                }
                Some((u, v))
            });
            if let Some((u, v)) = candidate {
                g.contract(u, v);
                changed = true;
            }
        }

        // Branch collapse: b with >= 2 out-edges, all arms single-in
        // single-out blocks converging on one join. Non-proper mode also
        // accepts edges going straight to the join.
        if !changed {
            'branch: for b in g.nodes.iter().copied().collect::<Vec<_>>() {
                let out = g.out(b);
                if out.len() < 2 {
                    continue;
                }

                let mut join: Option<u32> = None;
                let mut arms = vec![];
                for a in &out {
                    let a = *a;
                    let target = if g.nin(a) == 1 && g.out(a).len() == 1 && a != g.exit && a != b {
                        arms.push(a);
                        g.out(a)[0]
                    } else if !proper {
                        // Edge straight to the join.
                        a
                    } else {
                        continue 'branch;
                    };
                    match join {
                        None => join = Some(target),
                        Some(t) if t == target => {}
                        Some(_) => continue 'branch,
                    }
                }
                let Some(join) = join else { continue };
                if join == b || arms.iter().any(|a| *a == join) {
                    continue;
                }
                if proper && arms.len() != out.len() {
                    continue;
                }

                for a in arms {
                    g.remove_node(a);
                }
                g.edges.retain(|&(s, _)| s != b);
                g.edges.push((b, join));
                changed = true;
                break;
            }
        }

        if !changed {
            break;
        }
    }

    g.nodes.len() == 2 && g.edges == vec![(g.entry, g.exit)]
}

impl Cfg {
    /// Appends `sink`'s TACs to `b`, moves `sink`'s out-edges onto `b`, and
    /// removes `sink`. Both must be basic blocks, `b -> sink` the only edge
    /// between them, and `sink` must have no other in-edges.
    pub(crate) fn merge_into_predecessor(&mut self, b: CfgNodeId, sink: CfgNodeId) {
        assert_eq!(self.ninedges(sink), 1);
        assert_eq!(self.noutedges(b), 1);

        let moved: Vec<_> = match self.node(sink) {
            CfgNode::Block(bb) => bb.tacs().to_vec(),
            _ => panic!("straighten only merges basic blocks"),
        };
        let succs = self.outedges(sink);
        self.remove_outedges(sink);
        self.remove_outedges(b);
        self.remove_node(sink);
        for (_, succ) in succs {
            self.add_outedge(b, succ);
        }
        self.append_tacs_raw(b, moved);
    }

    /// Appends already-checked TACs (used when moving TACs between blocks).
    pub(crate) fn append_tacs_raw(&mut self, block: CfgNodeId, tacs: Vec<crate::tac::Tac>) {
        match self.node_mut_internal(block) {
            CfgNode::Block(bb) => bb.extend_tacs(tacs),
            _ => panic!("cannot append TACs to entry or exit"),
        }
    }
}

/// Reverse post-order over the CFG, entry first. Unreachable nodes are
/// excluded.
pub fn reverse_postorder(cfg: &Cfg) -> Vec<CfgNodeId> {
    let mut order = vec![];
    let mut state: HashMap<CfgNodeId, u8> = HashMap::new();
    let mut stack = vec![(cfg.entry(), 0usize)];
    while let Some((node, edge)) = stack.pop() {
        if edge == 0 {
            if state.contains_key(&node) {
                continue;
            }
            state.insert(node, 1);
        }
        let outedges = cfg.outedges(node);
        if edge < outedges.len() {
            stack.push((node, edge + 1));
            let (_, sink) = outedges[edge];
            if !state.contains_key(&sink) {
                stack.push((sink, 0));
            }
        } else {
            order.push(node);
        }
    }
    order.reverse();
    order
}
