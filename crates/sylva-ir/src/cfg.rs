//! Per-function control-flow graphs.
//!
//! A [`Cfg`] wraps a petgraph `StableGraph` whose nodes are the entry node,
//! the exit node, and basic blocks, and whose edges carry an explicit ordinal
//! (`CfgEdge::index`). The ordinal encodes which switch case or branch
//! alternative an edge represents; ordinals on a node's out-edges are dense
//! `0..n`.
//!
//! All mutations go through `Cfg` methods so the invariants hold by
//! construction: exactly one entry with no in-edges, exactly one exit with no
//! out-edges, TAC insertions type-checked against the operation signature.
//! Removing a node that still has in-edges is a programmer error and panics.

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::Directed;
use serde::{Deserialize, Serialize};

use crate::tac::Tac;
use crate::types::Type;
use crate::variable::{Globals, Var, VarId, Variable};

/// Stable CFG node identifier. Maps to a petgraph `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CfgNodeId(pub u32);

impl From<NodeIndex<u32>> for CfgNodeId {
    fn from(idx: NodeIndex<u32>) -> Self {
        CfgNodeId(idx.index() as u32)
    }
}

impl From<CfgNodeId> for NodeIndex<u32> {
    fn from(id: CfgNodeId) -> Self {
        NodeIndex::new(id.0 as usize)
    }
}

/// A basic block: an ordered TAC list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicBlock {
    tacs: Vec<Tac>,
}

impl BasicBlock {
    pub fn tacs(&self) -> &[Tac] {
        &self.tacs
    }

    pub fn last(&self) -> Option<&Tac> {
        self.tacs.last()
    }

    pub(crate) fn extend_tacs(&mut self, tacs: Vec<Tac>) {
        self.tacs.extend(tacs);
    }
}

/// The three CFG node kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CfgNode {
    /// Unique entry; owns the function argument variables in order.
    Entry { arguments: Vec<VarId> },
    /// Unique exit; owns the function result variables in order.
    Exit { results: Vec<VarId> },
    /// An ordinary basic block.
    Block(BasicBlock),
}

/// Edge weight: the dense out-edge ordinal at the source node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CfgEdge {
    pub index: usize,
}

/// A per-function control-flow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cfg {
    graph: StableGraph<CfgNode, CfgEdge, Directed, u32>,
    entry: CfgNodeId,
    exit: CfgNodeId,
    variables: Vec<Variable>,
}

impl Default for Cfg {
    fn default() -> Self {
        Cfg::new()
    }
}

impl Cfg {
    /// Creates a CFG containing only entry -> exit.
    pub fn new() -> Self {
        let mut graph = StableGraph::new();
        let entry = CfgNodeId::from(graph.add_node(CfgNode::Entry { arguments: vec![] }));
        let exit = CfgNodeId::from(graph.add_node(CfgNode::Exit { results: vec![] }));
        graph.add_edge(entry.into(), exit.into(), CfgEdge { index: 0 });
        Cfg { graph, entry, exit, variables: vec![] }
    }

    pub fn entry(&self) -> CfgNodeId {
        self.entry
    }

    pub fn exit(&self) -> CfgNodeId {
        self.exit
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    /// Creates a fresh local variable with an auto-generated name.
    pub fn create_variable(&mut self, ty: Type) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(Variable::local(format!("v{}", id.0), ty));
        id
    }

    /// Creates a fresh local variable with an explicit name.
    pub fn create_named_variable(&mut self, name: impl Into<String>, ty: Type) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(Variable::local(name, ty));
        id
    }

    /// Creates a function argument variable and appends it to the entry node.
    pub fn create_argument(&mut self, name: impl Into<String>, ty: Type) -> VarId {
        let id = VarId(self.variables.len() as u32);
        let index = self.arguments().len() as u32;
        self.variables.push(Variable::argument(name, ty, index));
        match self.graph.node_weight_mut(self.entry.into()).unwrap() {
            CfgNode::Entry { arguments } => arguments.push(id),
            _ => unreachable!(),
        }
        id
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    pub fn nvariables(&self) -> usize {
        self.variables.len()
    }

    pub fn arguments(&self) -> &[VarId] {
        match self.graph.node_weight(self.entry.into()).unwrap() {
            CfgNode::Entry { arguments } => arguments,
            _ => unreachable!(),
        }
    }

    pub fn results(&self) -> &[VarId] {
        match self.graph.node_weight(self.exit.into()).unwrap() {
            CfgNode::Exit { results } => results,
            _ => unreachable!(),
        }
    }

    /// Sets the ordered result variables on the exit node.
    pub fn set_results(&mut self, results: Vec<VarId>) {
        match self.graph.node_weight_mut(self.exit.into()).unwrap() {
            CfgNode::Exit { results: r } => *r = results,
            _ => unreachable!(),
        }
    }

    // -----------------------------------------------------------------------
    // Nodes and TACs
    // -----------------------------------------------------------------------

    /// Appends a fresh, empty basic block.
    pub fn add_basic_block(&mut self) -> CfgNodeId {
        CfgNodeId::from(self.graph.add_node(CfgNode::Block(BasicBlock::default())))
    }

    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        self.graph.node_weight(id.into()).expect("node not in this CFG")
    }

    pub fn is_block(&self, id: CfgNodeId) -> bool {
        matches!(self.node(id), CfgNode::Block(_))
    }

    /// The TAC list of a basic block. Panics on entry/exit.
    pub fn tacs(&self, id: CfgNodeId) -> &[Tac] {
        match self.node(id) {
            CfgNode::Block(bb) => bb.tacs(),
            _ => panic!("entry and exit nodes carry no TACs"),
        }
    }

    /// Appends a type-checked TAC to a basic block.
    pub fn append_tac(&mut self, block: CfgNodeId, tac: Tac, globals: &Globals) {
        tac.check(|var| match var {
            Var::Local(id) => self.variables[id.0 as usize].ty.clone(),
            Var::Global(id) => globals.get(id).expect("unknown global in tac").ty.clone(),
        });
        match self.graph.node_weight_mut(block.into()).expect("node not in this CFG") {
            CfgNode::Block(bb) => bb.tacs.push(tac),
            _ => panic!("cannot append TACs to entry or exit"),
        }
    }

    /// Removes a node. Panics if it still has in-edges or is entry/exit.
    pub fn remove_node(&mut self, id: CfgNodeId) {
        assert!(id != self.entry && id != self.exit, "cannot remove entry or exit");
        assert_eq!(self.ninedges(id), 0, "cannot remove node with in-edges");
        self.remove_outedges(id);
        self.graph.remove_node(id.into());
    }

    pub fn nnodes(&self) -> usize {
        self.graph.node_count()
    }

    pub fn node_ids(&self) -> Vec<CfgNodeId> {
        self.graph.node_indices().map(CfgNodeId::from).collect()
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Adds an out-edge with the next dense ordinal; returns the ordinal.
    pub fn add_outedge(&mut self, src: CfgNodeId, sink: CfgNodeId) -> usize {
        let index = self.noutedges(src);
        self.graph.add_edge(src.into(), sink.into(), CfgEdge { index });
        index
    }

    /// Ordered out-edges of a node as `(ordinal, sink)`.
    pub fn outedges(&self, src: CfgNodeId) -> Vec<(usize, CfgNodeId)> {
        let mut edges: Vec<(usize, CfgNodeId)> = self
            .graph
            .edges(src.into())
            .map(|e| (e.weight().index, CfgNodeId::from(e.target())))
            .collect();
        edges.sort_by_key(|(index, _)| *index);
        edges
    }

    /// The sink of the out-edge with the given ordinal.
    pub fn outedge(&self, src: CfgNodeId, index: usize) -> CfgNodeId {
        self.outedges(src)
            .into_iter()
            .find(|(n, _)| *n == index)
            .map(|(_, sink)| sink)
            .expect("no out-edge with this ordinal")
    }

    pub fn noutedges(&self, src: CfgNodeId) -> usize {
        self.graph.edges(src.into()).count()
    }

    /// In-edges of a node as `(source, ordinal at the source)`.
    pub fn inedges(&self, sink: CfgNodeId) -> Vec<(CfgNodeId, usize)> {
        self.graph
            .edges_directed(sink.into(), petgraph::Direction::Incoming)
            .map(|e| (CfgNodeId::from(e.source()), e.weight().index))
            .collect()
    }

    pub fn ninedges(&self, sink: CfgNodeId) -> usize {
        self.graph
            .edges_directed(sink.into(), petgraph::Direction::Incoming)
            .count()
    }

    /// Retargets the out-edge `(src, index)` at a new sink, keeping the
    /// ordinal.
    pub fn redirect_outedge(&mut self, src: CfgNodeId, index: usize, new_sink: CfgNodeId) {
        let eid = self
            .graph
            .edges(src.into())
            .find(|e| e.weight().index == index)
            .map(|e| e.id())
            .expect("no out-edge with this ordinal");
        self.graph.remove_edge(eid);
        self.graph.add_edge(src.into(), new_sink.into(), CfgEdge { index });
    }

    /// Redirects every in-edge of `old` to `new`, preserving ordinals.
    pub fn divert_inedges(&mut self, old: CfgNodeId, new: CfgNodeId) {
        let inedges = self.inedges(old);
        for (src, index) in inedges {
            self.redirect_outedge(src, index, new);
        }
    }

    /// Removes all out-edges of a node.
    pub fn remove_outedges(&mut self, src: CfgNodeId) {
        let eids: Vec<_> = self.graph.edges(src.into()).map(|e| e.id()).collect();
        for eid in eids {
            self.graph.remove_edge(eid);
        }
    }

    // -----------------------------------------------------------------------
    // Verification
    // -----------------------------------------------------------------------

    /// Asserts the structural invariants: entry has no in-edges, exit has no
    /// out-edges, every node's out-edge ordinals are dense `0..n`.
    pub fn verify(&self) {
        assert_eq!(self.ninedges(self.entry), 0, "entry must have no in-edges");
        assert_eq!(self.noutedges(self.exit), 0, "exit must have no out-edges");
        for id in self.node_ids() {
            let mut ordinals: Vec<usize> =
                self.outedges(id).into_iter().map(|(n, _)| n).collect();
            ordinals.sort_unstable();
            for (expected, actual) in ordinals.into_iter().enumerate() {
                assert_eq!(expected, actual, "out-edge ordinals must be dense");
            }
        }
    }

    /// Read-only access to the underlying graph, for the structure analyses.
    pub fn graph(&self) -> &StableGraph<CfgNode, CfgEdge, Directed, u32> {
        &self.graph
    }

    pub(crate) fn node_mut_internal(&mut self, id: CfgNodeId) -> &mut CfgNode {
        self.graph.node_weight_mut(id.into()).expect("node not in this CFG")
    }
}
