//! The points-to graph: the result type of alias analysis.
//!
//! Nodes are allocation sites (keyed by the RVSDG node that allocates),
//! imports (keyed by the root-region argument index), registers (keyed by
//! the pointer-typed RVSDG origin), and a single `unknown` sink created at
//! construction. An edge means "may point to" and always targets a memory
//! node (allocation, import, or unknown).
//!
//! Insertion is idempotent on the identifying key. Lookups on absent keys
//! are recoverable errors -- callers decide whether to create on demand.

use std::fmt::Write;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use sylva_rvsdg::{NodeId, Origin};

/// Handle of a node within one [`PointsToGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PtgNodeId(u32);

/// The node taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtgNodeKind {
    /// An allocation site, identified by its producing RVSDG node.
    Allocation { node: NodeId },
    /// An imported symbol's storage, identified by the root argument index.
    Import { argument: usize },
    /// A pointer-typed RVSDG value.
    Register { origin: Origin },
    /// The unique "anything" sink.
    Unknown,
}

impl PtgNodeKind {
    /// Memory nodes are valid edge targets.
    pub fn is_memory_node(&self) -> bool {
        !matches!(self, PtgNodeKind::Register { .. })
    }
}

/// Lookup failures on the points-to graph.
#[derive(Debug, Error)]
pub enum PointsToError {
    #[error("no allocation node for rvsdg node {node:?}")]
    AllocationNotFound { node: NodeId },

    #[error("no import node for root argument {argument}")]
    ImportNotFound { argument: usize },

    #[error("no register node for origin {origin:?}")]
    RegisterNotFound { origin: Origin },
}

#[derive(Debug)]
struct PtgNodeData {
    kind: PtgNodeKind,
    targets: IndexSet<PtgNodeId>,
    sources: IndexSet<PtgNodeId>,
}

/// The may-point-to graph.
#[derive(Debug)]
pub struct PointsToGraph {
    nodes: Vec<PtgNodeData>,
    allocations: IndexMap<NodeId, PtgNodeId>,
    imports: IndexMap<usize, PtgNodeId>,
    registers: IndexMap<Origin, PtgNodeId>,
    unknown: PtgNodeId,
}

impl Default for PointsToGraph {
    fn default() -> Self {
        PointsToGraph::new()
    }
}

impl PointsToGraph {
    pub fn new() -> Self {
        let mut graph = PointsToGraph {
            nodes: vec![],
            allocations: IndexMap::new(),
            imports: IndexMap::new(),
            registers: IndexMap::new(),
            unknown: PtgNodeId(0),
        };
        graph.unknown = graph.push(PtgNodeKind::Unknown);
        graph
    }

    fn push(&mut self, kind: PtgNodeKind) -> PtgNodeId {
        let id = PtgNodeId(self.nodes.len() as u32);
        self.nodes.push(PtgNodeData { kind, targets: IndexSet::new(), sources: IndexSet::new() });
        id
    }

    /// The unique unknown memory node.
    pub fn unknown(&self) -> PtgNodeId {
        self.unknown
    }

    pub fn kind(&self, id: PtgNodeId) -> PtgNodeKind {
        self.nodes[id.0 as usize].kind
    }

    // -----------------------------------------------------------------------
    // Keyed, idempotent insertion
    // -----------------------------------------------------------------------

    pub fn add_allocation(&mut self, node: NodeId) -> PtgNodeId {
        if let Some(&id) = self.allocations.get(&node) {
            return id;
        }
        let id = self.push(PtgNodeKind::Allocation { node });
        self.allocations.insert(node, id);
        id
    }

    pub fn add_import(&mut self, argument: usize) -> PtgNodeId {
        if let Some(&id) = self.imports.get(&argument) {
            return id;
        }
        let id = self.push(PtgNodeKind::Import { argument });
        self.imports.insert(argument, id);
        id
    }

    pub fn add_register(&mut self, origin: Origin) -> PtgNodeId {
        if let Some(&id) = self.registers.get(&origin) {
            return id;
        }
        let id = self.push(PtgNodeKind::Register { origin });
        self.registers.insert(origin, id);
        id
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    pub fn find_allocation(&self, node: NodeId) -> Result<PtgNodeId, PointsToError> {
        self.allocations
            .get(&node)
            .copied()
            .ok_or(PointsToError::AllocationNotFound { node })
    }

    pub fn find_import(&self, argument: usize) -> Result<PtgNodeId, PointsToError> {
        self.imports
            .get(&argument)
            .copied()
            .ok_or(PointsToError::ImportNotFound { argument })
    }

    pub fn find_register(&self, origin: Origin) -> Result<PtgNodeId, PointsToError> {
        self.registers
            .get(&origin)
            .copied()
            .ok_or(PointsToError::RegisterNotFound { origin })
    }

    pub fn nallocations(&self) -> usize {
        self.allocations.len()
    }

    pub fn nimports(&self) -> usize {
        self.imports.len()
    }

    pub fn nregisters(&self) -> usize {
        self.registers.len()
    }

    /// Total node count, the unknown sentinel included.
    pub fn nnodes(&self) -> usize {
        self.nodes.len()
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Adds a may-point-to edge. The target must be a memory node.
    pub fn add_edge(&mut self, source: PtgNodeId, target: PtgNodeId) {
        assert!(
            self.kind(target).is_memory_node(),
            "may-point-to edges target memory nodes"
        );
        self.nodes[source.0 as usize].targets.insert(target);
        self.nodes[target.0 as usize].sources.insert(source);
    }

    pub fn remove_edge(&mut self, source: PtgNodeId, target: PtgNodeId) {
        self.nodes[source.0 as usize].targets.shift_remove(&target);
        self.nodes[target.0 as usize].sources.shift_remove(&source);
    }

    /// May-point-to destinations, in insertion order.
    pub fn targets(&self, id: PtgNodeId) -> Vec<PtgNodeId> {
        self.nodes[id.0 as usize].targets.iter().copied().collect()
    }

    pub fn sources(&self, id: PtgNodeId) -> Vec<PtgNodeId> {
        self.nodes[id.0 as usize].sources.iter().copied().collect()
    }

    pub fn ntargets(&self, id: PtgNodeId) -> usize {
        self.nodes[id.0 as usize].targets.len()
    }

    // -----------------------------------------------------------------------
    // Debug output
    // -----------------------------------------------------------------------

    fn label(&self, id: PtgNodeId) -> String {
        match self.kind(id) {
            PtgNodeKind::Allocation { node } => format!("alloc[n{}]", node.0),
            PtgNodeKind::Import { argument } => format!("import[a{}]", argument),
            PtgNodeKind::Register { origin } => match origin {
                Origin::Output { node, index } => format!("reg[n{}.{}]", node.0, index),
                Origin::Argument { region, index } => format!("reg[r{}.{}]", region.0, index),
            },
            PtgNodeKind::Unknown => "unknown".to_string(),
        }
    }

    /// Graphviz dot rendering for debugging.
    pub fn to_dot(&self) -> String {
        let mut s = String::from("digraph ptg {\n");
        for (index, node) in self.nodes.iter().enumerate() {
            let shape = if node.kind.is_memory_node() { "box" } else { "oval" };
            let _ = writeln!(
                s,
                "  p{} [shape={}, label=\"{}\"];",
                index,
                shape,
                self.label(PtgNodeId(index as u32))
            );
        }
        for (index, node) in self.nodes.iter().enumerate() {
            for target in &node.targets {
                let _ = writeln!(s, "  p{} -> p{};", index, target.0);
            }
        }
        s.push_str("}\n");
        s
    }
}
