//! The inter-procedural graph.
//!
//! Maps unique symbol names to [`IpNode`]s: function nodes owning an optional
//! CFG, or data nodes owning a type and a constant-initializer TAC sequence.
//! Each node records its referenced symbols (call/use dependencies); the
//! graph computes strongly connected components in bottom-up (callee-first)
//! order for RVSDG construction and self-recursion detection.

use indexmap::{IndexMap, IndexSet};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};

use crate::cfg::Cfg;
use crate::error::IrError;
use crate::tac::TacSeq;
use crate::types::{FunctionType, Type};
use crate::variable::Linkage;

/// A function symbol: signature, linkage, export flag, and (for defined
/// functions) a CFG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionNode {
    pub name: String,
    pub fn_type: FunctionType,
    pub linkage: Linkage,
    pub exported: bool,
    pub cfg: Option<Cfg>,
    pub dependencies: IndexSet<String>,
}

/// A data symbol: type, linkage, constness, and an optional initializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataNode {
    pub name: String,
    pub ty: Type,
    pub linkage: Linkage,
    pub constant: bool,
    pub init: Option<TacSeq>,
    pub dependencies: IndexSet<String>,
}

/// An ip-graph node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IpNode {
    Function(FunctionNode),
    Data(DataNode),
}

impl IpNode {
    pub fn name(&self) -> &str {
        match self {
            IpNode::Function(f) => &f.name,
            IpNode::Data(d) => &d.name,
        }
    }

    pub fn dependencies(&self) -> &IndexSet<String> {
        match self {
            IpNode::Function(f) => &f.dependencies,
            IpNode::Data(d) => &d.dependencies,
        }
    }

    fn dependencies_mut(&mut self) -> &mut IndexSet<String> {
        match self {
            IpNode::Function(f) => &mut f.dependencies,
            IpNode::Data(d) => &mut d.dependencies,
        }
    }
}

/// Symbol name -> node mapping with dependency edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpGraph {
    nodes: IndexMap<String, IpNode>,
}

impl IpGraph {
    pub fn new() -> Self {
        IpGraph::default()
    }

    pub fn add(&mut self, node: IpNode) -> Result<(), IrError> {
        let name = node.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(IrError::DuplicateSymbol { name });
        }
        self.nodes.insert(name, node);
        Ok(())
    }

    /// Looks up a node over a stable string view.
    pub fn lookup(&self, name: &str) -> Result<&IpNode, IrError> {
        self.nodes.get(name).ok_or_else(|| IrError::UnknownSymbol { name: name.to_string() })
    }

    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut IpNode, IrError> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| IrError::UnknownSymbol { name: name.to_string() })
    }

    pub fn lookup_function(&self, name: &str) -> Result<&FunctionNode, IrError> {
        match self.lookup(name)? {
            IpNode::Function(f) => Ok(f),
            IpNode::Data(_) => {
                Err(IrError::WrongNodeKind { name: name.to_string(), expected: "function" })
            }
        }
    }

    pub fn lookup_function_mut(&mut self, name: &str) -> Result<&mut FunctionNode, IrError> {
        match self.lookup_mut(name)? {
            IpNode::Function(f) => Ok(f),
            IpNode::Data(_) => {
                Err(IrError::WrongNodeKind { name: name.to_string(), expected: "function" })
            }
        }
    }

    pub fn lookup_data_mut(&mut self, name: &str) -> Result<&mut DataNode, IrError> {
        match self.lookup_mut(name)? {
            IpNode::Data(d) => Ok(d),
            IpNode::Function(_) => {
                Err(IrError::WrongNodeKind { name: name.to_string(), expected: "data node" })
            }
        }
    }

    /// Records that `src` references `tgt`.
    pub fn add_dependency(&mut self, src: &str, tgt: &str) -> Result<(), IrError> {
        self.lookup(tgt)?;
        self.lookup_mut(src)?.dependencies_mut().insert(tgt.to_string());
        Ok(())
    }

    pub fn is_self_recursive(&self, name: &str) -> Result<bool, IrError> {
        Ok(self.lookup(name)?.dependencies().contains(name))
    }

    pub fn nnodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IpNode)> {
        self.nodes.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Strongly connected components in bottom-up order: every component
    /// appears after the components it depends on.
    pub fn sccs(&self) -> Vec<Vec<String>> {
        let mut graph = DiGraph::<(), ()>::new();
        let indices: IndexMap<&str, _> =
            self.nodes.keys().map(|name| (name.as_str(), graph.add_node(()))).collect();
        for (name, node) in &self.nodes {
            for dep in node.dependencies() {
                if let (Some(&src), Some(&tgt)) =
                    (indices.get(name.as_str()), indices.get(dep.as_str()))
                {
                    graph.add_edge(src, tgt, ());
                }
            }
        }

        // tarjan_scc returns components in reverse topological order of the
        // condensation, which with user -> dependency edges is callee-first.
        tarjan_scc(&graph)
            .into_iter()
            .map(|component| {
                component
                    .into_iter()
                    .map(|idx| self.nodes.get_index(idx.index()).unwrap().0.clone())
                    .collect()
            })
            .collect()
    }
}
