//! The module: the top-level container of the symbolic IR.
//!
//! A [`Module`] owns the ip-graph, the global-variable arena, a string
//! identifier, a target-triple string, and a datalayout descriptor. All
//! symbol creation goes through `Module` methods so that every ip-graph node
//! has a matching global variable and the two stay consistent.
//!
//! Function types are *state-carrying*: `create_function` appends the I/O and
//! memory state types to both the argument and result lists, and creates the
//! corresponding state argument variables on the fresh CFG. States are
//! ordinary variables from the symbolic IR's point of view; construction
//! threads them into RVSDG state edges.

use std::collections::HashMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::cfg::Cfg;
use crate::error::IrError;
use crate::ipgraph::{DataNode, FunctionNode, IpGraph, IpNode};
use crate::tac::TacSeq;
use crate::types::{FunctionType, Type};
use crate::variable::{GlobalId, Globals, Linkage, Variable};

/// A compilation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub target_triple: String,
    pub data_layout: String,
    ipgraph: IpGraph,
    globals: Globals,
    symbols: HashMap<String, GlobalId>,
}

impl Module {
    pub fn new(
        name: impl Into<String>,
        target_triple: impl Into<String>,
        data_layout: impl Into<String>,
    ) -> Self {
        Module {
            name: name.into(),
            target_triple: target_triple.into(),
            data_layout: data_layout.into(),
            ipgraph: IpGraph::new(),
            globals: Globals::new(),
            symbols: HashMap::new(),
        }
    }

    pub fn ipgraph(&self) -> &IpGraph {
        &self.ipgraph
    }

    pub fn ipgraph_mut(&mut self) -> &mut IpGraph {
        &mut self.ipgraph
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// The global variable backing a symbol.
    pub fn symbol(&self, name: &str) -> Result<GlobalId, IrError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| IrError::UnknownSymbol { name: name.to_string() })
    }

    /// Resolves a global id back to its symbol name.
    pub fn symbol_name(&self, id: GlobalId) -> Result<&str, IrError> {
        self.globals
            .get(id)
            .map(|v| v.name.as_str())
            .ok_or(IrError::GlobalNotFound { id })
    }

    /// The state-carrying function type for the given value-level signature.
    pub fn state_carrying_fn_type(arguments: Vec<Type>, results: Vec<Type>) -> FunctionType {
        let mut arguments = arguments;
        arguments.push(Type::IoState);
        arguments.push(Type::MemState);
        let mut results = results;
        results.push(Type::IoState);
        results.push(Type::MemState);
        FunctionType::new(arguments, results)
    }

    /// Creates a defined function with an empty entry -> exit CFG and
    /// pre-created argument variables (value arguments first, then the I/O
    /// and memory state arguments).
    pub fn create_function(
        &mut self,
        name: &str,
        arguments: Vec<(String, Type)>,
        results: Vec<Type>,
        linkage: Linkage,
        exported: bool,
    ) -> Result<GlobalId, IrError> {
        let fn_type = Self::state_carrying_fn_type(
            arguments.iter().map(|(_, ty)| ty.clone()).collect(),
            results,
        );

        let mut cfg = Cfg::new();
        for (arg_name, ty) in &arguments {
            cfg.create_argument(arg_name.clone(), ty.clone());
        }
        cfg.create_argument("_io", Type::IoState);
        cfg.create_argument("_s", Type::MemState);

        self.ipgraph.add(IpNode::Function(FunctionNode {
            name: name.to_string(),
            fn_type: fn_type.clone(),
            linkage,
            exported,
            cfg: Some(cfg),
            dependencies: IndexSet::new(),
        }))?;

        let id = self.globals.create(Variable::global(name, Type::Function(fn_type), linkage));
        self.symbols.insert(name.to_string(), id);
        Ok(id)
    }

    /// Creates a defined function from a full (already state-carrying)
    /// signature, with argument variables `a0..an` pre-created on the fresh
    /// CFG. This is the entry point used when lowering from the RVSDG,
    /// where signatures carry their state types already.
    pub fn create_function_with_type(
        &mut self,
        name: &str,
        fn_type: FunctionType,
        linkage: Linkage,
        exported: bool,
    ) -> Result<GlobalId, IrError> {
        let mut cfg = Cfg::new();
        for (index, ty) in fn_type.arguments.iter().enumerate() {
            cfg.create_argument(format!("a{}", index), ty.clone());
        }
        self.ipgraph.add(IpNode::Function(FunctionNode {
            name: name.to_string(),
            fn_type: fn_type.clone(),
            linkage,
            exported,
            cfg: Some(cfg),
            dependencies: IndexSet::new(),
        }))?;
        let id = self.globals.create(Variable::global(name, Type::Function(fn_type), linkage));
        self.symbols.insert(name.to_string(), id);
        Ok(id)
    }

    /// Declares an external function (no CFG). The signature is taken as
    /// given; external declarations are expected to be state-carrying
    /// already.
    pub fn create_external_function(
        &mut self,
        name: &str,
        fn_type: FunctionType,
        linkage: Linkage,
    ) -> Result<GlobalId, IrError> {
        self.ipgraph.add(IpNode::Function(FunctionNode {
            name: name.to_string(),
            fn_type: fn_type.clone(),
            linkage,
            exported: false,
            cfg: None,
            dependencies: IndexSet::new(),
        }))?;
        let id = self.globals.create(Variable::global(name, Type::Function(fn_type), linkage));
        self.symbols.insert(name.to_string(), id);
        Ok(id)
    }

    /// Creates a data symbol. Its global variable has pointer type -- the
    /// symbol names the storage, not the value.
    pub fn create_data(
        &mut self,
        name: &str,
        ty: Type,
        linkage: Linkage,
        constant: bool,
    ) -> Result<GlobalId, IrError> {
        self.ipgraph.add(IpNode::Data(DataNode {
            name: name.to_string(),
            ty: ty.clone(),
            linkage,
            constant,
            init: None,
            dependencies: IndexSet::new(),
        }))?;
        let id = self.globals.create(Variable::global(name, Type::pointer(ty), linkage));
        self.symbols.insert(name.to_string(), id);
        Ok(id)
    }

    /// Installs a data node's constant initializer.
    pub fn set_initializer(&mut self, name: &str, init: TacSeq) -> Result<(), IrError> {
        self.ipgraph.lookup_data_mut(name)?.init = Some(init);
        Ok(())
    }

    /// Records that `src` references `tgt`.
    pub fn add_dependency(&mut self, src: &str, tgt: &str) -> Result<(), IrError> {
        self.ipgraph.add_dependency(src, tgt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Operation;
    use crate::tac::Tac;
    use crate::variable::Var;

    #[test]
    fn create_function_appends_states() {
        let mut module = Module::new("m", "", "");
        module
            .create_function(
                "f",
                vec![("x".into(), Type::bits(32))],
                vec![Type::bits(32)],
                Linkage::External,
                true,
            )
            .unwrap();

        let f = module.ipgraph().lookup_function("f").unwrap();
        assert_eq!(
            f.fn_type.arguments,
            vec![Type::bits(32), Type::IoState, Type::MemState]
        );
        assert_eq!(
            f.fn_type.results,
            vec![Type::bits(32), Type::IoState, Type::MemState]
        );

        let cfg = f.cfg.as_ref().unwrap();
        assert_eq!(cfg.arguments().len(), 3);
        assert_eq!(cfg.variable(cfg.arguments()[1]).ty, Type::IoState);
        assert_eq!(cfg.variable(cfg.arguments()[2]).ty, Type::MemState);
    }

    #[test]
    fn function_symbol_is_function_typed() {
        let mut module = Module::new("m", "", "");
        let id = module
            .create_function("f", vec![], vec![], Linkage::External, false)
            .unwrap();
        let var = module.globals().get(id).unwrap();
        assert!(matches!(var.ty, Type::Function(_)));
        assert_eq!(module.symbol("f").unwrap(), id);
        assert_eq!(module.symbol_name(id).unwrap(), "f");
    }

    #[test]
    fn data_symbol_is_pointer_typed() {
        let mut module = Module::new("m", "", "");
        let id = module.create_data("gv1", Type::bits(32), Linkage::External, true).unwrap();
        assert_eq!(module.globals().get(id).unwrap().ty, Type::pointer(Type::bits(32)));
    }

    #[test]
    fn data_initializer_roundtrip() {
        // A constant global initialized to 42, the shape an importer
        // produces for `@gv1 = constant i32 42`.
        let mut module = Module::new("module", "", "");
        module.create_data("gv1", Type::bits(32), Linkage::External, true).unwrap();

        let mut init = TacSeq::new();
        let v = init.create_variable(Type::bits(32));
        init.append(
            Tac::new(Operation::bitconst(32, 42), vec![], vec![Var::Local(v)]),
            module.globals(),
        );
        module.set_initializer("gv1", init).unwrap();

        match module.ipgraph().lookup("gv1").unwrap() {
            IpNode::Data(d) => {
                assert!(d.constant);
                assert_eq!(d.init.as_ref().unwrap().len(), 1);
            }
            _ => panic!("expected data node"),
        }
    }

    #[test]
    fn unknown_symbol_lookup_fails_recoverably() {
        let module = Module::new("m", "", "");
        assert!(matches!(module.symbol("nope"), Err(IrError::UnknownSymbol { .. })));
    }
}
