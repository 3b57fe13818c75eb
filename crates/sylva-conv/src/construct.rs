//! CFG -> RVSDG construction.
//!
//! Processes the ip-graph bottom-up in SCC order. External symbols become
//! root-region imports, data nodes become deltas, functions become lambdas,
//! and mutually recursive components are wrapped in a single phi node.
//!
//! Per function, the CFG is pruned and restructured, then converted by
//! walking the proper-structured graph with an environment mapping each
//! variable to its current origin. A branch head becomes a gamma (the whole
//! environment is threaded through entry variables; the surplus is cheap
//! and dead-node elimination trims it), a strongly connected component
//! becomes a theta whose loop variables cover every live or loop-defined
//! variable, and each basic block becomes a chain of simple nodes. Memory
//! and I/O states are ordinary state-typed variables in the symbolic IR, so
//! state edges fall out of the same environment threading; loads and stores
//! go through the normalizing constructors.

use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};

use sylva_ir::cfg::{Cfg, CfgNode, CfgNodeId};
use sylva_ir::cfg_structure::prune;
use sylva_ir::ipgraph::{DataNode, FunctionNode, IpNode};
use sylva_ir::ops::Operation;
use sylva_ir::tac::Tac;
use sylva_ir::types::Type;
use sylva_ir::variable::{GlobalId, Var, Linkage};
use sylva_ir::Module;

use sylva_rvsdg::{
    create_load, create_store, delta_output, lambda_output, DeltaBuilder, GammaBuilder, Graph,
    LambdaBuilder, Origin, PhiBuilder, RegionId, ThetaBuilder,
};

use crate::restructure::{
    back_edges, immediate_postdominator, restructure, subgraph_sccs, tail_controlled_component,
    Edge,
};

type Env = IndexMap<Var, Origin>;

/// Builds the RVSDG for a module.
pub fn construct(module: &Module) -> Graph {
    let mut graph = Graph::new();
    let mut symbols: HashMap<String, Origin> = HashMap::new();

    for component in module.ipgraph().sccs() {
        let recursive = component.len() > 1
            || module.ipgraph().is_self_recursive(&component[0]).unwrap();
        if !recursive {
            convert_symbol(&mut graph, module, &component[0], &mut symbols);
        } else {
            convert_recursion_group(&mut graph, module, &component, &mut symbols);
        }
    }

    // Exports.
    for (name, node) in module.ipgraph().iter() {
        let exported = match node {
            IpNode::Function(f) => f.cfg.is_some() && f.exported,
            IpNode::Data(d) => {
                d.init.is_some() && !matches!(d.linkage, Linkage::Internal | Linkage::Private)
            }
        };
        if exported {
            let origin = symbols[name];
            graph.add_export(origin, name);
        }
    }
    graph
}

fn convert_symbol(
    graph: &mut Graph,
    module: &Module,
    name: &str,
    symbols: &mut HashMap<String, Origin>,
) {
    let origin = match module.ipgraph().lookup(name).unwrap() {
        IpNode::Function(f) => match &f.cfg {
            Some(_) => {
                let root = graph.root();
                let lambda = convert_function(graph, module, root, f, &mut |graph, symbol| {
                    resolve_root(graph, module, symbol, symbols)
                });
                lambda_output(lambda)
            }
            None => graph.add_import(Type::Function(f.fn_type.clone()), name),
        },
        IpNode::Data(d) => match &d.init {
            Some(_) => {
                let root = graph.root();
                let delta = convert_data(graph, module, root, d, &mut |graph, symbol| {
                    resolve_root(graph, module, symbol, symbols)
                });
                delta_output(delta)
            }
            None => graph.add_import(Type::pointer(d.ty.clone()), name),
        },
    };
    symbols.insert(name.to_string(), origin);
}

/// Resolves a symbol to its root-region origin. Symbols without a
/// definition are imported on first use; using a defined symbol before its
/// component was converted means a dependency edge is missing.
fn resolve_root(
    graph: &mut Graph,
    module: &Module,
    name: &str,
    symbols: &mut HashMap<String, Origin>,
) -> Origin {
    if let Some(&origin) = symbols.get(name) {
        return origin;
    }
    let origin = match module.ipgraph().lookup(name).unwrap() {
        IpNode::Function(f) => {
            assert!(f.cfg.is_none(), "symbol '{}' used before its definition", name);
            graph.add_import(Type::Function(f.fn_type.clone()), name)
        }
        IpNode::Data(d) => {
            assert!(d.init.is_none(), "symbol '{}' used before its definition", name);
            graph.add_import(Type::pointer(d.ty.clone()), name)
        }
    };
    symbols.insert(name.to_string(), origin);
    origin
}

/// Wraps a mutually recursive component into one phi node.
fn convert_recursion_group(
    graph: &mut Graph,
    module: &Module,
    component: &[String],
    symbols: &mut HashMap<String, Origin>,
) {
    let members: Vec<&FunctionNode> = component
        .iter()
        .map(|name| {
            module
                .ipgraph()
                .lookup_function(name)
                .expect("recursive binding groups must consist of functions")
        })
        .collect();

    let root = graph.root();
    let phi = PhiBuilder::new(graph, root);
    let mut rec_args: HashMap<String, Origin> = HashMap::new();
    for member in &members {
        let (argument, _) = phi.add_recvar(graph, Type::Function(member.fn_type.clone()));
        rec_args.insert(member.name.clone(), argument);
    }

    let sub = phi.subregion(graph);
    let mut ctx_cache: HashMap<String, Origin> = HashMap::new();
    let mut definitions = vec![];
    for member in &members {
        assert!(member.cfg.is_some(), "recursion group members must be defined");
        let lambda = convert_function(graph, module, sub, member, &mut |graph, symbol| {
            if let Some(&arg) = rec_args.get(symbol) {
                return arg;
            }
            if let Some(&ctx) = ctx_cache.get(symbol) {
                return ctx;
            }
            let outer = resolve_root(graph, module, symbol, symbols);
            let ctx = phi.add_ctxvar(graph, outer);
            ctx_cache.insert(symbol.to_string(), ctx);
            ctx
        });
        definitions.push(lambda_output(lambda));
    }
    let phi = phi.finish(graph, &definitions);

    for (r, member) in members.iter().enumerate() {
        symbols.insert(member.name.clone(), Origin::Output { node: phi, index: r });
    }
}

/// Global variables referenced by a CFG's TACs, in first-use order.
fn used_globals(cfg: &Cfg) -> IndexSet<GlobalId> {
    let mut used = IndexSet::new();
    for id in cfg.node_ids() {
        if let CfgNode::Block(block) = cfg.node(id) {
            for tac in block.tacs() {
                for var in tac.operands.iter().chain(&tac.results) {
                    if let Var::Global(g) = var {
                        used.insert(*g);
                    }
                }
            }
        }
    }
    used
}

/// One tail-controlled loop of the restructured CFG.
struct Loop {
    header: CfgNodeId,
    tail: CfgNodeId,
    back_ordinal: usize,
    continue_node: CfgNodeId,
    nodes: IndexSet<CfgNodeId>,
    children: Vec<Loop>,
}

fn loop_forest(cfg: &Cfg, subset: &IndexSet<CfgNodeId>, masked: &HashSet<Edge>) -> Vec<Loop> {
    subgraph_sccs(cfg, subset, masked)
        .into_iter()
        .map(|component| {
            let (header, (tail, back_ordinal)) =
                tail_controlled_component(cfg, &component, masked)
                    .expect("restructured loops are tail-controlled");
            let continue_ordinal = 1 - back_ordinal;
            let continue_node = cfg.outedge(tail, continue_ordinal);
            let mut masked = masked.clone();
            masked.insert((tail, back_ordinal));
            let children = loop_forest(cfg, &component, &masked);
            Loop { header, tail, back_ordinal, continue_node, nodes: component, children }
        })
        .collect()
}

fn convert_function(
    graph: &mut Graph,
    module: &Module,
    region: RegionId,
    function: &FunctionNode,
    resolve: &mut dyn FnMut(&mut Graph, &str) -> Origin,
) -> sylva_rvsdg::NodeId {
    let mut cfg = function.cfg.clone().expect("only defined functions become lambdas");
    prune(&mut cfg);
    restructure(&mut cfg, module.globals());

    let lambda = LambdaBuilder::new(
        graph,
        region,
        &function.name,
        function.fn_type.clone(),
        function.linkage,
    );

    let mut env = Env::new();
    for (index, &arg) in cfg.arguments().iter().enumerate() {
        env.insert(Var::Local(arg), lambda.fn_argument(graph, index));
    }
    for global in used_globals(&cfg) {
        let symbol = module.symbol_name(global).unwrap().to_string();
        let outer = resolve(graph, &symbol);
        let ctx = lambda.add_ctxvar(graph, outer);
        env.insert(Var::Global(global), ctx);
    }

    let converter = FnConverter { cfg: &cfg, masked: back_edges(&cfg) };
    let all: IndexSet<CfgNodeId> = cfg.node_ids().into_iter().collect();
    let loops = loop_forest(&cfg, &all, &HashSet::new());
    let sub = lambda.subregion(graph);
    converter.convert_linear(graph, sub, cfg.entry(), cfg.exit(), &loops, &mut env);

    let results: Vec<Origin> =
        cfg.results().iter().map(|&var| env[&Var::Local(var)]).collect();
    lambda.finish(graph, &results)
}

fn convert_data(
    graph: &mut Graph,
    module: &Module,
    region: RegionId,
    data: &DataNode,
    resolve: &mut dyn FnMut(&mut Graph, &str) -> Origin,
) -> sylva_rvsdg::NodeId {
    let init = data.init.as_ref().expect("only initialized data becomes a delta");
    let delta = DeltaBuilder::new(
        graph,
        region,
        &data.name,
        data.ty.clone(),
        data.linkage,
        data.constant,
    );

    let mut env = Env::new();
    for tac in init.tacs() {
        for var in &tac.operands {
            if let Var::Global(g) = var {
                if !env.contains_key(var) {
                    let symbol = module.symbol_name(*g).unwrap().to_string();
                    let outer = resolve(graph, &symbol);
                    let ctx = delta.add_ctxvar(graph, outer);
                    env.insert(*var, ctx);
                }
            }
        }
    }

    let sub = delta.subregion(graph);
    convert_tacs(graph, sub, init.tacs(), &mut env);
    let last = init.tacs().last().expect("initializers are non-empty");
    let value = env[&last.results[0]];
    delta.finish(graph, value)
}

struct FnConverter<'a> {
    cfg: &'a Cfg,
    masked: HashSet<Edge>,
}

impl FnConverter<'_> {
    /// Converts the straight-line structure between `from` (inclusive) and
    /// `to` (exclusive) into `region`, recursing into gammas and thetas.
    fn convert_linear(
        &self,
        graph: &mut Graph,
        region: RegionId,
        from: CfgNodeId,
        to: CfgNodeId,
        loops: &[Loop],
        env: &mut Env,
    ) {
        let headers: HashMap<CfgNodeId, &Loop> =
            loops.iter().map(|l| (l.header, l)).collect();

        let mut node = from;
        while node != to {
            if let Some(l) = headers.get(&node) {
                node = self.convert_theta(graph, region, l, env);
                continue;
            }
            match self.cfg.node(node) {
                CfgNode::Entry { .. } => {
                    node = self.cfg.outedges(node)[0].1;
                }
                CfgNode::Exit { .. } => unreachable!("walk ends before the exit node"),
                CfgNode::Block(block) => {
                    convert_tacs(graph, region, block.tacs(), env);
                    let outedges = self.cfg.outedges(node);
                    match outedges.len() {
                        0 => unreachable!("only the exit node lacks out-edges"),
                        1 => node = outedges[0].1,
                        _ => node = self.convert_gamma(graph, region, node, loops, env),
                    }
                }
            }
        }
    }

    /// A branch head becomes a gamma; returns the join node.
    fn convert_gamma(
        &self,
        graph: &mut Graph,
        region: RegionId,
        head: CfgNodeId,
        loops: &[Loop],
        env: &mut Env,
    ) -> CfgNodeId {
        let branch = self.cfg.tacs(head).last().expect("branch heads end with a branch");
        assert!(branch.operation.is_terminator());
        let predicate = env[&branch.operands[0]];

        let join = immediate_postdominator(self.cfg, &self.masked, head, self.cfg.exit());
        let outedges = self.cfg.outedges(head);
        let gamma = GammaBuilder::new(graph, predicate, outedges.len());

        // Thread the whole environment into every subregion.
        let outer: Vec<(Var, Origin)> = env.iter().map(|(&v, &o)| (v, o)).collect();
        let mut arm_envs: Vec<Env> = vec![Env::new(); outedges.len()];
        for (var, origin) in &outer {
            let arguments = gamma.add_entryvar(graph, *origin);
            for (r, &argument) in arguments.iter().enumerate() {
                arm_envs[r].insert(*var, argument);
            }
        }

        for (r, &(_, sink)) in outedges.iter().enumerate() {
            assert!(sink != join, "proper-structured branches have a block per alternative");
            let sub = graph.subregion(gamma.node(), r);
            self.convert_linear(graph, sub, sink, join, loops, &mut arm_envs[r]);
        }

        // Every variable live before the branch or assigned in any arm
        // leaves through an exit variable.
        let mut vars: IndexSet<Var> = outer.iter().map(|&(v, _)| v).collect();
        for arm_env in &arm_envs {
            vars.extend(arm_env.keys().copied());
        }
        for var in vars {
            let mut origins = vec![];
            for (r, arm_env) in arm_envs.iter().enumerate() {
                let origin = match arm_env.get(&var) {
                    Some(&origin) => origin,
                    None => {
                        // Defined on some paths only; the others are
                        // undefined.
                        let ty = some_origin_type(graph, &arm_envs, &var);
                        let sub = graph.subregion(gamma.node(), r);
                        let undef =
                            graph.add_simple_node(sub, Operation::Undef { ty }, &[]);
                        graph.output(undef, 0)
                    }
                };
                origins.push(origin);
            }
            let exit = gamma.add_exitvar(graph, &origins);
            env.insert(var, exit);
        }
        join
    }

    /// A tail-controlled loop becomes a theta; returns the loop's
    /// continuation node.
    fn convert_theta(
        &self,
        graph: &mut Graph,
        region: RegionId,
        l: &Loop,
        env: &mut Env,
    ) -> CfgNodeId {
        // Loop variables: everything currently live plus everything the
        // body defines.
        let mut vars: IndexSet<Var> = env.keys().copied().collect();
        for &node in &l.nodes {
            if let CfgNode::Block(block) = self.cfg.node(node) {
                for tac in block.tacs() {
                    vars.extend(tac.results.iter().copied());
                }
            }
        }

        let theta = ThetaBuilder::new(graph, region);
        let mut loopvars = vec![];
        let mut body_env = Env::new();
        for &var in &vars {
            let init = match env.get(&var) {
                Some(&origin) => origin,
                None => {
                    let ty = self.var_type(var);
                    let undef = graph.add_simple_node(region, Operation::Undef { ty }, &[]);
                    graph.output(undef, 0)
                }
            };
            let lv = theta.add_loopvar(graph, init);
            body_env.insert(var, lv.argument(graph));
            loopvars.push(lv);
        }

        let sub = theta.subregion(graph);
        self.convert_linear(graph, sub, l.header, l.tail, &l.children, &mut body_env);

        // The tail computes the repeat decision; its branch is consumed by
        // the predicate.
        let tail_tacs = self.cfg.tacs(l.tail);
        let (branch, body_tacs) = tail_tacs.split_last().expect("loop tails end with a branch");
        assert!(branch.operation.is_terminator());
        convert_tacs(graph, sub, body_tacs, &mut body_env);

        let mut predicate = body_env[&branch.operands[0]];
        if l.back_ordinal == 0 {
            // The repeat alternative must be 1.
            predicate = invert_control(graph, predicate);
        }

        for (lv, &var) in loopvars.iter().zip(&vars) {
            let result = body_env[&var];
            graph.divert(lv.result(graph), result);
        }
        theta.finish(graph, predicate);

        for (lv, &var) in loopvars.iter().zip(&vars) {
            env.insert(var, lv.output());
        }
        l.continue_node
    }

    fn var_type(&self, var: Var) -> Type {
        match var {
            Var::Local(id) => self.cfg.variable(id).ty.clone(),
            Var::Global(_) => unreachable!("globals are seeded as context variables"),
        }
    }
}

fn some_origin_type(graph: &Graph, arm_envs: &[Env], var: &Var) -> Type {
    arm_envs
        .iter()
        .find_map(|e| e.get(var))
        .map(|&o| graph.origin_type(o).clone())
        .expect("variable defined in at least one alternative")
}

/// Swaps the two alternatives of a control value by rebuilding its
/// producer. Control values are produced locally by `Match` or control
/// constants, so this covers every shape construction emits.
fn invert_control(graph: &mut Graph, origin: Origin) -> Origin {
    let node = graph.origin_node(origin).expect("control producer must be local");
    let op = match graph.node_kind(node) {
        sylva_rvsdg::NodeKind::Simple(op) => op.clone(),
        _ => panic!("control producer must be a simple node"),
    };
    match op {
        Operation::Match { nbits, mapping, default, alternatives: 2 } => {
            let swapped = Operation::Match {
                nbits,
                mapping: mapping.into_iter().map(|(v, a)| (v, 1 - a)).collect(),
                default: 1 - default,
                alternatives: 2,
            };
            let operand = graph.input_origin(node, 0);
            let region = graph.node_region(node);
            let inverted = graph.add_simple_node(region, swapped, &[operand]);
            graph.output(inverted, 0)
        }
        Operation::CtlConstant { alternative, alternatives: 2 } => {
            let region = graph.node_region(node);
            let inverted = graph.add_simple_node(
                region,
                Operation::CtlConstant { alternative: 1 - alternative, alternatives: 2 },
                &[],
            );
            graph.output(inverted, 0)
        }
        other => panic!("cannot invert control produced by {}", other.debug_string()),
    }
}

/// Converts a TAC list into simple nodes, folding assignments into the
/// environment and routing loads/stores through the normalizing
/// constructors.
fn convert_tacs(graph: &mut Graph, region: RegionId, tacs: &[Tac], env: &mut Env) {
    for tac in tacs {
        match &tac.operation {
            Operation::Assignment { .. } => {
                let value = env[&tac.operands[0]];
                env.insert(tac.results[0], value);
            }
            Operation::Branch { .. } => {
                // Encoded by region structure.
            }
            Operation::Store { alignment, .. } => {
                let addr = env[&tac.operands[0]];
                let value = env[&tac.operands[1]];
                let states: Vec<Origin> =
                    tac.operands[2..].iter().map(|v| env[v]).collect();
                let outs = create_store(graph, addr, value, &states, *alignment);
                assert_eq!(outs.len(), tac.results.len(), "store states must stay distinct");
                for (result, origin) in tac.results.iter().zip(outs) {
                    env.insert(*result, origin);
                }
            }
            Operation::Load { alignment, .. } => {
                let addr = env[&tac.operands[0]];
                let states: Vec<Origin> =
                    tac.operands[1..].iter().map(|v| env[v]).collect();
                let outs = create_load(graph, addr, &states, *alignment);
                assert_eq!(outs.len(), tac.results.len(), "load states must stay distinct");
                for (result, origin) in tac.results.iter().zip(outs) {
                    env.insert(*result, origin);
                }
            }
            op => {
                let operands: Vec<Origin> = tac.operands.iter().map(|v| env[v]).collect();
                let node = graph.add_simple_node(region, op.clone(), &operands);
                for (index, result) in tac.results.iter().enumerate() {
                    env.insert(*result, graph.output(node, index));
                }
            }
        }
    }
}
