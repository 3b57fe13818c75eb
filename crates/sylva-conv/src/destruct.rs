//! RVSDG -> CFG lowering.
//!
//! The inverse of construction: root-region imports become external
//! declarations, deltas become data nodes, lambdas become functions whose
//! bodies are linearized into CFGs, and phi groups become their member
//! functions with mutual dependencies recorded.
//!
//! Within a lambda body, simple nodes become TACs in the emitting basic
//! block; a gamma becomes a branch whose alternatives assign the exit
//! variables and meet at a join block; a theta becomes a do-while loop:
//! loop-variable initialization assignments, the body, write-back
//! assignments, and a two-way branch whose alternative 1 repeats. State
//! ports materialize as state-typed variables, so the emitted TACs satisfy
//! the operation-signature arity invariant unchanged.

use std::collections::HashMap;

use sylva_ir::cfg::{Cfg, CfgNodeId};
use sylva_ir::ops::Operation;
use sylva_ir::tac::{Tac, TacSeq};
use sylva_ir::types::Type;
use sylva_ir::variable::{Var, VarId};
use sylva_ir::Module;

use sylva_rvsdg::{
    lambda_fn_type, lambda_nfnargs, phi_nrecvars, Graph, NodeId, NodeKind, Origin, RegionId,
};

/// Lowers the RVSDG back into a symbolic-IR module.
pub fn destruct(
    graph: &Graph,
    name: impl Into<String>,
    target_triple: impl Into<String>,
    data_layout: impl Into<String>,
) -> Module {
    let mut module = Module::new(name, target_triple, data_layout);
    let root = graph.root();

    // Root arguments are imported symbols.
    let mut symbols: HashMap<Origin, String> = HashMap::new();
    for index in 0..graph.narguments(root) {
        let symbol = graph
            .argument_name(root, index)
            .map(str::to_string)
            .unwrap_or_else(|| format!("import{}", index));
        match graph.argument_type(root, index) {
            Type::Function(fn_type) => {
                module
                    .create_external_function(
                        &symbol,
                        fn_type.clone(),
                        sylva_ir::Linkage::External,
                    )
                    .unwrap();
            }
            Type::Pointer { pointee } => {
                module
                    .create_data(&symbol, (**pointee).clone(), sylva_ir::Linkage::External, false)
                    .unwrap();
            }
            other => panic!("cannot import a value of type {}", other),
        }
        symbols.insert(Origin::Argument { region: root, index }, symbol);
    }

    // Exported origins.
    let exported: HashMap<Origin, ()> = (0..graph.nresults(root))
        .map(|index| (graph.result_origin(root, index), ()))
        .collect();

    let mut nodes = graph.region_nodes(root);
    nodes.sort_by_key(|&node| graph.node_depth(node));
    for node in nodes {
        match graph.node_kind(node) {
            NodeKind::Lambda { name, linkage, .. } => {
                let symbol = name.clone();
                let linkage = *linkage;
                let output = Origin::Output { node, index: 0 };
                convert_lambda(
                    graph,
                    &mut module,
                    node,
                    &symbol,
                    linkage,
                    exported.contains_key(&output),
                    &symbols,
                );
                symbols.insert(output, symbol);
            }
            NodeKind::Delta { name, linkage, constant } => {
                let symbol = name.clone();
                let (linkage, constant) = (*linkage, *constant);
                convert_delta(graph, &mut module, node, &symbol, linkage, constant, &symbols);
                symbols.insert(Origin::Output { node, index: 0 }, symbol);
            }
            NodeKind::Phi => {
                convert_phi(graph, &mut module, node, &exported, &mut symbols);
            }
            other => panic!("unexpected root node: {}", other.debug_string()),
        }
    }
    module
}

/// Resolves a root-region origin to the symbol it binds.
fn symbol_of(symbols: &HashMap<Origin, String>, origin: Origin) -> &str {
    symbols.get(&origin).expect("root origin does not bind a symbol")
}

fn convert_lambda(
    graph: &Graph,
    module: &mut Module,
    lambda: NodeId,
    symbol: &str,
    linkage: sylva_ir::Linkage,
    exported: bool,
    symbols: &HashMap<Origin, String>,
) {
    let fn_type = lambda_fn_type(graph, lambda).clone();
    module.create_function_with_type(symbol, fn_type, linkage, exported).unwrap();
    convert_lambda_body(graph, module, lambda, symbol, symbols);
}

fn convert_delta(
    graph: &Graph,
    module: &mut Module,
    delta: NodeId,
    symbol: &str,
    linkage: sylva_ir::Linkage,
    constant: bool,
    symbols: &HashMap<Origin, String>,
) {
    let sub = graph.subregion(delta, 0);
    let ty = graph
        .output_type(delta, 0)
        .pointee()
        .expect("delta outputs are addresses")
        .clone();
    module.create_data(symbol, ty.clone(), linkage, constant).unwrap();

    let mut env: HashMap<Origin, Var> = HashMap::new();
    let mut dependencies = vec![];
    for k in 0..graph.ninputs(delta) {
        let outer = graph.input_origin(delta, k);
        let dep = symbol_of(symbols, outer).to_string();
        let global = module.symbol(&dep).unwrap();
        env.insert(Origin::Argument { region: sub, index: k }, Var::Global(global));
        dependencies.push(dep);
    }

    let mut init = TacSeq::new();
    let mut nodes = graph.region_nodes(sub);
    nodes.sort_by_key(|&node| graph.node_depth(node));
    for node in nodes {
        let op = match graph.node_kind(node) {
            NodeKind::Simple(op) => op.clone(),
            other => panic!("initializers are simple: {}", other.debug_string()),
        };
        let operands: Vec<Var> =
            (0..graph.ninputs(node)).map(|i| env[&graph.input_origin(node, i)]).collect();
        let results: Vec<Var> = (0..graph.noutputs(node))
            .map(|i| {
                let var = init.create_variable(graph.output_type(node, i).clone());
                env.insert(Origin::Output { node, index: i }, Var::Local(var));
                Var::Local(var)
            })
            .collect();
        init.append(Tac::new(op, operands, results), module.globals());
    }

    // The initializer value is the final TAC's result.
    let value = graph.result_origin(sub, 0);
    let ty_assign = Operation::Assignment { ty };
    let last = init.create_variable(graph.origin_type(value).clone());
    init.append(Tac::new(ty_assign, vec![env[&value]], vec![Var::Local(last)]), module.globals());

    module.set_initializer(symbol, init).unwrap();
    for dep in dependencies {
        module.add_dependency(symbol, &dep).unwrap();
    }
}

fn convert_phi(
    graph: &Graph,
    module: &mut Module,
    phi: NodeId,
    exported: &HashMap<Origin, ()>,
    symbols: &mut HashMap<Origin, String>,
) {
    let sub = graph.subregion(phi, 0);
    let nrec = phi_nrecvars(graph, phi);

    // Member lambdas, in recursion-variable order.
    let members: Vec<NodeId> = (0..nrec)
        .map(|r| {
            graph
                .origin_node(graph.result_origin(sub, r))
                .expect("recursion variables are defined by lambdas")
        })
        .collect();
    let member_names: Vec<String> = members
        .iter()
        .map(|&m| match graph.node_kind(m) {
            NodeKind::Lambda { name, .. } => name.clone(),
            other => panic!("recursion variables are defined by lambdas: {}", other.debug_string()),
        })
        .collect();

    // Inside the phi subregion, recursion arguments and member outputs bind
    // the member symbols; context arguments bind outer symbols.
    let mut inner_symbols = symbols.clone();
    for (r, name) in member_names.iter().enumerate() {
        inner_symbols.insert(Origin::Argument { region: sub, index: r }, name.clone());
        inner_symbols
            .insert(Origin::Output { node: members[r], index: 0 }, name.clone());
    }
    for k in 0..graph.ninputs(phi) {
        let outer = graph.input_origin(phi, k);
        let name = symbol_of(symbols, outer).to_string();
        inner_symbols.insert(Origin::Argument { region: sub, index: nrec + k }, name);
    }

    // Declare all members first so mutual references resolve, then lower
    // the bodies.
    for (r, &member) in members.iter().enumerate() {
        let (linkage, fn_type) = match graph.node_kind(member) {
            NodeKind::Lambda { linkage, fn_type, .. } => (*linkage, fn_type.clone()),
            _ => unreachable!(),
        };
        let output = Origin::Output { node: phi, index: r };
        module
            .create_function_with_type(&member_names[r], fn_type, linkage, exported.contains_key(&output))
            .unwrap();
        symbols.insert(output, member_names[r].clone());
    }
    for (r, &member) in members.iter().enumerate() {
        convert_lambda_body(graph, module, member, &member_names[r], &inner_symbols);
    }
}

/// Lowers a lambda body into an already-declared function.
fn convert_lambda_body(
    graph: &Graph,
    module: &mut Module,
    lambda: NodeId,
    symbol: &str,
    symbols: &HashMap<Origin, String>,
) {
    let sub = graph.subregion(lambda, 0);
    let nfnargs = lambda_nfnargs(graph, lambda);
    let mut env: HashMap<Origin, Var> = HashMap::new();
    let mut cfg = module.ipgraph_mut().lookup_function_mut(symbol).unwrap().cfg.take().unwrap();
    for (index, &arg) in cfg.arguments().to_vec().iter().enumerate() {
        env.insert(Origin::Argument { region: sub, index }, Var::Local(arg));
    }
    let mut dependencies = vec![];
    for k in 0..graph.ninputs(lambda) {
        let outer = graph.input_origin(lambda, k);
        let dep = symbol_of(symbols, outer).to_string();
        let global = module.symbol(&dep).unwrap();
        env.insert(Origin::Argument { region: sub, index: nfnargs + k }, Var::Global(global));
        dependencies.push(dep);
    }

    let (first, last) = linearize_region(graph, sub, module, &mut cfg, &mut env);
    cfg.redirect_outedge(cfg.entry(), 0, first);
    let mut results = vec![];
    for index in 0..graph.nresults(sub) {
        let origin = graph.result_origin(sub, index);
        let local = match env[&origin] {
            Var::Local(id) => id,
            var @ Var::Global(_) => {
                let ty = graph.origin_type(origin).clone();
                let local = cfg.create_variable(ty.clone());
                cfg.append_tac(
                    last,
                    Tac::new(Operation::Assignment { ty }, vec![var], vec![Var::Local(local)]),
                    module.globals(),
                );
                local
            }
        };
        results.push(local);
    }
    cfg.add_outedge(last, cfg.exit());
    cfg.set_results(results);

    module.ipgraph_mut().lookup_function_mut(symbol).unwrap().cfg = Some(cfg);
    for dep in dependencies {
        module.add_dependency(symbol, &dep).unwrap();
    }
}

/// Linearizes a region into a block chain; returns (first, last) blocks.
/// The caller wires the chain into the surrounding CFG.
fn linearize_region(
    graph: &Graph,
    region: RegionId,
    module: &Module,
    cfg: &mut Cfg,
    env: &mut HashMap<Origin, Var>,
) -> (CfgNodeId, CfgNodeId) {
    let first = cfg.add_basic_block();
    let mut bb = first;

    let mut nodes = graph.region_nodes(region);
    nodes.sort_by_key(|&node| graph.node_depth(node));
    for node in nodes {
        match graph.node_kind(node) {
            NodeKind::Simple(op) => {
                let op = op.clone();
                let operands: Vec<Var> =
                    (0..graph.ninputs(node)).map(|i| env[&graph.input_origin(node, i)]).collect();
                let results: Vec<Var> = (0..graph.noutputs(node))
                    .map(|i| {
                        let var = cfg.create_variable(graph.output_type(node, i).clone());
                        env.insert(Origin::Output { node, index: i }, Var::Local(var));
                        Var::Local(var)
                    })
                    .collect();
                cfg.append_tac(bb, Tac::new(op, operands, results), module.globals());
            }
            NodeKind::Gamma => {
                bb = lower_gamma(graph, node, module, cfg, bb, env);
            }
            NodeKind::Theta => {
                bb = lower_theta(graph, node, module, cfg, bb, env);
            }
            other => panic!("cannot lower a nested {}", other.debug_string()),
        }
    }
    (first, bb)
}

/// A gamma becomes a branch whose alternatives assign the exit variables
/// and meet at a join block. Returns the join.
fn lower_gamma(
    graph: &Graph,
    gamma: NodeId,
    module: &Module,
    cfg: &mut Cfg,
    bb: CfgNodeId,
    env: &mut HashMap<Origin, Var>,
) -> CfgNodeId {
    let nsub = graph.nsubregions(gamma);
    let predicate = env[&graph.input_origin(gamma, 0)];
    cfg.append_tac(
        bb,
        Tac::new(Operation::Branch { alternatives: nsub as u32 }, vec![predicate], vec![]),
        module.globals(),
    );

    // One fresh variable per exit variable, assigned in every alternative.
    let exit_vars: Vec<VarId> = (0..graph.noutputs(gamma))
        .map(|j| cfg.create_variable(graph.output_type(gamma, j).clone()))
        .collect();

    let join = cfg.add_basic_block();
    for r in 0..nsub {
        let sub = graph.subregion(gamma, r);
        let mut arm_env = env.clone();
        for k in 0..graph.narguments(sub) {
            // Entry variable k reads gamma input k + 1.
            let outer = env[&graph.input_origin(gamma, k + 1)];
            arm_env.insert(Origin::Argument { region: sub, index: k }, outer);
        }
        let (arm_first, arm_last) = linearize_region(graph, sub, module, cfg, &mut arm_env);
        for (j, &exit_var) in exit_vars.iter().enumerate() {
            let origin = graph.result_origin(sub, j);
            let ty = graph.origin_type(origin).clone();
            cfg.append_tac(
                arm_last,
                Tac::new(
                    Operation::Assignment { ty },
                    vec![arm_env[&origin]],
                    vec![Var::Local(exit_var)],
                ),
                module.globals(),
            );
        }
        cfg.add_outedge(bb, arm_first);
        cfg.add_outedge(arm_last, join);
    }

    for (j, &exit_var) in exit_vars.iter().enumerate() {
        env.insert(Origin::Output { node: gamma, index: j }, Var::Local(exit_var));
    }
    join
}

/// A theta becomes a do-while loop. Returns the continuation block.
fn lower_theta(
    graph: &Graph,
    theta: NodeId,
    module: &Module,
    cfg: &mut Cfg,
    bb: CfgNodeId,
    env: &mut HashMap<Origin, Var>,
) -> CfgNodeId {
    let sub = graph.subregion(theta, 0);
    let nloopvars = graph.ninputs(theta);

    // Initialization assignments for the loop-carried variables.
    let loop_vars: Vec<VarId> = (0..nloopvars)
        .map(|i| {
            let ty = graph.input_type(theta, i).clone();
            let var = cfg.create_variable(ty.clone());
            let init = env[&graph.input_origin(theta, i)];
            cfg.append_tac(
                bb,
                Tac::new(Operation::Assignment { ty }, vec![init], vec![Var::Local(var)]),
                module.globals(),
            );
            var
        })
        .collect();

    let mut body_env = env.clone();
    for (i, &var) in loop_vars.iter().enumerate() {
        body_env.insert(Origin::Argument { region: sub, index: i }, Var::Local(var));
    }

    let (body_first, body_last) = linearize_region(graph, sub, module, cfg, &mut body_env);
    cfg.add_outedge(bb, body_first);

    // Write-back assignments, then the repeat branch: alternative 0 leaves,
    // alternative 1 repeats.
    for (i, &var) in loop_vars.iter().enumerate() {
        let origin = graph.result_origin(sub, i + 1);
        let ty = graph.origin_type(origin).clone();
        cfg.append_tac(
            body_last,
            Tac::new(
                Operation::Assignment { ty },
                vec![body_env[&origin]],
                vec![Var::Local(var)],
            ),
            module.globals(),
        );
    }
    let predicate = body_env[&graph.result_origin(sub, 0)];
    cfg.append_tac(
        body_last,
        Tac::new(Operation::Branch { alternatives: 2 }, vec![predicate], vec![]),
        module.globals(),
    );
    let continuation = cfg.add_basic_block();
    cfg.add_outedge(body_last, continuation);
    cfg.add_outedge(body_last, body_first);

    for (i, &var) in loop_vars.iter().enumerate() {
        env.insert(Origin::Output { node: theta, index: i }, Var::Local(var));
    }
    continuation
}
