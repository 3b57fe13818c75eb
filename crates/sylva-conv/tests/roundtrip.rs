//! End-to-end conversion tests: build a symbolic-IR module through the
//! builder API, construct the RVSDG, lower it back, and construct again.
//! The doubly-constructed graph must have the same structural shape as the
//! first one.

use sylva_ir::cfg_structure::{is_closed, is_proper_structured};
use sylva_ir::ops::{BitCompareOp, Operation};
use sylva_ir::tac::Tac;
use sylva_ir::types::Type;
use sylva_ir::variable::{Linkage, Var};
use sylva_ir::Module;

use sylva_conv::{construct, destruct};
use sylva_rvsdg::{lambda_fn_type, region_tree, NodeKind, Origin};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn find_lambda(graph: &sylva_rvsdg::Graph, name: &str) -> sylva_rvsdg::NodeId {
    graph
        .region_nodes(graph.root())
        .into_iter()
        .find(|&n| matches!(graph.node_kind(n), NodeKind::Lambda { name: n2, .. } if n2 == name))
        .expect("lambda not found")
}

/// max(a, b) = a < b ? b : a, with a two-way branch and a join.
fn build_max_module() -> Module {
    let mut module = Module::new("m", "x86_64-unknown-linux-gnu", "");
    module
        .create_function(
            "max",
            vec![("a".into(), Type::bits(32)), ("b".into(), Type::bits(32))],
            vec![Type::bits(32)],
            Linkage::External,
            true,
        )
        .unwrap();

    let globals = module.globals().clone();
    let f = module.ipgraph_mut().lookup_function_mut("max").unwrap();
    let cfg = f.cfg.as_mut().unwrap();
    let (a, b) = (cfg.arguments()[0], cfg.arguments()[1]);
    let (io, mem) = (cfg.arguments()[2], cfg.arguments()[3]);

    let head = cfg.add_basic_block();
    let then_bb = cfg.add_basic_block();
    let else_bb = cfg.add_basic_block();
    let join = cfg.add_basic_block();

    let cmp = cfg.create_variable(Type::bits(1));
    let ctl = cfg.create_variable(Type::control(2));
    let res = cfg.create_variable(Type::bits(32));

    cfg.append_tac(
        head,
        Tac::new(
            Operation::BitCompare { op: BitCompareOp::Slt, width: 32 },
            vec![Var::Local(a), Var::Local(b)],
            vec![Var::Local(cmp)],
        ),
        &globals,
    );
    cfg.append_tac(
        head,
        Tac::new(
            Operation::Match { nbits: 1, mapping: vec![(0, 0)], default: 1, alternatives: 2 },
            vec![Var::Local(cmp)],
            vec![Var::Local(ctl)],
        ),
        &globals,
    );
    cfg.append_tac(
        head,
        Tac::new(Operation::Branch { alternatives: 2 }, vec![Var::Local(ctl)], vec![]),
        &globals,
    );
    // Alternative 0: a >= b, result is a; alternative 1: result is b.
    cfg.append_tac(
        then_bb,
        Tac::new(
            Operation::Assignment { ty: Type::bits(32) },
            vec![Var::Local(a)],
            vec![Var::Local(res)],
        ),
        &globals,
    );
    cfg.append_tac(
        else_bb,
        Tac::new(
            Operation::Assignment { ty: Type::bits(32) },
            vec![Var::Local(b)],
            vec![Var::Local(res)],
        ),
        &globals,
    );

    cfg.redirect_outedge(cfg.entry(), 0, head);
    cfg.add_outedge(head, then_bb);
    cfg.add_outedge(head, else_bb);
    cfg.add_outedge(then_bb, join);
    cfg.add_outedge(else_bb, join);
    cfg.add_outedge(join, cfg.exit());
    cfg.set_results(vec![res, io, mem]);
    cfg.verify();
    module
}

/// sum(n): do-while accumulating 0 + 0 + 1 + ... until i >= n.
fn build_sum_module() -> Module {
    let mut module = Module::new("m", "", "");
    module
        .create_function(
            "sum",
            vec![("n".into(), Type::bits(32))],
            vec![Type::bits(32)],
            Linkage::External,
            true,
        )
        .unwrap();

    let globals = module.globals().clone();
    let f = module.ipgraph_mut().lookup_function_mut("sum").unwrap();
    let cfg = f.cfg.as_mut().unwrap();
    let n = cfg.arguments()[0];
    let (io, mem) = (cfg.arguments()[1], cfg.arguments()[2]);

    let init = cfg.add_basic_block();
    let body = cfg.add_basic_block();
    let after = cfg.add_basic_block();

    let i = cfg.create_named_variable("i", Type::bits(32));
    let acc = cfg.create_named_variable("acc", Type::bits(32));
    let one = cfg.create_variable(Type::bits(32));
    let cmp = cfg.create_variable(Type::bits(1));
    let ctl = cfg.create_variable(Type::control(2));

    cfg.append_tac(
        init,
        Tac::new(Operation::bitconst(32, 0), vec![], vec![Var::Local(i)]),
        &globals,
    );
    cfg.append_tac(
        init,
        Tac::new(Operation::bitconst(32, 0), vec![], vec![Var::Local(acc)]),
        &globals,
    );
    // acc += i; i += 1; repeat while i < n.
    cfg.append_tac(
        body,
        Tac::new(
            Operation::bitadd(32),
            vec![Var::Local(acc), Var::Local(i)],
            vec![Var::Local(acc)],
        ),
        &globals,
    );
    cfg.append_tac(
        body,
        Tac::new(Operation::bitconst(32, 1), vec![], vec![Var::Local(one)]),
        &globals,
    );
    cfg.append_tac(
        body,
        Tac::new(
            Operation::bitadd(32),
            vec![Var::Local(i), Var::Local(one)],
            vec![Var::Local(i)],
        ),
        &globals,
    );
    cfg.append_tac(
        body,
        Tac::new(
            Operation::BitCompare { op: BitCompareOp::Slt, width: 32 },
            vec![Var::Local(i), Var::Local(n)],
            vec![Var::Local(cmp)],
        ),
        &globals,
    );
    cfg.append_tac(
        body,
        Tac::new(
            Operation::Match { nbits: 1, mapping: vec![(0, 0)], default: 1, alternatives: 2 },
            vec![Var::Local(cmp)],
            vec![Var::Local(ctl)],
        ),
        &globals,
    );
    cfg.append_tac(
        body,
        Tac::new(Operation::Branch { alternatives: 2 }, vec![Var::Local(ctl)], vec![]),
        &globals,
    );

    cfg.redirect_outedge(cfg.entry(), 0, init);
    cfg.add_outedge(init, body);
    cfg.add_outedge(body, after); // alternative 0: leave
    cfg.add_outedge(body, body); // alternative 1: repeat
    cfg.add_outedge(after, cfg.exit());
    cfg.set_results(vec![acc, io, mem]);
    cfg.verify();
    module
}

/// f(x): p = alloca; *p = x; return *p -- exercises state threading and
/// store-to-load forwarding.
fn build_memory_module() -> Module {
    let mut module = Module::new("m", "", "");
    module
        .create_function(
            "roundtrip",
            vec![("x".into(), Type::bits(32))],
            vec![Type::bits(32)],
            Linkage::External,
            true,
        )
        .unwrap();

    let globals = module.globals().clone();
    let f = module.ipgraph_mut().lookup_function_mut("roundtrip").unwrap();
    let cfg = f.cfg.as_mut().unwrap();
    let x = cfg.arguments()[0];
    let (io, mem) = (cfg.arguments()[1], cfg.arguments()[2]);

    let bb = cfg.add_basic_block();
    let p = cfg.create_variable(Type::pointer(Type::bits(32)));
    let s1 = cfg.create_variable(Type::MemState);
    let s2 = cfg.create_variable(Type::MemState);
    let s3 = cfg.create_variable(Type::MemState);
    let s4 = cfg.create_variable(Type::MemState);
    let y = cfg.create_variable(Type::bits(32));

    cfg.append_tac(
        bb,
        Tac::new(
            Operation::Alloca { ty: Type::bits(32), alignment: 4 },
            vec![],
            vec![Var::Local(p), Var::Local(s1)],
        ),
        &globals,
    );
    cfg.append_tac(
        bb,
        Tac::new(
            Operation::store(Type::bits(32), 4, 1),
            vec![Var::Local(p), Var::Local(x), Var::Local(s1)],
            vec![Var::Local(s2)],
        ),
        &globals,
    );
    cfg.append_tac(
        bb,
        Tac::new(
            Operation::load(Type::bits(32), 4, 1),
            vec![Var::Local(p), Var::Local(s2)],
            vec![Var::Local(y), Var::Local(s3)],
        ),
        &globals,
    );
    // Merge the function's incoming state with the local chain.
    cfg.append_tac(
        bb,
        Tac::new(
            Operation::MemStateMux { noperands: 2, nresults: 1 },
            vec![Var::Local(mem), Var::Local(s3)],
            vec![Var::Local(s4)],
        ),
        &globals,
    );

    cfg.redirect_outedge(cfg.entry(), 0, bb);
    cfg.add_outedge(bb, cfg.exit());
    cfg.set_results(vec![y, io, s4]);
    cfg.verify();
    module
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn branch_becomes_gamma() {
    let module = build_max_module();
    let graph = construct(&module);
    graph.verify();

    assert_eq!(region_tree(&graph, graph.root()), "ROOT\n-lambda[max]\n--gamma\n");
    // max is exported.
    assert_eq!(graph.nresults(graph.root()), 1);
    assert_eq!(graph.result_name(graph.root(), 0), Some("max"));
}

#[test]
fn loop_becomes_theta() {
    let module = build_sum_module();
    let graph = construct(&module);
    graph.verify();
    assert_eq!(region_tree(&graph, graph.root()), "ROOT\n-lambda[sum]\n--theta\n");
}

#[test]
fn store_to_load_forwarding_during_construction() {
    let module = build_memory_module();
    let graph = construct(&module);
    graph.verify();

    // The load was forwarded away: the function's first result is the
    // argument x itself.
    let lambda = find_lambda(&graph, "roundtrip");
    let sub = graph.subregion(lambda, 0);
    assert_eq!(
        graph.result_origin(sub, 0),
        Origin::Argument { region: sub, index: 0 }
    );
}

#[test]
fn destructed_cfg_is_proper_structured() {
    for module in [build_max_module(), build_sum_module(), build_memory_module()] {
        let graph = construct(&module);
        let lowered = destruct(&graph, module.name.as_str(), module.target_triple.as_str(), module.data_layout.as_str());
        for (name, node) in lowered.ipgraph().iter() {
            if let sylva_ir::IpNode::Function(f) = node {
                let cfg = f.cfg.as_ref().unwrap_or_else(|| panic!("{} lost its body", name));
                cfg.verify();
                assert!(is_closed(cfg), "{} must be closed", name);
                assert!(is_proper_structured(cfg), "{} must stay proper-structured", name);
            }
        }
    }
}

#[test]
fn construct_destruct_construct_is_shape_stable() {
    for module in [build_max_module(), build_sum_module(), build_memory_module()] {
        let graph = construct(&module);
        let lowered = destruct(&graph, module.name.as_str(), module.target_triple.as_str(), module.data_layout.as_str());
        let again = construct(&lowered);
        again.verify();
        assert_eq!(
            region_tree(&graph, graph.root()),
            region_tree(&again, again.root()),
            "reconstruction must preserve the structural shape"
        );
    }
}

#[test]
fn lowered_signature_keeps_states() {
    let module = build_max_module();
    let graph = construct(&module);
    let lambda = find_lambda(&graph, "max");
    let fn_type = lambda_fn_type(&graph, lambda);
    assert_eq!(fn_type.arguments.last(), Some(&Type::MemState));

    let lowered = destruct(&graph, "m", "", "");
    let f = lowered.ipgraph().lookup_function("max").unwrap();
    assert_eq!(f.fn_type.results, vec![Type::bits(32), Type::IoState, Type::MemState]);
    assert!(f.exported);
}

#[test]
fn global_data_round_trips_through_delta() {
    // @gv1 = constant i32 42, loaded by a function.
    let mut module = Module::new("module", "", "");
    module.create_data("gv1", Type::bits(32), Linkage::External, true).unwrap();
    let mut init = sylva_ir::TacSeq::new();
    let v = init.create_variable(Type::bits(32));
    init.append(
        Tac::new(Operation::bitconst(32, 42), vec![], vec![Var::Local(v)]),
        module.globals(),
    );
    module.set_initializer("gv1", init).unwrap();

    module
        .create_function("get", vec![], vec![Type::bits(32)], Linkage::External, true)
        .unwrap();
    let gv = module.symbol("gv1").unwrap();
    let globals = module.globals().clone();
    let f = module.ipgraph_mut().lookup_function_mut("get").unwrap();
    let cfg = f.cfg.as_mut().unwrap();
    let (io, mem) = (cfg.arguments()[0], cfg.arguments()[1]);
    let bb = cfg.add_basic_block();
    let y = cfg.create_variable(Type::bits(32));
    let s = cfg.create_variable(Type::MemState);
    cfg.append_tac(
        bb,
        Tac::new(
            Operation::load(Type::bits(32), 4, 1),
            vec![Var::Global(gv), Var::Local(mem)],
            vec![Var::Local(y), Var::Local(s)],
        ),
        &globals,
    );
    cfg.redirect_outedge(cfg.entry(), 0, bb);
    cfg.add_outedge(bb, cfg.exit());
    cfg.set_results(vec![y, io, s]);
    module.add_dependency("get", "gv1").unwrap();

    let graph = construct(&module);
    graph.verify();
    assert_eq!(region_tree(&graph, graph.root()), "ROOT\n-delta[gv1]\n-lambda[get]\n");

    let lowered = destruct(&graph, "module", "", "");
    match lowered.ipgraph().lookup("gv1").unwrap() {
        sylva_ir::IpNode::Data(d) => {
            assert!(d.constant);
            assert!(d.init.is_some());
        }
        _ => panic!("gv1 must still be a data node"),
    }
    assert!(lowered.ipgraph().lookup_function("get").unwrap().dependencies.contains("gv1"));

    let again = construct(&lowered);
    assert_eq!(
        region_tree(&again, again.root()),
        "ROOT\n-delta[gv1]\n-lambda[get]\n"
    );
}

#[test]
fn mutually_recursive_functions_share_a_phi() {
    let mut module = Module::new("m", "", "");
    for name in ["even", "odd"] {
        module
            .create_function(
                name,
                vec![("x".into(), Type::bits(32))],
                vec![Type::bits(32)],
                Linkage::External,
                name == "even",
            )
            .unwrap();
    }
    module.add_dependency("even", "odd").unwrap();
    module.add_dependency("odd", "even").unwrap();

    let globals = module.globals().clone();
    for (name, other) in [("even", "odd"), ("odd", "even")] {
        let callee = module.symbol(other).unwrap();
        let callee_type = match &module.globals().get(callee).unwrap().ty {
            Type::Function(ft) => ft.clone(),
            _ => unreachable!(),
        };
        let f = module.ipgraph_mut().lookup_function_mut(name).unwrap();
        let cfg = f.cfg.as_mut().unwrap();
        let x = cfg.arguments()[0];
        let (io, mem) = (cfg.arguments()[1], cfg.arguments()[2]);
        let bb = cfg.add_basic_block();
        let r = cfg.create_variable(Type::bits(32));
        let io2 = cfg.create_variable(Type::IoState);
        let mem2 = cfg.create_variable(Type::MemState);
        cfg.append_tac(
            bb,
            Tac::new(
                Operation::Call { fn_type: callee_type },
                vec![Var::Global(callee), Var::Local(x), Var::Local(io), Var::Local(mem)],
                vec![Var::Local(r), Var::Local(io2), Var::Local(mem2)],
            ),
            &globals,
        );
        cfg.redirect_outedge(cfg.entry(), 0, bb);
        cfg.add_outedge(bb, cfg.exit());
        cfg.set_results(vec![r, io2, mem2]);
    }

    let graph = construct(&module);
    graph.verify();
    let tree = region_tree(&graph, graph.root());
    assert!(tree.contains("-phi\n"), "mutual recursion must be bound by a phi: {}", tree);
    assert!(tree.contains("--lambda[even]\n"));
    assert!(tree.contains("--lambda[odd]\n"));

    let lowered = destruct(&graph, "m", "", "");
    assert!(lowered.ipgraph().lookup_function("even").unwrap().dependencies.contains("odd"));
    let again = construct(&lowered);
    let again_tree = region_tree(&again, again.root());
    // Member order within the binding group is component order and may
    // differ between runs; the shape is what matters.
    assert!(again_tree.contains("-phi\n"));
    assert!(again_tree.contains("--lambda[even]\n"));
    assert!(again_tree.contains("--lambda[odd]\n"));
}
