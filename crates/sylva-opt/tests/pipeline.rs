//! Whole-pipeline tests: symbolic IR -> RVSDG -> optimization passes, with
//! the pipeline applied twice to check idempotence.

use sylva_ir::ops::{BitCompareOp, Operation};
use sylva_ir::tac::Tac;
use sylva_ir::types::Type;
use sylva_ir::variable::{Linkage, Var};
use sylva_ir::Module;

use sylva_conv::construct;
use sylva_opt::{
    CommonSubexpressionElimination, DeadNodeElimination, FunctionInlining, Normalization,
    Pass, PassId, Reduction, StatisticsCollector, ThetaGammaInversion,
};
use sylva_rvsdg::{region_tree, view_text, NodeKind};

fn pipeline() -> Vec<Box<dyn Pass>> {
    vec![
        Box::new(FunctionInlining),
        Box::new(ThetaGammaInversion),
        Box::new(Normalization),
        Box::new(Reduction::default()),
        Box::new(CommonSubexpressionElimination),
        Box::new(DeadNodeElimination),
    ]
}

/// callee(x) = x + 1, called exactly once from an exported main.
fn build_single_call_module() -> Module {
    let mut module = Module::new("m", "", "");
    module
        .create_function(
            "callee",
            vec![("x".into(), Type::bits(32))],
            vec![Type::bits(32)],
            Linkage::Internal,
            false,
        )
        .unwrap();
    module
        .create_function("main", vec![], vec![Type::bits(32)], Linkage::External, true)
        .unwrap();
    module.add_dependency("main", "callee").unwrap();

    let globals = module.globals().clone();
    {
        let f = module.ipgraph_mut().lookup_function_mut("callee").unwrap();
        let cfg = f.cfg.as_mut().unwrap();
        let x = cfg.arguments()[0];
        let (io, mem) = (cfg.arguments()[1], cfg.arguments()[2]);
        let bb = cfg.add_basic_block();
        let one = cfg.create_variable(Type::bits(32));
        let sum = cfg.create_variable(Type::bits(32));
        cfg.append_tac(
            bb,
            Tac::new(Operation::bitconst(32, 1), vec![], vec![Var::Local(one)]),
            &globals,
        );
        cfg.append_tac(
            bb,
            Tac::new(
                Operation::bitadd(32),
                vec![Var::Local(x), Var::Local(one)],
                vec![Var::Local(sum)],
            ),
            &globals,
        );
        cfg.redirect_outedge(cfg.entry(), 0, bb);
        cfg.add_outedge(bb, cfg.exit());
        cfg.set_results(vec![sum, io, mem]);
    }

    let callee = module.symbol("callee").unwrap();
    let callee_type = match &module.globals().get(callee).unwrap().ty {
        Type::Function(ft) => ft.clone(),
        _ => unreachable!(),
    };
    {
        let f = module.ipgraph_mut().lookup_function_mut("main").unwrap();
        let cfg = f.cfg.as_mut().unwrap();
        let (io, mem) = (cfg.arguments()[0], cfg.arguments()[1]);
        let bb = cfg.add_basic_block();
        let three = cfg.create_variable(Type::bits(32));
        let r = cfg.create_variable(Type::bits(32));
        let io2 = cfg.create_variable(Type::IoState);
        let mem2 = cfg.create_variable(Type::MemState);
        cfg.append_tac(
            bb,
            Tac::new(Operation::bitconst(32, 3), vec![], vec![Var::Local(three)]),
            &globals,
        );
        cfg.append_tac(
            bb,
            Tac::new(
                Operation::Call { fn_type: callee_type },
                vec![
                    Var::Global(callee),
                    Var::Local(three),
                    Var::Local(io),
                    Var::Local(mem),
                ],
                vec![Var::Local(r), Var::Local(io2), Var::Local(mem2)],
            ),
            &globals,
        );
        cfg.redirect_outedge(cfg.entry(), 0, bb);
        cfg.add_outedge(bb, cfg.exit());
        cfg.set_results(vec![r, io2, mem2]);
    }
    module
}

/// A loop whose branch decision is loop-invariant: the inversion candidate
/// straight from the symbolic IR.
fn build_invariant_branch_module() -> Module {
    let mut module = Module::new("m", "", "");
    module
        .create_function(
            "walk",
            vec![("flag".into(), Type::bits(1)), ("v".into(), Type::bits(32))],
            vec![Type::bits(32)],
            Linkage::External,
            true,
        )
        .unwrap();

    let globals = module.globals().clone();
    let f = module.ipgraph_mut().lookup_function_mut("walk").unwrap();
    let cfg = f.cfg.as_mut().unwrap();
    let flag = cfg.arguments()[0];
    let v = cfg.arguments()[1];
    let (io, mem) = (cfg.arguments()[2], cfg.arguments()[3]);

    // do { if (flag) v += 1; else v += 2; } while (v < 100)
    let head = cfg.add_basic_block();
    let then_bb = cfg.add_basic_block();
    let else_bb = cfg.add_basic_block();
    let latch = cfg.add_basic_block();
    let after = cfg.add_basic_block();

    let sel = cfg.create_variable(Type::control(2));
    let one = cfg.create_variable(Type::bits(32));
    let two = cfg.create_variable(Type::bits(32));
    let limit = cfg.create_variable(Type::bits(32));
    let cmp = cfg.create_variable(Type::bits(1));
    let rep = cfg.create_variable(Type::control(2));

    cfg.append_tac(
        head,
        Tac::new(
            Operation::Match { nbits: 1, mapping: vec![(0, 0)], default: 1, alternatives: 2 },
            vec![Var::Local(flag)],
            vec![Var::Local(sel)],
        ),
        &globals,
    );
    cfg.append_tac(
        head,
        Tac::new(Operation::Branch { alternatives: 2 }, vec![Var::Local(sel)], vec![]),
        &globals,
    );
    cfg.append_tac(
        then_bb,
        Tac::new(Operation::bitconst(32, 1), vec![], vec![Var::Local(one)]),
        &globals,
    );
    cfg.append_tac(
        then_bb,
        Tac::new(
            Operation::bitadd(32),
            vec![Var::Local(v), Var::Local(one)],
            vec![Var::Local(v)],
        ),
        &globals,
    );
    cfg.append_tac(
        else_bb,
        Tac::new(Operation::bitconst(32, 2), vec![], vec![Var::Local(two)]),
        &globals,
    );
    cfg.append_tac(
        else_bb,
        Tac::new(
            Operation::bitadd(32),
            vec![Var::Local(v), Var::Local(two)],
            vec![Var::Local(v)],
        ),
        &globals,
    );
    cfg.append_tac(
        latch,
        Tac::new(Operation::bitconst(32, 100), vec![], vec![Var::Local(limit)]),
        &globals,
    );
    cfg.append_tac(
        latch,
        Tac::new(
            Operation::BitCompare { op: BitCompareOp::Slt, width: 32 },
            vec![Var::Local(v), Var::Local(limit)],
            vec![Var::Local(cmp)],
        ),
        &globals,
    );
    cfg.append_tac(
        latch,
        Tac::new(
            Operation::Match { nbits: 1, mapping: vec![(0, 0)], default: 1, alternatives: 2 },
            vec![Var::Local(cmp)],
            vec![Var::Local(rep)],
        ),
        &globals,
    );
    cfg.append_tac(
        latch,
        Tac::new(Operation::Branch { alternatives: 2 }, vec![Var::Local(rep)], vec![]),
        &globals,
    );

    cfg.redirect_outedge(cfg.entry(), 0, head);
    cfg.add_outedge(head, then_bb);
    cfg.add_outedge(head, else_bb);
    cfg.add_outedge(then_bb, latch);
    cfg.add_outedge(else_bb, latch);
    cfg.add_outedge(latch, after); // alternative 0: leave
    cfg.add_outedge(latch, head); // alternative 1: repeat
    cfg.add_outedge(after, cfg.exit());
    cfg.set_results(vec![v, io, mem]);
    cfg.verify();
    module
}

#[test]
fn inlining_dissolves_the_single_call_site() {
    let module = build_single_call_module();
    let mut graph = construct(&module);
    let mut collector = StatisticsCollector::demanding([PassId::FunctionInlining]);
    let mut passes = pipeline();
    sylva_opt::run_pipeline(&mut graph, &mut passes, &mut collector);
    graph.verify();

    // Only the exported main survives; the call was replaced by the inlined
    // add.
    assert_eq!(region_tree(&graph, graph.root()), "ROOT\n-lambda[main]\n");
    let main = graph.region_nodes(graph.root())[0];
    let sub = graph.subregion(main, 0);
    let has_call = graph
        .region_nodes(sub)
        .iter()
        .any(|&n| matches!(graph.node_kind(n), NodeKind::Simple(op) if op.is_call()));
    assert!(!has_call);

    let record = &collector.collected()[0];
    assert_eq!(record.pass, PassId::FunctionInlining);
    assert!(record.nodes_before > 0);
}

#[test]
fn pipeline_is_idempotent() {
    for module in [build_single_call_module(), build_invariant_branch_module()] {
        let mut graph = construct(&module);
        let mut collector = StatisticsCollector::new();

        let mut passes = pipeline();
        sylva_opt::run_pipeline(&mut graph, &mut passes, &mut collector);
        graph.verify();
        let first = view_text(&graph, graph.root());
        let first_count = graph.nnodes_recursive(graph.root());

        let mut passes = pipeline();
        sylva_opt::run_pipeline(&mut graph, &mut passes, &mut collector);
        graph.verify();
        let second = view_text(&graph, graph.root());

        assert_eq!(first_count, graph.nnodes_recursive(graph.root()));
        assert_eq!(first, second, "running the pipeline twice must change nothing");
    }
}

#[test]
fn statistics_report_node_counts_and_time() {
    let module = build_single_call_module();
    let mut graph = construct(&module);
    let mut collector = StatisticsCollector::demanding([
        PassId::FunctionInlining,
        PassId::DeadNodeElimination,
    ]);
    let mut passes = pipeline();
    sylva_opt::run_pipeline(&mut graph, &mut passes, &mut collector);

    assert_eq!(collector.collected().len(), 2);
    // Inlining copies the callee body before the dead lambda is collected,
    // so only elimination is guaranteed to shrink the graph.
    let dne = collector
        .collected()
        .iter()
        .find(|record| record.pass == PassId::DeadNodeElimination)
        .unwrap();
    assert!(dne.nodes_before >= dne.nodes_after);
}
