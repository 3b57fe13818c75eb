//! The pass pipeline and its statistics.
//!
//! Passes run in pipeline order within one thread of control; each either
//! completes or aborts on an invariant violation. The pipeline measures
//! every pass -- node count before and after, wall time at nanosecond
//! resolution -- and hands the record to a collector that keeps only the
//! demanded pass ids.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use sylva_rvsdg::Graph;

/// Identifies a pass in statistics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    Normalization,
    DeadNodeElimination,
    CommonSubexpressionElimination,
    FunctionInlining,
    ThetaGammaInversion,
    Reduction,
}

/// One pass execution record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassStatistics {
    pub pass: PassId,
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub elapsed: Duration,
}

impl PassStatistics {
    pub fn to_line(&self) -> String {
        format!(
            "{:?} {} {} {}",
            self.pass,
            self.nodes_before,
            self.nodes_after,
            self.elapsed.as_nanos()
        )
    }
}

/// Collects statistics for the demanded pass ids and discards the rest.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    demanded: HashSet<PassId>,
    collected: Vec<PassStatistics>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        StatisticsCollector::default()
    }

    /// A collector pre-seeded with the given demanded ids.
    pub fn demanding(ids: impl IntoIterator<Item = PassId>) -> Self {
        StatisticsCollector { demanded: ids.into_iter().collect(), collected: vec![] }
    }

    pub fn demand(&mut self, id: PassId) {
        self.demanded.insert(id);
    }

    pub fn collect(&mut self, statistics: PassStatistics) {
        if self.demanded.contains(&statistics.pass) {
            self.collected.push(statistics);
        }
    }

    pub fn collected(&self) -> &[PassStatistics] {
        &self.collected
    }
}

/// A graph-to-graph transformation.
pub trait Pass {
    fn id(&self) -> PassId;
    fn run(&mut self, graph: &mut Graph);
}

/// Runs the passes in order, collecting one record per pass.
pub fn run_pipeline(
    graph: &mut Graph,
    passes: &mut [Box<dyn Pass>],
    collector: &mut StatisticsCollector,
) {
    for pass in passes {
        let nodes_before = graph.nnodes_recursive(graph.root());
        let start = Instant::now();
        pass.run(graph);
        let elapsed = start.elapsed();
        let nodes_after = graph.nnodes_recursive(graph.root());
        tracing::debug!(
            pass = ?pass.id(),
            nodes_before,
            nodes_after,
            elapsed_ns = elapsed.as_nanos() as u64,
            "pass finished"
        );
        collector.collect(PassStatistics { pass: pass.id(), nodes_before, nodes_after, elapsed });
    }
}

/// Node-level normalization as a pipeline pass.
pub struct Normalization;

impl Pass for Normalization {
    fn id(&self) -> PassId {
        PassId::Normalization
    }

    fn run(&mut self, graph: &mut Graph) {
        sylva_rvsdg::normalize(graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dne::DeadNodeElimination;
    use sylva_ir::{Operation, Type};

    #[test]
    fn collector_keeps_only_demanded_records() {
        let mut collector = StatisticsCollector::new();
        collector.demand(PassId::DeadNodeElimination);

        let mut graph = Graph::new();
        graph.add_simple_node(graph.root(), Operation::bitconst(32, 1), &[]);
        let kept = graph.add_simple_node(graph.root(), Operation::bitconst(32, 2), &[]);
        graph.add_export(sylva_rvsdg::Origin::Output { node: kept, index: 0 }, "out");

        let mut passes: Vec<Box<dyn Pass>> =
            vec![Box::new(Normalization), Box::new(DeadNodeElimination)];
        run_pipeline(&mut graph, &mut passes, &mut collector);

        assert_eq!(collector.collected().len(), 1);
        let record = &collector.collected()[0];
        assert_eq!(record.pass, PassId::DeadNodeElimination);
        assert_eq!(record.nodes_before, 2);
        assert_eq!(record.nodes_after, 1);
        assert!(record.to_line().starts_with("DeadNodeElimination 2 1 "));
    }

    #[test]
    fn pipeline_runs_in_order() {
        let mut collector = StatisticsCollector::demanding([
            PassId::Normalization,
            PassId::DeadNodeElimination,
        ]);
        let mut graph = Graph::new();
        let _ = graph.add_import(Type::bits(8), "x");
        let mut passes: Vec<Box<dyn Pass>> =
            vec![Box::new(Normalization), Box::new(DeadNodeElimination)];
        run_pipeline(&mut graph, &mut passes, &mut collector);
        let ids: Vec<PassId> = collector.collected().iter().map(|s| s.pass).collect();
        assert_eq!(ids, vec![PassId::Normalization, PassId::DeadNodeElimination]);
    }
}
