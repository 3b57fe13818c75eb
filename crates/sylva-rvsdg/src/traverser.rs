//! Region traversers.
//!
//! Two traversal disciplines over one region's nodes:
//!
//! - [`TopDownTraverser`] yields nodes in non-decreasing depth order
//!   (producers before consumers). It is stable to node creation during
//!   iteration: nodes created in the traversed region are appended to the
//!   queue.
//! - [`BottomUpTraverser`] yields nodes in non-increasing depth order and is
//!   stable to node removal during iteration: removed nodes are silently
//!   skipped.
//!
//! Both subscribe to the graph's notifier stream to maintain their queues;
//! dropping a traverser drops its subscription.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use crate::graph::{Graph, NodeId, RegionId};
use crate::notifier::{GraphEvent, Subscriber};

struct TraverserState {
    region: RegionId,
    queue: VecDeque<NodeId>,
    removed: HashSet<NodeId>,
    /// Whether newly created nodes are appended (top-down only).
    track_creation: bool,
}

impl Subscriber for TraverserState {
    fn on_event(&mut self, event: &GraphEvent) {
        match *event {
            GraphEvent::NodeCreate { node, region } => {
                if self.track_creation && region == self.region {
                    self.queue.push_back(node);
                }
            }
            GraphEvent::NodeDestroy { node, region } => {
                if region == self.region {
                    self.removed.insert(node);
                }
            }
            _ => {}
        }
    }
}

fn next_live(state: &Rc<RefCell<TraverserState>>) -> Option<NodeId> {
    let mut state = state.borrow_mut();
    while let Some(node) = state.queue.pop_front() {
        if !state.removed.contains(&node) {
            return Some(node);
        }
    }
    None
}

/// Yields a region's nodes producers-first.
pub struct TopDownTraverser {
    state: Rc<RefCell<TraverserState>>,
}

impl TopDownTraverser {
    pub fn new(graph: &mut Graph, region: RegionId) -> Self {
        let mut nodes = graph.region_nodes(region);
        nodes.sort_by_key(|&node| graph.node_depth(node));
        let state = graph.subscribe(TraverserState {
            region,
            queue: nodes.into(),
            removed: HashSet::new(),
            track_creation: true,
        });
        TopDownTraverser { state }
    }

    pub fn next(&mut self) -> Option<NodeId> {
        next_live(&self.state)
    }
}

/// Yields a region's nodes consumers-first.
pub struct BottomUpTraverser {
    state: Rc<RefCell<TraverserState>>,
}

impl BottomUpTraverser {
    pub fn new(graph: &mut Graph, region: RegionId) -> Self {
        let mut nodes = graph.region_nodes(region);
        nodes.sort_by_key(|&node| std::cmp::Reverse(graph.node_depth(node)));
        let state = graph.subscribe(TraverserState {
            region,
            queue: nodes.into(),
            removed: HashSet::new(),
            track_creation: false,
        });
        BottomUpTraverser { state }
    }

    pub fn next(&mut self) -> Option<NodeId> {
        next_live(&self.state)
    }
}
