//! Mutation notifiers.
//!
//! Every graph mutation fires a [`GraphEvent`] synchronously before the
//! mutating call returns. Subscribers (traversers, caches) register through
//! [`Graph::subscribe`](crate::graph::Graph::subscribe), which hands back the
//! owning `Rc`; the graph keeps only a `Weak` handle, so dropping the `Rc`
//! deregisters the subscriber. Subscribers receive events only -- never the
//! graph itself -- which rules out re-entrant mutation from inside a
//! notifier.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::graph::{NodeId, Origin, RegionId, User};

/// One graph mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    RegionCreate(RegionId),
    RegionDestroy(RegionId),
    NodeCreate { node: NodeId, region: RegionId },
    NodeDestroy { node: NodeId, region: RegionId },
    InputCreate(User),
    InputDestroy(User),
    InputChange { user: User, old: Origin, new: Origin },
    OutputCreate(Origin),
    OutputDestroy(Origin),
    DepthChange { node: NodeId, old: usize, new: usize },
}

/// Receives graph events synchronously.
pub trait Subscriber {
    fn on_event(&mut self, event: &GraphEvent);
}

/// The graph-held list of subscriber handles.
#[derive(Default)]
pub struct SubscriberList {
    subscribers: Vec<Weak<RefCell<dyn Subscriber>>>,
}

impl SubscriberList {
    pub fn register(&mut self, subscriber: &Rc<RefCell<dyn Subscriber>>) {
        self.subscribers.push(Rc::downgrade(subscriber));
    }

    pub fn notify(&mut self, event: &GraphEvent) {
        self.subscribers.retain(|weak| weak.strong_count() > 0);
        for weak in &self.subscribers {
            if let Some(subscriber) = weak.upgrade() {
                subscriber.borrow_mut().on_event(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.iter().filter(|w| w.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SubscriberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberList").field("len", &self.len()).finish()
    }
}
