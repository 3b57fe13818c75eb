//! The RVSDG graph arena.
//!
//! A [`Graph`] owns every region and node it contains. Regions and nodes are
//! addressed by typed `u32` handles ([`RegionId`], [`NodeId`]); equality on
//! handles is identity, and a handle stays valid until the entity is
//! destroyed. Cross-references -- an input's origin, an output's user set --
//! are [`Origin`]/[`User`] values rather than pointers.
//!
//! A region owns ordered arguments, ordered results, and an ordered node set.
//! Every node has ordered inputs and outputs; each input's origin is an
//! output or an argument *in the same region* (crossing a region boundary
//! requires a context/entry/loop variable on the enclosing structural node).
//! Origin/user links are maintained bidirectionally on every mutation.
//!
//! Node depth is the longest dependency chain from the region's arguments.
//! It is maintained incrementally and cascades through users, so the
//! traversers can keep depth-ordered queues via the notifier stream.
//!
//! Invariant violations (origin in a foreign region, removing a node whose
//! outputs still have users, type mismatches at node creation) panic; they
//! are programmer errors, not recoverable conditions.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use sylva_ir::{FunctionType, Linkage, Operation, Type};

use crate::normal_forms::NormalForms;
use crate::notifier::{GraphEvent, Subscriber, SubscriberList};

/// Handle of a node within one [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Handle of a region within one [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

/// Where a value comes from: a node output or a region argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Output { node: NodeId, index: usize },
    Argument { region: RegionId, index: usize },
}

/// Who consumes a value: a node input or a region result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum User {
    Input { node: NodeId, index: usize },
    Result { region: RegionId, index: usize },
}

/// The node taxonomy: one simple variant carrying an operation, five
/// structural variants carrying subregions.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Simple(Operation),
    /// n-way branch with join; input 0 is the predicate.
    Gamma,
    /// Tail-controlled loop; subregion result 0 is the predicate.
    Theta,
    /// Function binder.
    Lambda { name: String, fn_type: FunctionType, linkage: Linkage },
    /// Mutually recursive binding group.
    Phi,
    /// Global data binder.
    Delta { name: String, linkage: Linkage, constant: bool },
}

impl NodeKind {
    pub fn is_simple(&self) -> bool {
        matches!(self, NodeKind::Simple(_))
    }

    pub fn is_structural(&self) -> bool {
        !self.is_simple()
    }

    pub fn operation(&self) -> Option<&Operation> {
        match self {
            NodeKind::Simple(op) => Some(op),
            _ => None,
        }
    }

    pub fn debug_string(&self) -> String {
        match self {
            NodeKind::Simple(op) => op.debug_string(),
            NodeKind::Gamma => "gamma".to_string(),
            NodeKind::Theta => "theta".to_string(),
            NodeKind::Lambda { name, .. } => format!("lambda[{}]", name),
            NodeKind::Phi => "phi".to_string(),
            NodeKind::Delta { name, .. } => format!("delta[{}]", name),
        }
    }
}

#[derive(Debug)]
struct InputData {
    origin: Origin,
    ty: Type,
}

#[derive(Debug)]
struct OutputData {
    ty: Type,
    users: IndexSet<User>,
}

#[derive(Debug)]
struct ArgumentData {
    ty: Type,
    users: IndexSet<User>,
    name: Option<String>,
}

#[derive(Debug)]
struct ResultData {
    origin: Origin,
    ty: Type,
    name: Option<String>,
}

#[derive(Debug)]
struct NodeData {
    region: RegionId,
    kind: NodeKind,
    inputs: Vec<InputData>,
    outputs: Vec<OutputData>,
    subregions: SmallVec<[RegionId; 2]>,
    depth: usize,
}

#[derive(Debug)]
struct RegionData {
    owner: Option<NodeId>,
    arguments: Vec<ArgumentData>,
    results: Vec<ResultData>,
    nodes: IndexSet<NodeId>,
}

/// The RVSDG.
#[derive(Debug)]
pub struct Graph {
    regions: Vec<Option<RegionData>>,
    nodes: Vec<Option<NodeData>>,
    root: RegionId,
    /// Per-graph normal form switches, seeded at construction.
    pub normal_forms: NormalForms,
    mutable_mode: bool,
    subscribers: SubscriberList,
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        let mut graph = Graph {
            regions: vec![],
            nodes: vec![],
            root: RegionId(0),
            normal_forms: NormalForms::default(),
            mutable_mode: true,
            subscribers: SubscriberList::default(),
        };
        graph.root = graph.create_region(None);
        graph
    }

    pub fn root(&self) -> RegionId {
        self.root
    }

    /// Whether a node handle is still alive.
    pub fn node_exists(&self, node: NodeId) -> bool {
        self.nodes.get(node.0 as usize).map_or(false, |slot| slot.is_some())
    }

    /// Whether a region handle is still alive.
    pub fn region_exists(&self, region: RegionId) -> bool {
        self.regions.get(region.0 as usize).map_or(false, |slot| slot.is_some())
    }

    /// Whether normal-form rules may rewrite the graph.
    pub fn is_mutable(&self) -> bool {
        self.mutable_mode
    }

    pub fn set_mutable(&mut self, enabled: bool) {
        self.mutable_mode = enabled;
    }

    // -----------------------------------------------------------------------
    // Subscribers
    // -----------------------------------------------------------------------

    /// Registers a subscriber; the returned `Rc` is the registration --
    /// dropping it deregisters.
    pub fn subscribe<S: Subscriber + 'static>(&mut self, subscriber: S) -> Rc<RefCell<S>> {
        let rc = Rc::new(RefCell::new(subscriber));
        let dynamic: Rc<RefCell<dyn Subscriber>> = rc.clone();
        self.subscribers.register(&dynamic);
        rc
    }

    fn notify(&mut self, event: GraphEvent) {
        self.subscribers.notify(&event);
    }

    // -----------------------------------------------------------------------
    // Internal accessors
    // -----------------------------------------------------------------------

    fn region_data(&self, region: RegionId) -> &RegionData {
        self.regions[region.0 as usize].as_ref().expect("region was destroyed")
    }

    fn region_data_mut(&mut self, region: RegionId) -> &mut RegionData {
        self.regions[region.0 as usize].as_mut().expect("region was destroyed")
    }

    fn node_data(&self, node: NodeId) -> &NodeData {
        self.nodes[node.0 as usize].as_ref().expect("node was destroyed")
    }

    fn node_data_mut(&mut self, node: NodeId) -> &mut NodeData {
        self.nodes[node.0 as usize].as_mut().expect("node was destroyed")
    }

    // -----------------------------------------------------------------------
    // Region accessors
    // -----------------------------------------------------------------------

    pub fn region_owner(&self, region: RegionId) -> Option<NodeId> {
        self.region_data(region).owner
    }

    /// Node ids of a region in insertion order.
    pub fn region_nodes(&self, region: RegionId) -> Vec<NodeId> {
        self.region_data(region).nodes.iter().copied().collect()
    }

    pub fn region_nnodes(&self, region: RegionId) -> usize {
        self.region_data(region).nodes.len()
    }

    /// Total node count of a region including nested subregions.
    pub fn nnodes_recursive(&self, region: RegionId) -> usize {
        let mut count = 0;
        for node in self.region_nodes(region) {
            count += 1;
            for sub in self.subregions(node) {
                count += self.nnodes_recursive(sub);
            }
        }
        count
    }

    pub fn narguments(&self, region: RegionId) -> usize {
        self.region_data(region).arguments.len()
    }

    pub fn argument_type(&self, region: RegionId, index: usize) -> &Type {
        &self.region_data(region).arguments[index].ty
    }

    pub fn argument_name(&self, region: RegionId, index: usize) -> Option<&str> {
        self.region_data(region).arguments[index].name.as_deref()
    }

    pub fn nresults(&self, region: RegionId) -> usize {
        self.region_data(region).results.len()
    }

    pub fn result_origin(&self, region: RegionId, index: usize) -> Origin {
        self.region_data(region).results[index].origin
    }

    pub fn result_type(&self, region: RegionId, index: usize) -> &Type {
        &self.region_data(region).results[index].ty
    }

    pub fn result_name(&self, region: RegionId, index: usize) -> Option<&str> {
        self.region_data(region).results[index].name.as_deref()
    }

    // -----------------------------------------------------------------------
    // Node accessors
    // -----------------------------------------------------------------------

    pub fn node_kind(&self, node: NodeId) -> &NodeKind {
        &self.node_data(node).kind
    }

    pub fn node_region(&self, node: NodeId) -> RegionId {
        self.node_data(node).region
    }

    pub fn node_depth(&self, node: NodeId) -> usize {
        self.node_data(node).depth
    }

    pub fn ninputs(&self, node: NodeId) -> usize {
        self.node_data(node).inputs.len()
    }

    pub fn input_origin(&self, node: NodeId, index: usize) -> Origin {
        self.node_data(node).inputs[index].origin
    }

    pub fn input_type(&self, node: NodeId, index: usize) -> &Type {
        &self.node_data(node).inputs[index].ty
    }

    pub fn noutputs(&self, node: NodeId) -> usize {
        self.node_data(node).outputs.len()
    }

    pub fn output(&self, node: NodeId, index: usize) -> Origin {
        debug_assert!(index < self.noutputs(node));
        Origin::Output { node, index }
    }

    pub fn output_type(&self, node: NodeId, index: usize) -> &Type {
        &self.node_data(node).outputs[index].ty
    }

    pub fn subregions(&self, node: NodeId) -> Vec<RegionId> {
        self.node_data(node).subregions.to_vec()
    }

    pub fn nsubregions(&self, node: NodeId) -> usize {
        self.node_data(node).subregions.len()
    }

    pub fn subregion(&self, node: NodeId, index: usize) -> RegionId {
        self.node_data(node).subregions[index]
    }

    /// The region an origin lives in.
    pub fn origin_region(&self, origin: Origin) -> RegionId {
        match origin {
            Origin::Output { node, .. } => self.node_region(node),
            Origin::Argument { region, .. } => region,
        }
    }

    /// The type of an origin.
    pub fn origin_type(&self, origin: Origin) -> &Type {
        match origin {
            Origin::Output { node, index } => self.output_type(node, index),
            Origin::Argument { region, index } => self.argument_type(region, index),
        }
    }

    /// The users of an origin, in registration order.
    pub fn users(&self, origin: Origin) -> Vec<User> {
        match origin {
            Origin::Output { node, index } => {
                self.node_data(node).outputs[index].users.iter().copied().collect()
            }
            Origin::Argument { region, index } => {
                self.region_data(region).arguments[index].users.iter().copied().collect()
            }
        }
    }

    pub fn nusers(&self, origin: Origin) -> usize {
        match origin {
            Origin::Output { node, index } => self.node_data(node).outputs[index].users.len(),
            Origin::Argument { region, index } => {
                self.region_data(region).arguments[index].users.len()
            }
        }
    }

    /// The origin a user currently reads.
    pub fn user_origin(&self, user: User) -> Origin {
        match user {
            User::Input { node, index } => self.input_origin(node, index),
            User::Result { region, index } => self.result_origin(region, index),
        }
    }

    /// The producing node of an origin, if it is a node output.
    pub fn origin_node(&self, origin: Origin) -> Option<NodeId> {
        match origin {
            Origin::Output { node, .. } => Some(node),
            Origin::Argument { .. } => None,
        }
    }

    // -----------------------------------------------------------------------
    // Region construction
    // -----------------------------------------------------------------------

    fn create_region(&mut self, owner: Option<NodeId>) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(Some(RegionData {
            owner,
            arguments: vec![],
            results: vec![],
            nodes: IndexSet::new(),
        }));
        self.notify(GraphEvent::RegionCreate(id));
        id
    }

    /// Appends an argument to a region; returns its origin.
    pub fn add_argument(&mut self, region: RegionId, ty: Type, name: Option<String>) -> Origin {
        let data = self.region_data_mut(region);
        let index = data.arguments.len();
        data.arguments.push(ArgumentData { ty, users: IndexSet::new(), name });
        let origin = Origin::Argument { region, index };
        self.notify(GraphEvent::OutputCreate(origin));
        origin
    }

    /// Appends a result reading `origin`; returns its index.
    pub fn add_result(&mut self, region: RegionId, origin: Origin, name: Option<String>) -> usize {
        assert_eq!(
            self.origin_region(origin),
            region,
            "result origin must live in the same region"
        );
        let ty = self.origin_type(origin).clone();
        let data = self.region_data_mut(region);
        let index = data.results.len();
        data.results.push(ResultData { origin, ty, name });
        let user = User::Result { region, index };
        self.link(origin, user);
        self.notify(GraphEvent::InputCreate(user));
        index
    }

    /// A root-region argument modelling an imported symbol.
    pub fn add_import(&mut self, ty: Type, name: impl Into<String>) -> Origin {
        let root = self.root;
        self.add_argument(root, ty, Some(name.into()))
    }

    /// A root-region result modelling an exported symbol.
    pub fn add_export(&mut self, origin: Origin, name: impl Into<String>) -> usize {
        let root = self.root;
        self.add_result(root, origin, Some(name.into()))
    }

    // -----------------------------------------------------------------------
    // Node construction
    // -----------------------------------------------------------------------

    /// Creates a simple node without applying normal forms.
    pub fn add_simple_node(
        &mut self,
        region: RegionId,
        operation: Operation,
        operands: &[Origin],
    ) -> NodeId {
        let expected = operation.arguments();
        assert_eq!(operands.len(), expected.len(), "operand arity mismatch at node creation");
        for (n, (operand, ty)) in operands.iter().zip(&expected).enumerate() {
            assert_eq!(
                self.origin_region(*operand),
                region,
                "operand {} origin is in a different region",
                n
            );
            assert_eq!(
                self.origin_type(*operand),
                ty,
                "operand {} type mismatch at node creation",
                n
            );
        }
        let outputs = operation.results();
        self.build_node(region, NodeKind::Simple(operation), operands, &outputs, 0)
    }

    /// Creates a structural node shell: typed inputs, typed outputs, and
    /// `nsubregions` fresh, empty subregions.
    pub(crate) fn add_structural_node(
        &mut self,
        region: RegionId,
        kind: NodeKind,
        operands: &[Origin],
        output_types: &[Type],
        nsubregions: usize,
    ) -> NodeId {
        assert!(kind.is_structural());
        self.build_node(region, kind, operands, output_types, nsubregions)
    }

    fn build_node(
        &mut self,
        region: RegionId,
        kind: NodeKind,
        operands: &[Origin],
        output_types: &[Type],
        nsubregions: usize,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let inputs = operands
            .iter()
            .map(|&origin| {
                assert_eq!(self.origin_region(origin), region, "origin is in a different region");
                InputData { origin, ty: self.origin_type(origin).clone() }
            })
            .collect();
        let outputs = output_types
            .iter()
            .map(|ty| OutputData { ty: ty.clone(), users: IndexSet::new() })
            .collect();
        self.nodes.push(Some(NodeData {
            region,
            kind,
            inputs,
            outputs,
            subregions: SmallVec::new(),
            depth: 0,
        }));
        self.region_data_mut(region).nodes.insert(id);

        for index in 0..nsubregions {
            let sub = self.create_region(Some(id));
            self.node_data_mut(id).subregions.push(sub);
            debug_assert_eq!(self.node_data(id).subregions[index], sub);
        }

        for (index, &origin) in operands.iter().enumerate() {
            self.link(origin, User::Input { node: id, index });
        }
        let depth = self.compute_depth(id);
        self.node_data_mut(id).depth = depth;

        self.notify(GraphEvent::NodeCreate { node: id, region });
        for index in 0..operands.len() {
            self.notify(GraphEvent::InputCreate(User::Input { node: id, index }));
        }
        for index in 0..output_types.len() {
            self.notify(GraphEvent::OutputCreate(Origin::Output { node: id, index }));
        }
        id
    }

    /// Appends an input to an existing (structural) node; returns its index.
    pub fn add_input(&mut self, node: NodeId, origin: Origin) -> usize {
        let region = self.node_region(node);
        assert_eq!(self.origin_region(origin), region, "origin is in a different region");
        let ty = self.origin_type(origin).clone();
        let data = self.node_data_mut(node);
        let index = data.inputs.len();
        data.inputs.push(InputData { origin, ty });
        self.link(origin, User::Input { node, index });
        self.notify(GraphEvent::InputCreate(User::Input { node, index }));
        self.update_depth(node);
        index
    }

    /// Appends an output to an existing (structural) node; returns its
    /// origin.
    pub fn add_output(&mut self, node: NodeId, ty: Type) -> Origin {
        let data = self.node_data_mut(node);
        let index = data.outputs.len();
        data.outputs.push(OutputData { ty, users: IndexSet::new() });
        let origin = Origin::Output { node, index };
        self.notify(GraphEvent::OutputCreate(origin));
        origin
    }

    // -----------------------------------------------------------------------
    // Rewiring
    // -----------------------------------------------------------------------

    fn link(&mut self, origin: Origin, user: User) {
        match origin {
            Origin::Output { node, index } => {
                self.node_data_mut(node).outputs[index].users.insert(user);
            }
            Origin::Argument { region, index } => {
                self.region_data_mut(region).arguments[index].users.insert(user);
            }
        }
    }

    fn unlink(&mut self, origin: Origin, user: User) {
        match origin {
            Origin::Output { node, index } => {
                self.node_data_mut(node).outputs[index].users.shift_remove(&user);
            }
            Origin::Argument { region, index } => {
                self.region_data_mut(region).arguments[index].users.shift_remove(&user);
            }
        }
    }

    /// Retargets one user at a new origin.
    pub fn divert(&mut self, user: User, new_origin: Origin) {
        let old = self.user_origin(user);
        if old == new_origin {
            return;
        }
        let region = match user {
            User::Input { node, .. } => self.node_region(node),
            User::Result { region, .. } => region,
        };
        assert_eq!(self.origin_region(new_origin), region, "origin is in a different region");
        assert_eq!(
            self.origin_type(new_origin),
            self.origin_type(old),
            "divert must preserve the type"
        );

        self.unlink(old, user);
        self.link(new_origin, user);
        match user {
            User::Input { node, index } => {
                self.node_data_mut(node).inputs[index].origin = new_origin;
            }
            User::Result { region, index } => {
                self.region_data_mut(region).results[index].origin = new_origin;
            }
        }
        self.notify(GraphEvent::InputChange { user, old, new: new_origin });
        if let User::Input { node, .. } = user {
            self.update_depth(node);
        }
    }

    /// Retargets every user of `from` at `to`.
    pub fn divert_users(&mut self, from: Origin, to: Origin) {
        if from == to {
            return;
        }
        for user in self.users(from) {
            self.divert(user, to);
        }
    }

    /// Diverts the users of every output of `node` to the corresponding
    /// entry of `origins`.
    pub fn divert_node_users(&mut self, node: NodeId, origins: &[Origin]) {
        assert_eq!(self.noutputs(node), origins.len());
        for (index, &to) in origins.iter().enumerate() {
            self.divert_users(Origin::Output { node, index }, to);
        }
    }

    // -----------------------------------------------------------------------
    // Removal
    // -----------------------------------------------------------------------

    fn rekey_user(&mut self, origin: Origin, old: User, new: User) {
        match origin {
            Origin::Output { node, index } => {
                let users = &mut self.node_data_mut(node).outputs[index].users;
                users.shift_remove(&old);
                users.insert(new);
            }
            Origin::Argument { region, index } => {
                let users = &mut self.region_data_mut(region).arguments[index].users;
                users.shift_remove(&old);
                users.insert(new);
            }
        }
    }

    /// Removes one input of a structural node; later inputs shift down one
    /// index.
    pub fn remove_input(&mut self, node: NodeId, index: usize) {
        let origin = self.input_origin(node, index);
        self.unlink(origin, User::Input { node, index });
        self.notify(GraphEvent::InputDestroy(User::Input { node, index }));
        self.node_data_mut(node).inputs.remove(index);
        for i in index..self.ninputs(node) {
            let origin = self.input_origin(node, i);
            self.rekey_user(
                origin,
                User::Input { node, index: i + 1 },
                User::Input { node, index: i },
            );
        }
        self.update_depth(node);
    }

    /// Removes a region argument without users; later arguments shift down
    /// one index and their users' stored origins are re-keyed.
    pub fn remove_argument(&mut self, region: RegionId, index: usize) {
        assert_eq!(
            self.nusers(Origin::Argument { region, index }),
            0,
            "cannot remove an argument that still has users"
        );
        self.notify(GraphEvent::OutputDestroy(Origin::Argument { region, index }));
        self.region_data_mut(region).arguments.remove(index);
        for i in index..self.narguments(region) {
            let old = Origin::Argument { region, index: i + 1 };
            let new = Origin::Argument { region, index: i };
            for user in self.users(new) {
                // The user set moved down with the argument; only the
                // users' stored origins still carry the old index.
                match user {
                    User::Input { node, index } => {
                        self.node_data_mut(node).inputs[index].origin = new;
                    }
                    User::Result { region, index } => {
                        self.region_data_mut(region).results[index].origin = new;
                    }
                }
                self.notify(GraphEvent::InputChange { user, old, new });
            }
        }
    }

    /// Returns `true` if no output of `node` has users.
    pub fn is_unused(&self, node: NodeId) -> bool {
        (0..self.noutputs(node)).all(|index| self.nusers(Origin::Output { node, index }) == 0)
    }

    /// Removes a node. Its outputs must have no users; its subregions are
    /// destroyed with everything they contain.
    pub fn remove_node(&mut self, node: NodeId) {
        assert!(self.is_unused(node), "cannot remove a node whose outputs have users");

        for sub in self.subregions(node) {
            self.destroy_region(sub);
        }

        let region = self.node_region(node);
        for index in (0..self.ninputs(node)).rev() {
            let user = User::Input { node, index };
            let origin = self.input_origin(node, index);
            self.unlink(origin, user);
            self.notify(GraphEvent::InputDestroy(user));
        }
        for index in (0..self.noutputs(node)).rev() {
            self.notify(GraphEvent::OutputDestroy(Origin::Output { node, index }));
        }

        self.region_data_mut(region).nodes.shift_remove(&node);
        self.nodes[node.0 as usize] = None;
        self.notify(GraphEvent::NodeDestroy { node, region });
    }

    fn destroy_region(&mut self, region: RegionId) {
        // Unlink results first, then nodes in reverse depth order so that
        // no removed node still has users.
        for index in (0..self.nresults(region)).rev() {
            let user = User::Result { region, index };
            let origin = self.result_origin(region, index);
            self.unlink(origin, user);
            self.notify(GraphEvent::InputDestroy(user));
        }
        self.region_data_mut(region).results.clear();

        let mut nodes = self.region_nodes(region);
        nodes.sort_by_key(|&n| std::cmp::Reverse(self.node_depth(n)));
        for node in nodes {
            // Inner cycles cannot exist; reverse depth order guarantees all
            // users are gone by the time a node is reached.
            for index in 0..self.noutputs(node) {
                let users = self.users(Origin::Output { node, index });
                assert!(users.is_empty(), "dangling user while destroying a region");
            }
            self.remove_node(node);
        }

        for index in (0..self.narguments(region)).rev() {
            self.notify(GraphEvent::OutputDestroy(Origin::Argument { region, index }));
        }
        self.regions[region.0 as usize] = None;
        self.notify(GraphEvent::RegionDestroy(region));
    }

    // -----------------------------------------------------------------------
    // Depth maintenance
    // -----------------------------------------------------------------------

    fn compute_depth(&self, node: NodeId) -> usize {
        self.node_data(node)
            .inputs
            .iter()
            .map(|input| match input.origin {
                Origin::Output { node: producer, .. } => self.node_depth(producer) + 1,
                Origin::Argument { .. } => 0,
            })
            .max()
            .unwrap_or(0)
    }

    fn update_depth(&mut self, node: NodeId) {
        let new = self.compute_depth(node);
        let old = self.node_depth(node);
        if new == old {
            return;
        }
        self.node_data_mut(node).depth = new;
        self.notify(GraphEvent::DepthChange { node, old, new });
        for index in 0..self.noutputs(node) {
            for user in self.users(Origin::Output { node, index }) {
                if let User::Input { node: consumer, .. } = user {
                    self.update_depth(consumer);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Verification
    // -----------------------------------------------------------------------

    /// Asserts the structural invariants over the whole graph: origin/user
    /// bidirectionality, same-region nesting, depth correctness, and the
    /// gamma/theta conventions.
    pub fn verify(&self) {
        self.verify_region(self.root);
    }

    fn verify_region(&self, region: RegionId) {
        for index in 0..self.nresults(region) {
            assert_eq!(self.origin_region(self.result_origin(region, index)), region);
        }
        for node in self.region_nodes(region) {
            assert_eq!(self.node_region(node), region);
            for index in 0..self.ninputs(node) {
                let origin = self.input_origin(node, index);
                assert_eq!(self.origin_region(origin), region, "input origin crosses a region");
                assert!(
                    self.users(origin).contains(&User::Input { node, index }),
                    "origin does not know its user"
                );
            }
            assert_eq!(self.node_depth(node), self.compute_depth(node), "stale depth");
            match self.node_kind(node) {
                NodeKind::Gamma => {
                    let nsub = self.nsubregions(node) as u32;
                    assert!(nsub >= 2);
                    assert_eq!(
                        self.input_type(node, 0),
                        &Type::control(nsub),
                        "gamma predicate arity must match the subregion count"
                    );
                }
                NodeKind::Theta => {
                    let sub = self.subregion(node, 0);
                    assert_eq!(self.narguments(sub), self.ninputs(node));
                    assert_eq!(self.nresults(sub), self.ninputs(node) + 1);
                    assert_eq!(self.noutputs(node), self.ninputs(node));
                }
                _ => {}
            }
            for sub in self.subregions(node) {
                self.verify_region(sub);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sylva_ir::Operation;

    #[test]
    fn simple_node_links_users() {
        let mut graph = Graph::new();
        let root = graph.root();
        let c1 = graph.add_simple_node(root, Operation::bitconst(32, 1), &[]);
        let c2 = graph.add_simple_node(root, Operation::bitconst(32, 2), &[]);
        let sum = graph.add_simple_node(
            root,
            Operation::bitadd(32),
            &[graph.output(c1, 0), graph.output(c2, 0)],
        );

        assert_eq!(
            graph.users(graph.output(c1, 0)),
            vec![User::Input { node: sum, index: 0 }]
        );
        assert_eq!(graph.node_depth(c1), 0);
        assert_eq!(graph.node_depth(sum), 1);
        graph.verify();
    }

    #[test]
    fn divert_moves_user_sets() {
        let mut graph = Graph::new();
        let root = graph.root();
        let a = graph.add_simple_node(root, Operation::bitconst(32, 1), &[]);
        let b = graph.add_simple_node(root, Operation::bitconst(32, 2), &[]);
        let neg = graph.add_simple_node(
            root,
            Operation::bitadd(32),
            &[graph.output(a, 0), graph.output(a, 0)],
        );

        let user = User::Input { node: neg, index: 0 };
        assert!(graph.users(graph.output(a, 0)).contains(&user));

        graph.divert(user, graph.output(b, 0));
        assert!(!graph.users(graph.output(a, 0)).contains(&user));
        assert!(graph.users(graph.output(b, 0)).contains(&user));
        assert_eq!(graph.input_origin(neg, 0), graph.output(b, 0));
        graph.verify();
    }

    #[test]
    #[should_panic(expected = "outputs have users")]
    fn remove_node_with_users_panics() {
        let mut graph = Graph::new();
        let root = graph.root();
        let a = graph.add_simple_node(root, Operation::bitconst(32, 1), &[]);
        let _b = graph.add_simple_node(
            root,
            Operation::Assignment { ty: Type::bits(32) },
            &[graph.output(a, 0)],
        );
        graph.remove_node(a);
    }

    #[test]
    fn remove_unused_node() {
        let mut graph = Graph::new();
        let root = graph.root();
        let a = graph.add_simple_node(root, Operation::bitconst(32, 1), &[]);
        assert!(graph.is_unused(a));
        graph.remove_node(a);
        assert_eq!(graph.region_nnodes(root), 0);
    }

    #[test]
    #[should_panic(expected = "different region")]
    fn cross_region_origin_panics() {
        let mut graph = Graph::new();
        let root = graph.root();
        let a = graph.add_simple_node(root, Operation::bitconst(32, 1), &[]);
        // A lambda subregion may not read a root output directly.
        let lambda = graph.add_structural_node(
            root,
            NodeKind::Lambda {
                name: "f".into(),
                fn_type: FunctionType::new(vec![], vec![]),
                linkage: Linkage::External,
            },
            &[],
            &[],
            1,
        );
        let sub = graph.subregion(lambda, 0);
        graph.add_simple_node(
            sub,
            Operation::Assignment { ty: Type::bits(32) },
            &[graph.output(a, 0)],
        );
    }

    #[test]
    fn imports_and_exports() {
        let mut graph = Graph::new();
        let import = graph.add_import(Type::bits(32), "ext");
        let node = graph.add_simple_node(
            graph.root(),
            Operation::Assignment { ty: Type::bits(32) },
            &[import],
        );
        graph.add_export(graph.output(node, 0), "out");
        assert_eq!(graph.nresults(graph.root()), 1);
        assert_eq!(graph.result_name(graph.root(), 0), Some("out"));
        graph.verify();
    }

    #[test]
    fn depth_cascades_on_divert() {
        let mut graph = Graph::new();
        let root = graph.root();
        let a = graph.add_simple_node(root, Operation::bitconst(32, 1), &[]);
        let b = graph.add_simple_node(
            root,
            Operation::Assignment { ty: Type::bits(32) },
            &[graph.output(a, 0)],
        );
        let c = graph.add_simple_node(
            root,
            Operation::Assignment { ty: Type::bits(32) },
            &[graph.output(b, 0)],
        );
        assert_eq!(graph.node_depth(c), 2);

        // Short-circuit c to read a directly; depth drops.
        graph.divert(User::Input { node: c, index: 0 }, graph.output(a, 0));
        assert_eq!(graph.node_depth(c), 1);
        graph.verify();
    }
}
