use std::fmt::Write;
use std::time::Duration;

use log::{debug, info, trace};
use slotmap::SlotMap;
use uuid::Uuid;

use super::{NodeId, SceneNode};
use crate::asset::{AssetCaches, AssetDefinitions};
use crate::error::{EngineError, Result};
use crate::project::{NodeDefinition, SceneDefinition};

/// Lifecycle of a scene as driven by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneState {
    /// Built, no instance pass has run yet.
    ToLoad,
    /// The first create/load pass has run.
    Loaded,
    /// Components are receiving frames.
    Active,
    /// Being flushed.
    ToDestroy,
    /// Every node has been destroyed.
    Destroyed,
}

/// The active scene graph and its delete queue.
///
/// Nodes live in an arena; a parent owns its children through the arena and
/// lists them in order, while a child only records its parent's key.
/// Destroying a node destroys its whole subtree.
///
/// Deletion is two-phase. Anyone may [flag](SceneNode::set_delete_flag) a node
/// during the frame; [`sweep`](Self::sweep) then collects flagged nodes in
/// pre-order, detaches and destroys them, and clears the queue. Nothing is
/// removed from the graph outside the sweep.
pub struct Scene {
    uuid: Uuid,
    name: String,
    nodes: SlotMap<NodeId, SceneNode>,
    root: NodeId,
    delete_queue: Vec<NodeId>,
    state: SceneState,
    time: Duration,
}

impl Scene {
    pub fn new(uuid: Uuid, name: impl Into<String>, root: SceneNode) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(root);
        Self {
            uuid,
            name: name.into(),
            nodes,
            root,
            delete_queue: Vec::new(),
            state: SceneState::ToLoad,
            time: Duration::ZERO,
        }
    }

    /// Builds the node tree described by `definition`.
    pub fn from_definition(definition: &SceneDefinition) -> Result<Self> {
        let mut scene = Self::new(
            definition.uuid,
            definition.name.clone(),
            SceneNode::from_definition(&definition.root),
        );
        let root = scene.root;
        scene.add_definitions(root, &definition.root.children)?;
        info!(
            "Built scene {} with {} node(s)",
            scene.name,
            scene.node_count()
        );
        Ok(scene)
    }

    fn add_definitions(&mut self, parent: NodeId, children: &[NodeDefinition]) -> Result<()> {
        for child in children {
            let id = self.add_child(parent, SceneNode::from_definition(child))?;
            self.add_definitions(id, &child.children)?;
        }
        Ok(())
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SceneState) {
        if self.state != state {
            debug!("Scene {}: {:?} -> {:?}", self.name, self.state, state);
            self.state = state;
        }
    }

    /// Scene time, advanced once per frame by the runtime.
    pub fn time(&self) -> Duration {
        self.time
    }

    pub(crate) fn advance_time(&mut self, delta: Duration) {
        self.time += delta;
    }

    // ==================== Structure ====================

    /// Attaches `node` as the last child of `parent`.
    ///
    /// Refuses parents that are flagged or queued for deletion; the new node
    /// would otherwise be destroyed by the sweep without ever being seen.
    pub fn add_child(&mut self, parent: NodeId, mut node: SceneNode) -> Result<NodeId> {
        let parent_node = self.nodes.get(parent).ok_or(EngineError::UnknownNode)?;
        if parent_node.is_delete_flagged() || parent_node.is_in_delete_queue() {
            return Err(EngineError::LifecycleViolation(format!(
                "cannot add {} under {}, which is marked for deletion",
                node.name(),
                parent_node.name()
            )));
        }

        node.parent = Some(parent);
        node.children.clear();
        node.created_at = self.time;
        let id = self.nodes.insert(node);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(id);
        }
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    /// Looks a node up by uuid.
    pub fn get(&self, uuid: Uuid) -> Option<&SceneNode> {
        self.find_by_uuid(uuid).and_then(|id| self.nodes.get(id))
    }

    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<NodeId> {
        self.find(|node| node.uuid() == uuid)
    }

    /// First node in pre-order with this name.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.find(|node| node.name() == name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    // ==================== Traversal ====================

    /// Keys of the subtree rooted at `start`, depth-first pre-order.
    fn pre_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            order.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Visits every node, self before children, children in order.
    pub fn apply_to_all<F>(&self, mut f: F)
    where
        F: FnMut(NodeId, &SceneNode),
    {
        for id in self.pre_order(self.root) {
            if let Some(node) = self.nodes.get(id) {
                f(id, node);
            }
        }
    }

    /// Pre-order search returning the first node that matches.
    pub fn find<P>(&self, mut predicate: P) -> Option<NodeId>
    where
        P: FnMut(&SceneNode) -> bool,
    {
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if predicate(node) {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    // ==================== Asset Passes ====================

    /// Creates missing instances on every node that is neither loaded nor
    /// flagged. Returns the number of instances created.
    pub fn create_all_asset_instances(
        &mut self,
        caches: &AssetCaches,
        definitions: &AssetDefinitions,
    ) -> usize {
        let mut created = 0;
        for id in self.pre_order(self.root) {
            if let Some(node) = self.nodes.get_mut(id) {
                created += node.create_asset_instances(caches, definitions);
            }
        }
        created
    }

    /// Runs the load step on every node. Returns how many nodes became loaded.
    pub fn load_all_asset_instances(&mut self) -> usize {
        let mut newly_loaded = 0;
        for id in self.pre_order(self.root) {
            if let Some(node) = self.nodes.get_mut(id) {
                if !node.is_loaded() && node.load_asset_instances() {
                    newly_loaded += 1;
                }
            }
        }
        newly_loaded
    }

    /// Drops the pending events of every node. Called once per frame after
    /// components have had their chance to drain them.
    pub fn clear_all_events(&self) -> usize {
        let dropped: usize = self.nodes.values().map(SceneNode::clear_events).sum();
        if dropped > 0 {
            trace!("Scene {}: dropped {} undrained event(s)", self.name, dropped);
        }
        dropped
    }

    // ==================== Delete Sweep ====================

    /// Collects delete-flagged nodes into the delete queue in pre-order.
    /// Returns how many were added.
    pub fn find_delete_flagged(&mut self) -> usize {
        let mut added = 0;
        for id in self.pre_order(self.root) {
            if let Some(node) = self.nodes.get_mut(id) {
                if node.is_delete_flagged() && !node.in_delete_queue {
                    node.in_delete_queue = true;
                    self.delete_queue.push(id);
                    added += 1;
                }
            }
        }
        added
    }

    /// Detaches and destroys every queued node along with its subtree, in
    /// queue order. A queued node already destroyed with an ancestor is
    /// skipped. Returns the uuids of every destroyed node, each once.
    pub fn destroy_delete_queue(&mut self) -> Vec<Uuid> {
        let mut destroyed = Vec::new();
        for index in 0..self.delete_queue.len() {
            let id = self.delete_queue[index];
            let Some(node) = self.nodes.get(id) else {
                continue;
            };

            if let Some(parent) = node.parent {
                if let Some(parent_node) = self.nodes.get_mut(parent) {
                    parent_node.children.retain(|child| *child != id);
                }
            }

            for victim in self.pre_order(id) {
                if let Some(mut node) = self.nodes.remove(victim) {
                    node.clean_up();
                    destroyed.push(node.uuid());
                }
            }
        }
        if !destroyed.is_empty() {
            debug!(
                "Scene {}: destroyed {} node(s)",
                self.name,
                destroyed.len()
            );
        }
        destroyed
    }

    pub fn clear_delete_queue(&mut self) {
        self.delete_queue.clear();
    }

    pub fn delete_queue_len(&self) -> usize {
        self.delete_queue.len()
    }

    /// Collect, destroy, clear, in that order.
    pub fn sweep(&mut self) -> Vec<Uuid> {
        self.find_delete_flagged();
        let destroyed = self.destroy_delete_queue();
        self.clear_delete_queue();
        destroyed
    }

    /// Flags every node, root included, and sweeps. Used when the scene is
    /// replaced or the runtime shuts down.
    pub fn clean_up(&mut self) -> Vec<Uuid> {
        self.set_state(SceneState::ToDestroy);
        for node in self.nodes.values() {
            node.set_delete_flag(true);
        }
        let destroyed = self.sweep();
        self.set_state(SceneState::Destroyed);
        info!(
            "Scene {} cleaned up ({} node(s) destroyed)",
            self.name,
            destroyed.len()
        );
        destroyed
    }

    /// Indented dump of the graph, one node per line.
    pub fn print_tree(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let _ = writeln!(
                out,
                "{}{} [{}] {:?}{}",
                "  ".repeat(depth),
                node.name(),
                node.uuid(),
                node.state(),
                if node.is_delete_flagged() { " (delete)" } else { "" }
            );
            stack.extend(node.children.iter().rev().map(|child| (*child, depth + 1)));
        }
        out
    }
}
