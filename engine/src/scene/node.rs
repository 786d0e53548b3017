use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{trace, warn};
use parking_lot::Mutex;
use slotmap::new_key_type;
use uuid::Uuid;

use super::Event;
use crate::asset::{AssetCaches, AssetDefinitions, AssetInstance, AssetType};
use crate::project::NodeDefinition;

new_key_type! {
    /// Arena key of a [`SceneNode`] within its [`Scene`](super::Scene).
    pub struct NodeId;
}

/// Asset lifecycle of a node. The delete flag is tracked separately and can
/// be raised in any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// At least one referenced asset has no instance yet.
    Uncreated,
    /// Every referenced asset has an instance, not all of them loaded.
    InstancesCreated,
    Loaded,
}

/// One entity in the scene graph.
///
/// Structure (parent, children, instances, flags) is only changed by the
/// thread that owns the [`Scene`](super::Scene). Worker tasks see nodes through
/// a shared reference and may only raise the delete flag and push events.
pub struct SceneNode {
    uuid: Uuid,
    name: String,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    asset_refs: BTreeMap<AssetType, Uuid>,
    instances: BTreeMap<AssetType, Arc<dyn AssetInstance>>,
    attributes: BTreeMap<String, String>,
    loaded: bool,
    pub(super) in_delete_queue: bool,
    pub(super) created_at: Duration,
    die_after: Option<Duration>,
    delete: AtomicBool,
    events: Mutex<Vec<Event>>,
}

impl SceneNode {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            parent: None,
            children: Vec::new(),
            asset_refs: BTreeMap::new(),
            instances: BTreeMap::new(),
            attributes: BTreeMap::new(),
            loaded: false,
            in_delete_queue: false,
            created_at: Duration::ZERO,
            die_after: None,
            delete: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Builds a node from its definition. Children are added by the scene.
    pub fn from_definition(definition: &NodeDefinition) -> Self {
        let mut node = Self::new(definition.uuid, definition.name.clone());
        node.asset_refs = definition.assets.clone();
        node.attributes = definition.attributes.clone();
        node.die_after = definition.die_after_ms.map(Duration::from_millis);
        node
    }

    /// Adds an asset reference, builder style.
    pub fn with_asset(mut self, asset_type: AssetType, uuid: Uuid) -> Self {
        self.asset_refs.insert(asset_type, uuid);
        self
    }

    pub fn with_die_after(mut self, die_after: Duration) -> Self {
        self.die_after = Some(die_after);
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.assert_mutable("set_attribute");
        self.attributes.insert(key.into(), value.into());
    }

    // ==================== Assets ====================

    pub fn asset_refs(&self) -> &BTreeMap<AssetType, Uuid> {
        &self.asset_refs
    }

    /// Requests an asset for this node. It is materialized on the next
    /// instance-creation pass.
    pub fn add_asset_ref(&mut self, asset_type: AssetType, uuid: Uuid) {
        self.assert_mutable("add_asset_ref");
        self.asset_refs.insert(asset_type, uuid);
        self.loaded = false;
    }

    pub fn instance(&self, asset_type: AssetType) -> Option<&Arc<dyn AssetInstance>> {
        self.instances.get(&asset_type)
    }

    pub fn instances(&self) -> impl Iterator<Item = (&AssetType, &Arc<dyn AssetInstance>)> {
        self.instances.iter()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn state(&self) -> NodeState {
        if self.loaded {
            NodeState::Loaded
        } else if self
            .asset_refs
            .keys()
            .all(|asset_type| self.instances.contains_key(asset_type))
        {
            NodeState::InstancesCreated
        } else {
            NodeState::Uncreated
        }
    }

    /// Asks the caches for every referenced asset that has no instance yet.
    /// Skipped once the node is loaded or flagged for deletion. Returns the
    /// number of instances created; failures are retried on the next call.
    pub fn create_asset_instances(
        &mut self,
        caches: &AssetCaches,
        definitions: &AssetDefinitions,
    ) -> usize {
        if self.loaded || self.is_delete_flagged() {
            return 0;
        }
        self.assert_mutable("create_asset_instances");

        let mut created = 0;
        for (&asset_type, uuid) in &self.asset_refs {
            if self.instances.contains_key(&asset_type) {
                continue;
            }
            let Some(definition) = definitions.get(uuid) else {
                warn!("Node {} references unknown asset {}", self.name, uuid);
                continue;
            };
            if definition.asset_type != asset_type {
                warn!(
                    "Node {} lists {} ({}) as {}",
                    self.name, definition.name, definition.asset_type, asset_type
                );
                continue;
            }
            if let Some(instance) = caches.instance_for(definition) {
                self.instances.insert(asset_type, instance);
                created += 1;
            }
        }
        created
    }

    /// Runs the load step of every instance. Sets the loaded flag once all
    /// referenced instances exist and have loaded.
    pub fn load_asset_instances(&mut self) -> bool {
        if self.loaded || self.is_delete_flagged() {
            return self.loaded;
        }
        self.assert_mutable("load_asset_instances");

        if self.state() == NodeState::Uncreated {
            return false;
        }

        let mut all_loaded = true;
        for instance in self.instances.values() {
            if instance.is_loaded() {
                continue;
            }
            if let Err(err) = instance.load() {
                warn!("Node {}: {}", self.name, err);
                all_loaded = false;
            }
        }
        self.loaded = all_loaded;
        self.loaded
    }

    // ==================== Deletion ====================

    /// Marks the node for removal in the next sweep. Safe from any thread.
    pub fn set_delete_flag(&self, delete: bool) {
        self.delete.store(delete, Ordering::Release);
    }

    pub fn is_delete_flagged(&self) -> bool {
        self.delete.load(Ordering::Acquire)
    }

    pub fn is_in_delete_queue(&self) -> bool {
        self.in_delete_queue
    }

    pub fn die_after(&self) -> Option<Duration> {
        self.die_after
    }

    /// Scene time at which the node joined the graph.
    pub fn created_at(&self) -> Duration {
        self.created_at
    }

    /// Whether the node has lived longer than its `die_after` at scene time `now`.
    pub fn has_outlived(&self, now: Duration) -> bool {
        self.die_after
            .is_some_and(|limit| now.saturating_sub(self.created_at) > limit)
    }

    /// Releases events and instances and resets the lifecycle flags. Returns
    /// the number of instances released.
    pub(super) fn clean_up(&mut self) -> usize {
        self.events.lock().clear();
        let released = self.instances.len();
        self.instances.clear();
        self.loaded = false;
        trace!("Cleaned up node {} ({} instance(s))", self.name, released);
        released
    }

    // ==================== Events ====================

    /// Appends an event. Safe from any thread.
    pub fn send_event(&self, event: Event) {
        self.assert_mutable("send_event");
        self.events.lock().push(event);
    }

    /// Takes every pending event, leaving the queue empty.
    pub fn drain_events(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Drops every pending event. Returns how many were dropped.
    pub fn clear_events(&self) -> usize {
        let mut events = self.events.lock();
        let dropped = events.len();
        events.clear();
        dropped
    }

    pub fn has_events(&self) -> bool {
        !self.events.lock().is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    fn assert_mutable(&self, operation: &str) {
        debug_assert!(
            !self.in_delete_queue,
            "{} on node {} ({}) after it was queued for deletion",
            operation,
            self.name,
            self.uuid
        );
    }
}

impl std::fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneNode")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("children", &self.children.len())
            .field("instances", &self.instances.len())
            .field("loaded", &self.loaded)
            .field("delete", &self.is_delete_flagged())
            .finish()
    }
}
