//! Deduplicating asset caches.
//!
//! A [`Cache`] maps a definition uuid to at most one loaded instance. The
//! per-category work of turning a definition into an instance lives behind the
//! [`AssetLoader`] trait; the cache only guarantees that, for a given uuid, the
//! loader runs once and every requester gets the same `Arc`.
//!
//! # Concurrency
//!
//! Every uuid owns a slot guarded by its own mutex. The map lock is only held
//! long enough to find or create the slot, so loads of different assets run in
//! parallel while two requesters of the same uuid queue up behind one load:
//!
//! ```text
//! thread A: get(u) ─ slot(u).lock ─ load ─ store ─ unlock ─▶ Arc#1
//! thread B: get(u) ─ slot(u).lock ───────(waits)──────────▶ Arc#1
//! ```
//!
//! # Failed loads
//!
//! A failed load stores nothing. The next request for the same uuid calls the
//! loader again, which is how a node whose resource is not ready yet picks it
//! up on a later frame.
//!
//! # Runtime scope
//!
//! Caches are owned by the runtime through [`AssetCaches`], one per
//! [`AssetType`]. There are no process-wide registries; clearing the runtime's
//! caches releases every instance they hold.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use log::{debug, warn};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{AssetDefinition, AssetDefinitions, AssetInstance, AssetType};
use crate::error::{EngineError, Result};

/// Produces instances for one asset category.
///
/// `load_instance` may perform expensive I/O and may be called from any task
/// thread. It reports failure through `Err` and must not panic.
pub trait AssetLoader: Send + Sync + 'static {
    type Instance: AssetInstance;

    fn asset_type(&self) -> AssetType;

    fn load_instance(&self, definition: &AssetDefinition) -> Result<Self::Instance>;
}

type Slot<I> = Arc<Mutex<Option<Arc<I>>>>;

/// Get-or-load store for one asset category.
pub struct Cache<L: AssetLoader> {
    loader: L,
    slots: DashMap<Uuid, Slot<L::Instance>>,
    loads: AtomicUsize,
}

impl<L: AssetLoader> Cache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            slots: DashMap::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn asset_type(&self) -> AssetType {
        self.loader.asset_type()
    }

    /// Returns the cached instance for `definition`, loading it on first use.
    ///
    /// Returns `None` when the load fails; nothing is cached in that case.
    pub fn get_instance(&self, definition: &AssetDefinition) -> Option<Arc<L::Instance>> {
        if definition.asset_type != self.asset_type() {
            warn!(
                "{}",
                EngineError::load_failure(
                    definition.uuid,
                    format!(
                        "{} definition requested from the {} cache",
                        definition.asset_type,
                        self.asset_type()
                    ),
                )
            );
            return None;
        }

        loop {
            let slot = self.slot(definition.uuid);
            let mut guard = slot.lock();
            if let Some(instance) = guard.as_ref() {
                return Some(Arc::clone(instance));
            }
            // A failed load removed this slot while we waited on it.
            if !self.is_current(&definition.uuid, &slot) {
                continue;
            }

            self.loads.fetch_add(1, Ordering::Relaxed);
            return match self.loader.load_instance(definition) {
                Ok(instance) => {
                    debug!(
                        "Loaded {} instance {} ({})",
                        self.asset_type(),
                        definition.name,
                        definition.uuid
                    );
                    let instance = Arc::new(instance);
                    *guard = Some(Arc::clone(&instance));
                    Some(instance)
                }
                Err(err) => {
                    warn!("{}", err);
                    self.slots
                        .remove_if(&definition.uuid, |_, current| Arc::ptr_eq(current, &slot));
                    None
                }
            };
        }
    }

    /// Resolves `uuid` through the project's definition table, then behaves
    /// like [`get_instance`](Self::get_instance).
    pub fn get_instance_by_uuid(
        &self,
        uuid: &Uuid,
        definitions: &AssetDefinitions,
    ) -> Option<Arc<L::Instance>> {
        match definitions.resolve(uuid) {
            Ok(definition) => self.get_instance(definition),
            Err(err) => {
                warn!("{}", err);
                None
            }
        }
    }

    /// The cached instance for `uuid`, without loading.
    pub fn instance(&self, uuid: &Uuid) -> Option<Arc<L::Instance>> {
        let slot = self.slots.get(uuid).map(|slot| slot.value().clone())?;
        let guard = slot.lock();
        guard.clone()
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.instance(uuid).is_some()
    }

    /// Number of loaded instances.
    pub fn len(&self) -> usize {
        // Slot locks are never taken while a map shard is held.
        let slots: Vec<_> = self.slots.iter().map(|slot| slot.value().clone()).collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    /// Number of uuids with a slot, loaded or mid-load.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times the loader has been invoked.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Drops every cached instance and empties the map. Returns how many
    /// instances were released; a second call returns 0.
    ///
    /// Call only once the task pool is fenced. A load still running at this
    /// point hands its instance to its caller without caching it.
    pub fn clear(&self) -> usize {
        let released = self.len();
        self.slots.clear();
        if released > 0 {
            debug!("Cleared {} {} instance(s)", released, self.asset_type());
        }
        released
    }

    fn is_current(&self, uuid: &Uuid, slot: &Slot<L::Instance>) -> bool {
        self.slots
            .get(uuid)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    fn slot(&self, uuid: Uuid) -> Slot<L::Instance> {
        if let Some(slot) = self.slots.get(&uuid) {
            return slot.value().clone();
        }
        self.slots.entry(uuid).or_default().value().clone()
    }
}

/// Type-erased view of a [`Cache`], so caches of different loaders can live
/// in one registry.
trait ErasedCache: Send + Sync {
    fn instance_for(&self, definition: &AssetDefinition) -> Option<Arc<dyn AssetInstance>>;

    fn clear(&self) -> usize;

    fn len(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

impl<L: AssetLoader> ErasedCache for Cache<L> {
    fn instance_for(&self, definition: &AssetDefinition) -> Option<Arc<dyn AssetInstance>> {
        self.get_instance(definition)
            .map(|instance| instance as Arc<dyn AssetInstance>)
    }

    fn clear(&self) -> usize {
        Cache::clear(self)
    }

    fn len(&self) -> usize {
        Cache::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The runtime's caches, one per [`AssetType`].
#[derive(Default)]
pub struct AssetCaches {
    caches: HashMap<AssetType, Box<dyn ErasedCache>>,
}

impl AssetCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `cache` for its loader's category, replacing any previous one.
    pub fn register<L: AssetLoader>(&mut self, cache: Cache<L>) {
        let asset_type = cache.asset_type();
        if let Some(previous) = self.caches.insert(asset_type, Box::new(cache)) {
            previous.clear();
            debug!("Replaced {} cache", asset_type);
        }
    }

    /// Typed access to a registered cache.
    pub fn cache<L: AssetLoader>(&self, asset_type: AssetType) -> Option<&Cache<L>> {
        self.caches
            .get(&asset_type)
            .and_then(|cache| cache.as_any().downcast_ref::<Cache<L>>())
    }

    pub fn has(&self, asset_type: AssetType) -> bool {
        self.caches.contains_key(&asset_type)
    }

    /// Gets or loads the instance for `definition` from its category's cache.
    pub fn instance_for(&self, definition: &AssetDefinition) -> Option<Arc<dyn AssetInstance>> {
        match self.caches.get(&definition.asset_type) {
            Some(cache) => cache.instance_for(definition),
            None => {
                warn!(
                    "{}",
                    EngineError::load_failure(
                        definition.uuid,
                        format!("no cache registered for {}", definition.asset_type),
                    )
                );
                None
            }
        }
    }

    pub fn instance_by_uuid(
        &self,
        uuid: &Uuid,
        definitions: &AssetDefinitions,
    ) -> Option<Arc<dyn AssetInstance>> {
        match definitions.resolve(uuid) {
            Ok(definition) => self.instance_for(definition),
            Err(err) => {
                warn!("{}", err);
                None
            }
        }
    }

    /// Clears every cache. Returns the total number of released instances.
    pub fn clear_all(&self) -> usize {
        self.caches.values().map(|cache| cache.clear()).sum()
    }

    /// Total loaded instances across all caches.
    pub fn len(&self) -> usize {
        self.caches.values().map(|cache| cache.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    use crate::core::tasks::TaskManager;

    pub(crate) struct TestInstance {
        pub uuid: Uuid,
        pub asset_type: AssetType,
        pub loaded: AtomicBool,
    }

    impl AssetInstance for TestInstance {
        fn uuid(&self) -> Uuid {
            self.uuid
        }

        fn asset_type(&self) -> AssetType {
            self.asset_type
        }

        fn load(&self) -> Result<()> {
            self.loaded.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_loaded(&self) -> bool {
            self.loaded.load(Ordering::SeqCst)
        }
    }

    /// Loader that counts calls and can be told to fail or stall.
    #[derive(Clone)]
    pub(crate) struct TestLoader {
        pub asset_type: AssetType,
        pub calls: Arc<AtomicUsize>,
        pub fail: Arc<AtomicBool>,
        pub delay: Duration,
    }

    impl TestLoader {
        pub fn new(asset_type: AssetType) -> Self {
            Self {
                asset_type,
                calls: Arc::new(AtomicUsize::new(0)),
                fail: Arc::new(AtomicBool::new(false)),
                delay: Duration::ZERO,
            }
        }
    }

    impl AssetLoader for TestLoader {
        type Instance = TestInstance;

        fn asset_type(&self) -> AssetType {
            self.asset_type
        }

        fn load_instance(&self, definition: &AssetDefinition) -> Result<TestInstance> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(EngineError::load_failure(definition.uuid, "told to fail"));
            }
            Ok(TestInstance {
                uuid: definition.uuid,
                asset_type: definition.asset_type,
                loaded: AtomicBool::new(false),
            })
        }
    }

    fn shader(name: &str) -> AssetDefinition {
        AssetDefinition::new(Uuid::new_v4(), name, AssetType::Shader, "glsl")
    }

    #[test]
    fn test_get_instance_returns_same_instance() {
        let cache = Cache::new(TestLoader::new(AssetType::Shader));
        let definition = shader("lit");

        let first = cache.get_instance(&definition).unwrap();
        let second = cache.get_instance(&definition).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.load_count(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&definition.uuid));
    }

    #[test]
    fn test_concurrent_requests_load_once() {
        const REQUESTERS: usize = 8;

        let mut loader = TestLoader::new(AssetType::Shader);
        loader.delay = Duration::from_millis(20);
        let calls = Arc::clone(&loader.calls);
        let cache = Arc::new(Cache::new(loader));
        let definition = Arc::new(shader("contended"));
        let barrier = Arc::new(Barrier::new(REQUESTERS));

        let workers: Vec<_> = (0..REQUESTERS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let definition = Arc::clone(&definition);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_instance(&definition).unwrap()
                })
            })
            .collect();

        let instances: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    }

    #[test]
    fn test_concurrent_requests_from_task_threads_load_once() {
        let tasks = TaskManager::with_threads(4, Duration::from_millis(5)).unwrap();
        let mut loader = TestLoader::new(AssetType::Model);
        loader.delay = Duration::from_millis(10);
        let calls = Arc::clone(&loader.calls);
        let cache = Arc::new(Cache::new(loader));
        let definition = Arc::new(AssetDefinition::new(
            Uuid::new_v4(),
            "ship",
            AssetType::Model,
            "assimp",
        ));
        let results = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..12 {
            let cache = Arc::clone(&cache);
            let definition = Arc::clone(&definition);
            let results = Arc::clone(&results);
            tasks.push_fn("load", move || match cache.get_instance(&definition) {
                Some(instance) => {
                    results.lock().push(instance);
                    true
                }
                None => false,
            });
        }
        assert!(tasks.wait_for_fence());

        let results = results.lock();
        assert_eq!(results.len(), 12);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|i| Arc::ptr_eq(i, &results[0])));
    }

    #[test]
    fn test_failed_load_is_retried_on_next_request() {
        let loader = TestLoader::new(AssetType::Shader);
        let fail = Arc::clone(&loader.fail);
        let cache = Cache::new(loader);
        let definition = shader("broken");

        fail.store(true, Ordering::SeqCst);
        assert!(cache.get_instance(&definition).is_none());
        assert!(cache.get_instance(&definition).is_none());
        assert_eq!(cache.load_count(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.slot_count(), 0);

        fail.store(false, Ordering::SeqCst);
        let instance = cache.get_instance(&definition).unwrap();
        assert_eq!(cache.load_count(), 3);

        let again = cache.get_instance(&definition).unwrap();
        assert!(Arc::ptr_eq(&instance, &again));
        assert_eq!(cache.load_count(), 3);
    }

    #[test]
    fn test_requesters_waiting_on_a_failed_load_retry_it() {
        const REQUESTERS: usize = 4;

        let mut loader = TestLoader::new(AssetType::Shader);
        loader.delay = Duration::from_millis(10);
        let fail = Arc::clone(&loader.fail);
        let calls = Arc::clone(&loader.calls);
        let cache = Arc::new(Cache::new(loader));
        let definition = Arc::new(shader("flaky"));
        let barrier = Arc::new(Barrier::new(REQUESTERS));

        fail.store(true, Ordering::SeqCst);
        let workers: Vec<_> = (0..REQUESTERS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let definition = Arc::clone(&definition);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_instance(&definition).is_none()
                })
            })
            .collect();
        assert!(workers.into_iter().all(|w| w.join().unwrap()));

        // Every requester ran its own load and none left a slot behind.
        assert_eq!(calls.load(Ordering::SeqCst), REQUESTERS);
        assert_eq!(cache.slot_count(), 0);

        fail.store(false, Ordering::SeqCst);
        assert!(cache.get_instance(&definition).is_some());
        assert_eq!(cache.slot_count(), 1);
    }

    #[test]
    fn test_wrong_category_is_refused_without_loading() {
        let cache = Cache::new(TestLoader::new(AssetType::Shader));
        let font = AssetDefinition::new(Uuid::new_v4(), "mono", AssetType::Font, "ttf");
        assert!(cache.get_instance(&font).is_none());
        assert_eq!(cache.load_count(), 0);
    }

    #[test]
    fn test_get_instance_by_uuid_resolves_definition() {
        let cache = Cache::new(TestLoader::new(AssetType::Shader));
        let definition = shader("by-uuid");
        let uuid = definition.uuid;
        let definitions = AssetDefinitions::from_definitions([definition]).unwrap();

        let instance = cache.get_instance_by_uuid(&uuid, &definitions).unwrap();
        assert_eq!(instance.uuid(), uuid);

        assert!(cache.get_instance_by_uuid(&Uuid::new_v4(), &definitions).is_none());
        assert_eq!(cache.load_count(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let cache = Cache::new(TestLoader::new(AssetType::Shader));
        let a = shader("a");
        let b = shader("b");
        let first = cache.get_instance(&a).unwrap();
        cache.get_instance(&b).unwrap();

        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.clear(), 0);
        assert!(cache.is_empty());

        // Only our local handle keeps the old instance alive now.
        assert_eq!(Arc::strong_count(&first), 1);

        let reloaded = cache.get_instance(&a).unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(cache.load_count(), 3);
    }

    #[test]
    fn test_clear_during_a_load_leaves_it_uncached() {
        let mut loader = TestLoader::new(AssetType::Shader);
        loader.delay = Duration::from_millis(30);
        let calls = Arc::clone(&loader.calls);
        let cache = Arc::new(Cache::new(loader));
        let definition = Arc::new(shader("late"));

        let worker = {
            let cache = Arc::clone(&cache);
            let definition = Arc::clone(&definition);
            thread::spawn(move || cache.get_instance(&definition))
        };
        while calls.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(cache.clear(), 0);

        assert!(worker.join().unwrap().is_some());
        assert!(cache.is_empty());
        assert_eq!(cache.slot_count(), 0);
    }

    #[test]
    fn test_registry_dispatches_by_category() {
        let mut caches = AssetCaches::new();
        caches.register(Cache::new(TestLoader::new(AssetType::Shader)));
        caches.register(Cache::new(TestLoader::new(AssetType::Font)));

        let lit = shader("lit");
        let mono = AssetDefinition::new(Uuid::new_v4(), "mono", AssetType::Font, "ttf");
        let sound = AssetDefinition::new(Uuid::new_v4(), "beep", AssetType::Audio, "wav");

        let instance = caches.instance_for(&lit).unwrap();
        assert_eq!(instance.asset_type(), AssetType::Shader);
        assert_eq!(caches.instance_for(&mono).unwrap().uuid(), mono.uuid);
        assert!(caches.instance_for(&sound).is_none());

        let shaders = caches
            .cache::<TestLoader>(AssetType::Shader)
            .expect("shader cache");
        assert_eq!(shaders.len(), 1);
        assert!(caches.has(AssetType::Font));
        assert!(!caches.has(AssetType::Audio));

        assert_eq!(caches.len(), 2);
        assert_eq!(caches.clear_all(), 2);
        assert_eq!(caches.clear_all(), 0);
    }
}
