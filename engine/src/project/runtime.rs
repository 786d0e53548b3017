use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use uuid::Uuid;

use super::{ProjectDefinition, ProjectDirectory};
use crate::asset::{AssetCaches, AssetDefinitions, AssetLoader, AssetType, Cache, ResourceLoader};
use crate::component::{Component, FrameContext, RuntimeContext};
use crate::config::EngineConfig;
use crate::core::tasks::TaskManager;
use crate::core::time::Time;
use crate::error::{EngineError, Result};
use crate::scene::{Scene, SceneState};

/// Summary of one [`ProjectRuntime::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub delta: Duration,
    /// Instances created by this frame's creation pass.
    pub instances_created: usize,
    /// Nodes that finished loading this frame.
    pub nodes_loaded: usize,
    /// Nodes left after the sweep.
    pub node_count: usize,
    /// Uuids of the nodes removed by the sweep.
    pub destroyed: Vec<Uuid>,
}

/// A loaded project: its task pool, caches, active scene and components.
///
/// Each [`update`](Self::update) runs one frame in a fixed order:
///
/// ```text
/// time ─▶ create instances ─▶ load instances ─▶ push component tasks
///      ─▶ fence (all tasks done) ─▶ sweep delete-flagged nodes ─▶ drop events
/// ```
///
/// The scene is write-locked only during the instance passes and the sweep;
/// component tasks read it under a shared lock in between.
pub struct ProjectRuntime {
    config: EngineConfig,
    project: ProjectDefinition,
    directory: ProjectDirectory,
    definitions: Arc<AssetDefinitions>,
    caches: AssetCaches,
    tasks: TaskManager,
    scene: Arc<RwLock<Scene>>,
    components: Vec<Box<dyn Component>>,
    time: Time,
    initialised: bool,
    shut_down: bool,
}

impl ProjectRuntime {
    /// Starts the task pool, registers a file-backed cache for every asset
    /// category and builds the startup scene.
    pub fn new(
        config: EngineConfig,
        project: ProjectDefinition,
        directory: ProjectDirectory,
    ) -> Result<Self> {
        let tasks = TaskManager::with_threads(config.worker_thread_count(), config.idle_wait())?;
        let definitions = Arc::new(AssetDefinitions::from_definitions(
            project.assets.iter().cloned(),
        )?);

        let mut caches = AssetCaches::new();
        for asset_type in AssetType::ALL {
            caches.register(Cache::new(ResourceLoader::new(asset_type, directory.clone())));
        }

        let scene = Scene::from_definition(project.startup()?)?;
        let time = Time::new(config.max_frame_delta());
        info!(
            "Project {} ready: {} asset definition(s), startup scene {}",
            project.name,
            definitions.len(),
            scene.name()
        );

        Ok(Self {
            config,
            project,
            directory,
            definitions,
            caches,
            tasks,
            scene: Arc::new(RwLock::new(scene)),
            components: Vec::new(),
            time,
            initialised: false,
            shut_down: false,
        })
    }

    /// Loads `<directory>/project.json` and builds a runtime for it.
    pub fn open(config: EngineConfig, directory: ProjectDirectory) -> Result<Self> {
        let project = directory.load_project()?;
        Self::new(config, project, directory)
    }

    /// Replaces the cache of the loader's category.
    pub fn register_loader<L: AssetLoader>(&mut self, loader: L) {
        self.caches.register(Cache::new(loader));
    }

    pub fn add_component(&mut self, component: impl Component + 'static) {
        self.components.push(Box::new(component));
    }

    /// Initialises every component in the order they were added. The first
    /// failure is returned and the runtime stays uninitialised.
    pub fn init(&mut self) -> Result<()> {
        let context = RuntimeContext {
            config: &self.config,
            project: &self.project,
            definitions: &self.definitions,
        };
        for component in &mut self.components {
            let name = component.name().to_string();
            if let Err(err) = component.init(&context) {
                error!("Component {} failed to initialise: {}", name, err);
                return Err(match err {
                    EngineError::ComponentInit { .. } => err,
                    other => EngineError::ComponentInit {
                        component: name,
                        reason: other.to_string(),
                    },
                });
            }
            component.state().set_initialised(true);
            debug!("Component {} initialised", name);
        }
        self.initialised = true;
        self.time.reset_now();
        info!("Runtime initialised with {} component(s)", self.components.len());
        Ok(())
    }

    /// Runs one frame using wall-clock time.
    pub fn update(&mut self) -> Result<FrameReport> {
        let time = self.time.next();
        self.run_frame(time)
    }

    /// Runs one frame that advances time by exactly `delta`.
    pub fn update_with_delta(&mut self, delta: Duration) -> Result<FrameReport> {
        let time = self.time.advance(delta);
        self.run_frame(time)
    }

    fn run_frame(&mut self, time: Time) -> Result<FrameReport> {
        if self.shut_down {
            return Err(EngineError::LifecycleViolation(
                "update after shutdown".into(),
            ));
        }
        if !self.initialised {
            return Err(EngineError::LifecycleViolation(
                "update before init".into(),
            ));
        }
        self.time = time;

        let (instances_created, nodes_loaded) = {
            let mut scene = self.scene.write();
            scene.advance_time(time.delta);
            let created = scene.create_all_asset_instances(&self.caches, &self.definitions);
            let loaded = scene.load_all_asset_instances();
            if scene.state() == SceneState::ToLoad {
                scene.set_state(SceneState::Loaded);
            }
            (created, loaded)
        };

        let frame = FrameContext {
            time,
            tasks: &self.tasks,
            scene: &self.scene,
        };
        for component in &self.components {
            if component.state().is_enabled() {
                component.push_tasks(&frame);
            }
        }
        if !self.tasks.wait_for_fence() {
            warn!("Frame {} finished without every task thread", time.frame);
        }

        let mut scene = self.scene.write();
        if scene.state() == SceneState::Loaded {
            scene.set_state(SceneState::Active);
        }
        let destroyed = scene.sweep();
        scene.clear_all_events();

        Ok(FrameReport {
            frame: time.frame,
            delta: time.delta,
            instances_created,
            nodes_loaded,
            node_count: scene.node_count(),
            destroyed,
        })
    }

    /// Flushes the current scene and activates the scene `uuid`.
    pub fn load_scene(&mut self, uuid: Uuid) -> Result<()> {
        let next = Scene::from_definition(self.project.scene(uuid)?)?;
        let mut scene = self.scene.write();
        scene.clean_up();
        *scene = next;
        info!("Activated scene {}", scene.name());
        Ok(())
    }

    pub fn scene(&self) -> &Arc<RwLock<Scene>> {
        &self.scene
    }

    pub fn caches(&self) -> &AssetCaches {
        &self.caches
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    pub fn definitions(&self) -> &AssetDefinitions {
        &self.definitions
    }

    pub fn project(&self) -> &ProjectDefinition {
        &self.project
    }

    pub fn directory(&self) -> &ProjectDirectory {
        &self.directory
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn components(&self) -> impl Iterator<Item = &dyn Component> {
        self.components.iter().map(|component| component.as_ref())
    }

    pub fn component(&self, name: &str) -> Option<&dyn Component> {
        self.components().find(|component| component.name() == name)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Destroys the scene, releases every cached instance and stops the task
    /// pool, in that order. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.scene.write().clean_up();
        let released = self.caches.clear_all();
        debug!("Released {} cached instance(s)", released);
        self.tasks.shutdown();
        self.shut_down = true;
        info!("Runtime for {} shut down", self.project.name);
    }
}

impl Drop for ProjectRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetDefinition, TestLoader};
    use crate::component::{ComponentState, LifetimeComponent};
    use crate::project::{NodeDefinition, SceneDefinition};
    use crate::scene::Event;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        project: ProjectDefinition,
        shader: Uuid,
        second_scene: Uuid,
    }

    /// Scene `main`: R { X(shader), Y(shader), Z(dies after 50ms) }, plus an
    /// empty second scene.
    fn fixture() -> Fixture {
        let shader = AssetDefinition::new(Uuid::new_v4(), "lit", AssetType::Shader, "glsl");
        let root = NodeDefinition::new("R")
            .with_child(NodeDefinition::new("X").with_asset(AssetType::Shader, shader.uuid))
            .with_child(NodeDefinition::new("Y").with_asset(AssetType::Shader, shader.uuid))
            .with_child(NodeDefinition::new("Z").with_die_after_ms(50));
        let main = SceneDefinition {
            uuid: Uuid::new_v4(),
            name: "main".into(),
            root,
        };
        let other = SceneDefinition {
            uuid: Uuid::new_v4(),
            name: "other".into(),
            root: NodeDefinition::new("menu"),
        };
        Fixture {
            shader: shader.uuid,
            second_scene: other.uuid,
            project: ProjectDefinition {
                uuid: Uuid::new_v4(),
                name: "demo".into(),
                description: String::new(),
                startup_scene: main.uuid,
                assets: vec![shader],
                scenes: vec![main, other],
            },
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            worker_threads: Some(2),
            idle_wait_ms: 5,
            ..EngineConfig::default()
        }
    }

    fn runtime(project: ProjectDefinition) -> (ProjectRuntime, TestLoader) {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut runtime =
            ProjectRuntime::new(config(), project, ProjectDirectory::new("/nonexistent")).unwrap();
        let loader = TestLoader::new(AssetType::Shader);
        runtime.register_loader(loader.clone());
        (runtime, loader)
    }

    struct Failing {
        state: ComponentState,
    }

    impl Component for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn state(&self) -> &ComponentState {
            &self.state
        }

        fn init(&mut self, _runtime: &RuntimeContext<'_>) -> Result<()> {
            Err(EngineError::InvalidProject("no window".into()))
        }

        fn push_tasks(&self, _frame: &FrameContext<'_>) {}
    }

    /// Drains the root's events from a task and counts them.
    struct EventCounter {
        state: ComponentState,
        seen: Arc<AtomicUsize>,
    }

    impl Component for EventCounter {
        fn name(&self) -> &str {
            "events"
        }

        fn state(&self) -> &ComponentState {
            &self.state
        }

        fn init(&mut self, _runtime: &RuntimeContext<'_>) -> Result<()> {
            Ok(())
        }

        fn push_tasks(&self, frame: &FrameContext<'_>) {
            let scene = Arc::clone(frame.scene);
            let seen = Arc::clone(&self.seen);
            frame.tasks.push_fn("count events", move || {
                let scene = scene.read();
                let root = scene.node(scene.root()).map_or(0, |root| root.drain_events().len());
                seen.fetch_add(root, Ordering::SeqCst);
                true
            });
        }
    }

    fn send_to_root(runtime: &ProjectRuntime, kind: &str) {
        let scene = runtime.scene().read();
        scene.node(scene.root()).unwrap().send_event(Event::new(kind));
    }

    fn root_event_count(runtime: &ProjectRuntime) -> usize {
        let scene = runtime.scene().read();
        scene.node(scene.root()).unwrap().event_count()
    }

    #[test]
    fn test_update_before_init_is_refused() {
        let (mut runtime, _) = runtime(fixture().project);
        assert!(matches!(
            runtime.update(),
            Err(EngineError::LifecycleViolation(_))
        ));
    }

    #[test]
    fn test_first_frame_creates_and_loads_shared_instance() {
        let fixture = fixture();
        let (mut runtime, loader) = runtime(fixture.project);
        runtime.init().unwrap();

        let report = runtime.update_with_delta(Duration::from_millis(16)).unwrap();
        assert_eq!(report.frame, 1);
        assert_eq!(report.instances_created, 2);
        assert_eq!(report.node_count, 4);
        assert!(report.destroyed.is_empty());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);

        let scene = runtime.scene().read();
        assert_eq!(scene.state(), SceneState::Active);
        let x = scene.node(scene.find_by_name("X").unwrap()).unwrap();
        let y = scene.node(scene.find_by_name("Y").unwrap()).unwrap();
        let a = x.instance(AssetType::Shader).unwrap();
        let b = y.instance(AssetType::Shader).unwrap();
        assert!(Arc::ptr_eq(a, b));
        assert!(x.is_loaded() && y.is_loaded());
        drop(scene);

        let second = runtime.update_with_delta(Duration::from_millis(16)).unwrap();
        assert_eq!(second.instances_created, 0);
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
        assert!(runtime.caches().instance_by_uuid(&fixture.shader, runtime.definitions()).is_some());
    }

    #[test]
    fn test_lifetime_component_removes_node_in_the_same_frame() {
        let (mut runtime, _) = runtime(fixture().project);
        runtime.add_component(LifetimeComponent::new());
        runtime.init().unwrap();
        assert!(runtime.component("lifetime").unwrap().state().is_initialised());

        let first = runtime.update_with_delta(Duration::from_millis(30)).unwrap();
        assert!(first.destroyed.is_empty());

        let z = {
            let scene = runtime.scene().read();
            scene.node(scene.find_by_name("Z").unwrap()).unwrap().uuid()
        };
        let second = runtime.update_with_delta(Duration::from_millis(30)).unwrap();
        assert_eq!(second.destroyed, vec![z]);
        assert_eq!(second.node_count, 3);
        assert!(runtime.scene().read().find_by_name("Z").is_none());
    }

    #[test]
    fn test_undrained_events_do_not_outlive_the_frame() {
        let (mut runtime, _) = runtime(fixture().project);
        runtime.init().unwrap();

        for _ in 0..50 {
            send_to_root(&runtime, "tick");
            runtime.update_with_delta(Duration::from_millis(16)).unwrap();
            assert_eq!(root_event_count(&runtime), 0);
        }
    }

    #[test]
    fn test_components_drain_events_before_they_are_dropped() {
        let (mut runtime, _) = runtime(fixture().project);
        let seen = Arc::new(AtomicUsize::new(0));
        runtime.add_component(EventCounter {
            state: ComponentState::new(),
            seen: Arc::clone(&seen),
        });
        runtime.init().unwrap();

        send_to_root(&runtime, "a");
        send_to_root(&runtime, "b");
        runtime.update_with_delta(Duration::from_millis(16)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        runtime.update_with_delta(Duration::from_millis(16)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(root_event_count(&runtime), 0);
    }

    #[test]
    fn test_disabled_component_pushes_nothing() {
        let (mut runtime, _) = runtime(fixture().project);
        runtime.add_component(LifetimeComponent::new());
        runtime.init().unwrap();
        runtime.component("lifetime").unwrap().state().set_enabled(false);

        runtime.update_with_delta(Duration::from_millis(200)).unwrap();
        let report = runtime.update_with_delta(Duration::from_millis(200)).unwrap();
        assert!(report.destroyed.is_empty());
        assert_eq!(report.node_count, 4);
    }

    #[test]
    fn test_failing_component_init() {
        let (mut runtime, _) = runtime(fixture().project);
        runtime.add_component(Failing {
            state: ComponentState::new(),
        });
        match runtime.init() {
            Err(EngineError::ComponentInit { component, .. }) => assert_eq!(component, "failing"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(runtime.update().is_err());
    }

    #[test]
    fn test_load_scene_replaces_active_scene() {
        let fixture = fixture();
        let (mut runtime, _) = runtime(fixture.project);
        runtime.init().unwrap();
        runtime.update_with_delta(Duration::from_millis(16)).unwrap();

        runtime.load_scene(fixture.second_scene).unwrap();
        {
            let scene = runtime.scene().read();
            assert_eq!(scene.name(), "other");
            assert_eq!(scene.node_count(), 1);
            assert_eq!(scene.state(), SceneState::ToLoad);
        }
        assert!(matches!(
            runtime.load_scene(Uuid::new_v4()),
            Err(EngineError::UnknownScene(_))
        ));
    }

    #[test]
    fn test_shutdown_releases_everything_once() {
        let (mut runtime, _) = runtime(fixture().project);
        runtime.init().unwrap();
        runtime.update_with_delta(Duration::from_millis(16)).unwrap();
        assert_eq!(runtime.caches().len(), 1);

        runtime.shutdown();
        assert!(runtime.is_shut_down());
        assert_eq!(runtime.scene().read().node_count(), 0);
        assert_eq!(runtime.scene().read().state(), SceneState::Destroyed);
        assert!(runtime.caches().is_empty());
        assert!(!runtime.tasks().is_running());

        runtime.shutdown();
        assert!(matches!(
            runtime.update(),
            Err(EngineError::LifecycleViolation(_))
        ));
    }

    #[test]
    fn test_demo_project_loads_from_disk() {
        let directory = ProjectDirectory::new(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/hello"),
        );
        let mut runtime = ProjectRuntime::open(config(), directory).unwrap();
        runtime.add_component(LifetimeComponent::new());
        runtime.init().unwrap();

        let first = runtime.update_with_delta(Duration::from_millis(100)).unwrap();
        assert_eq!(first.instances_created, 2);
        assert_eq!(first.node_count, 4);
        {
            let scene = runtime.scene().read();
            let ship = scene.node(scene.find_by_name("ship").unwrap()).unwrap();
            assert!(ship.is_loaded());
            assert!(ship.instance(AssetType::Shader).unwrap().path().is_some());
        }

        let mut destroyed = Vec::new();
        for _ in 0..5 {
            destroyed.extend(runtime.update_with_delta(Duration::from_millis(100)).unwrap().destroyed);
        }
        assert_eq!(destroyed.len(), 1);
        assert!(runtime.scene().read().find_by_name("flare").is_none());
    }
}
