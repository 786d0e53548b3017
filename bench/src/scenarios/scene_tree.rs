//! Random scene graph scenario.
//!
//! Builds a tree where every node hangs off a random earlier node, so depth
//! and fan-out vary the way hand-built scenes do. A share of the nodes
//! reference one of a few shared shader assets and a share have a short
//! lifetime, so frames exercise instance creation, the lifetime component and
//! the delete sweep together.

use std::time::Duration;

use dream_engine::asset::{AssetDefinition, AssetType};
use dream_engine::component::LifetimeComponent;
use dream_engine::project::{NodeDefinition, SceneDefinition};
use dream_engine::{EngineConfig, ProjectDefinition, ProjectDirectory, ProjectRuntime, Scene};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use uuid::Uuid;

use super::{MemoryLoader, Scenario};

/// Configuration for the scene tree benchmark.
#[derive(Debug, Clone)]
pub struct SceneTreeConfig {
    pub node_count: usize,
    /// Distinct shader assets shared between nodes.
    pub shared_assets: usize,
    /// Chance that a node references a shader.
    pub asset_chance: f64,
    /// Chance that a node gets a lifetime.
    pub mortal_chance: f64,
    /// Upper bound for random lifetimes.
    pub max_lifetime: Duration,
    /// Simulated delta per frame.
    pub delta: Duration,
    /// Random seed for reproducibility.
    pub seed: u64,
    pub threads: usize,
}

impl Default for SceneTreeConfig {
    fn default() -> Self {
        Self {
            node_count: 10_000,
            shared_assets: 16,
            asset_chance: 0.5,
            mortal_chance: 0.25,
            max_lifetime: Duration::from_millis(500),
            delta: Duration::from_millis(16),
            seed: 24680,
            threads: 4,
        }
    }
}

/// A project with one scene whose tree is generated from `config`.
pub fn random_project(config: &SceneTreeConfig) -> ProjectDefinition {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let assets: Vec<_> = (0..config.shared_assets)
        .map(|i| {
            AssetDefinition::new(
                Uuid::new_v4(),
                format!("shader-{}", i),
                AssetType::Shader,
                "glsl",
            )
        })
        .collect();

    let count = config.node_count.max(1);
    let mut parents = Vec::with_capacity(count);
    let mut nodes: Vec<Option<NodeDefinition>> = Vec::with_capacity(count);
    for i in 0..count {
        let mut node = NodeDefinition::new(format!("node-{}", i));
        if !assets.is_empty() && rng.gen_bool(config.asset_chance) {
            let asset = &assets[rng.gen_range(0..assets.len())];
            node = node.with_asset(AssetType::Shader, asset.uuid);
        }
        let max_lifetime = config.max_lifetime.as_millis() as u64;
        if i > 0 && max_lifetime > 0 && rng.gen_bool(config.mortal_chance) {
            node = node.with_die_after_ms(rng.gen_range(0..max_lifetime));
        }
        parents.push(if i == 0 { 0 } else { rng.gen_range(0..i) });
        nodes.push(Some(node));
    }

    // Parents always come first, so folding from the back sees finished subtrees.
    for i in (1..count).rev() {
        if let Some(child) = nodes[i].take() {
            if let Some(parent) = nodes[parents[i]].as_mut() {
                parent.children.insert(0, child);
            }
        }
    }
    let root = nodes[0]
        .take()
        .unwrap_or_else(|| NodeDefinition::new("node-0"));

    let scene = SceneDefinition {
        uuid: Uuid::new_v4(),
        name: "random".into(),
        root,
    };
    ProjectDefinition {
        uuid: Uuid::new_v4(),
        name: "bench".into(),
        description: format!("{} random nodes", count),
        startup_scene: scene.uuid,
        assets,
        scenes: vec![scene],
    }
}

/// Flags roughly `chance` of the nodes in `scene`, root excluded. Returns how
/// many were flagged.
pub fn flag_random(scene: &Scene, chance: f64, seed: u64) -> usize {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let root = scene.root();
    let mut flagged = 0;
    scene.apply_to_all(|id, node| {
        if id != root && rng.gen_bool(chance) {
            node.set_delete_flag(true);
            flagged += 1;
        }
    });
    flagged
}

pub struct SceneTreeScenario {
    config: SceneTreeConfig,
    runtime: Option<ProjectRuntime>,
}

impl SceneTreeScenario {
    pub fn new() -> Self {
        Self::with_config(SceneTreeConfig::default())
    }

    pub fn with_config(config: SceneTreeConfig) -> Self {
        Self {
            config,
            runtime: None,
        }
    }

    pub fn runtime_mut(&mut self) -> Option<&mut ProjectRuntime> {
        self.runtime.as_mut()
    }
}

impl Default for SceneTreeScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for SceneTreeScenario {
    fn name(&self) -> &'static str {
        "scene_tree"
    }

    fn description(&self) -> &'static str {
        "Random tree with shared assets and short-lived nodes"
    }

    fn size(&self) -> usize {
        self.runtime
            .as_ref()
            .map_or(0, |runtime| runtime.scene().read().node_count())
    }

    fn setup(&mut self) {
        let config = EngineConfig {
            worker_threads: Some(self.config.threads),
            ..EngineConfig::default()
        };
        let project = random_project(&self.config);
        let mut runtime =
            ProjectRuntime::new(config, project, ProjectDirectory::new("."))
                .unwrap_or_else(|err| panic!("scene tree setup failed: {}", err));
        runtime.register_loader(MemoryLoader::new(AssetType::Shader));
        runtime.add_component(LifetimeComponent::new());
        if let Err(err) = runtime.init() {
            panic!("scene tree init failed: {}", err);
        }
        self.runtime = Some(runtime);
    }

    fn update(&mut self) {
        if let Some(runtime) = self.runtime.as_mut() {
            if let Err(err) = runtime.update_with_delta(self.config.delta) {
                panic!("frame failed: {}", err);
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut runtime) = self.runtime.take() {
            runtime.shutdown();
        }
    }
}
