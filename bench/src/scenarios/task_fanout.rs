//! Task fan-out scenario.
//!
//! Pushes a batch of small tasks every frame and waits on the fence, the way
//! components spread per-frame work across the pool.

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dream_engine::TaskManager;

use super::Scenario;

#[derive(Debug, Clone)]
pub struct TaskFanoutConfig {
    pub tasks_per_frame: usize,
    /// Loop iterations inside each task.
    pub work: u64,
    pub threads: usize,
    pub idle_wait: Duration,
}

impl Default for TaskFanoutConfig {
    fn default() -> Self {
        Self {
            tasks_per_frame: 1_000,
            work: 500,
            threads: 4,
            idle_wait: Duration::from_millis(1),
        }
    }
}

pub struct TaskFanoutScenario {
    config: TaskFanoutConfig,
    tasks: Option<TaskManager>,
    completed: Arc<AtomicUsize>,
}

impl TaskFanoutScenario {
    pub fn with_config(config: TaskFanoutConfig) -> Self {
        Self {
            config,
            tasks: None,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Tasks that have finished since setup.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }
}

impl Scenario for TaskFanoutScenario {
    fn name(&self) -> &'static str {
        "task_fanout"
    }

    fn description(&self) -> &'static str {
        "Many small tasks per frame, joined by a fence"
    }

    fn size(&self) -> usize {
        self.tasks
            .as_ref()
            .map_or(0, |tasks| tasks.queued().iter().sum())
    }

    fn setup(&mut self) {
        let tasks = TaskManager::with_threads(self.config.threads, self.config.idle_wait)
            .unwrap_or_else(|err| panic!("task pool setup failed: {}", err));
        self.completed.store(0, Ordering::Relaxed);
        self.tasks = Some(tasks);
    }

    fn update(&mut self) {
        let Some(tasks) = self.tasks.as_ref() else {
            return;
        };
        for i in 0..self.config.tasks_per_frame {
            let work = self.config.work;
            let completed = Arc::clone(&self.completed);
            tasks.push_fn("fanout", move || {
                black_box((0..work).fold(i as u64, u64::wrapping_add));
                completed.fetch_add(1, Ordering::Relaxed);
                true
            });
        }
        tasks.wait_for_fence();
    }

    fn teardown(&mut self) {
        if let Some(mut tasks) = self.tasks.take() {
            tasks.shutdown();
        }
    }
}
