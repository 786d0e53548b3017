use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam::channel::bounded;
use log::{debug, info, warn};

use super::task::{FnTask, QueuedTask, Task, TaskHandle, TaskState};
use super::thread::{TaskThread, ThreadShared};
use crate::error::{EngineError, Result};

/// Default time an idle task thread sleeps before re-checking its running flag.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(10);

/// Round-robin dispatch state, shared by the manager and all of its handles.
struct Dispatcher {
    queues: Vec<Arc<ThreadShared>>,
    next_index: AtomicUsize,
    next_id: AtomicU64,
    running: AtomicBool,
}

impl Dispatcher {
    /// Queues `task`, or expires it straight away once the pool has shut down.
    fn push(&self, task: Box<dyn Task>) -> TaskHandle {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TaskHandle::new(id, task.name().to_string(), index);
        if !self.running.load(Ordering::Acquire) {
            warn!("Task {} pushed after shutdown, dropping it", handle.label());
            handle.set_expired(true);
            handle.set_state(TaskState::Expired);
            return handle;
        }
        self.queues[index].push(QueuedTask {
            handle: handle.clone(),
            task,
        });
        handle
    }
}

/// A fixed pool of [`TaskThread`]s.
///
/// Tasks are assigned to threads in strict rotation, which balances task count
/// but not task cost. Nothing orders tasks that land on different threads; a
/// caller that needs "everything so far has finished" uses
/// [`wait_for_fence`](Self::wait_for_fence).
///
/// # Example
/// ```ignore
/// let tasks = TaskManager::new()?;
/// let handle = tasks.push_fn("greet", || {
///     log::info!("hello from a worker");
///     true
/// });
/// tasks.wait_for_fence();
/// assert!(handle.state().is_finished());
/// ```
pub struct TaskManager {
    threads: Vec<TaskThread>,
    dispatcher: Arc<Dispatcher>,
}

impl TaskManager {
    /// Creates one task thread per available hardware thread (at least one).
    pub fn new() -> Result<Self> {
        let count = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_threads(count, DEFAULT_IDLE_WAIT)
    }

    /// Creates exactly `count` task threads.
    ///
    /// Fails with [`EngineError::PoolInitFailure`] when `count` is zero or a
    /// thread cannot be spawned; threads already started are shut down again.
    pub fn with_threads(count: usize, idle_wait: Duration) -> Result<Self> {
        if count == 0 {
            return Err(EngineError::PoolInitFailure(
                "task pool needs at least one thread".into(),
            ));
        }

        let mut threads = Vec::with_capacity(count);
        for id in 0..count {
            // Dropping `threads` on error stops and joins what was spawned.
            threads.push(TaskThread::spawn(id, idle_wait)?);
        }

        let dispatcher = Arc::new(Dispatcher {
            queues: threads.iter().map(TaskThread::shared).collect(),
            next_index: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            running: AtomicBool::new(true),
        });

        info!("Task manager started with {} thread(s)", count);
        Ok(Self {
            threads,
            dispatcher,
        })
    }

    /// Queue a task on the next thread in rotation.
    pub fn push_task(&self, task: impl Task) -> TaskHandle {
        self.dispatcher.push(Box::new(task))
    }

    /// Queue an already boxed task.
    pub fn push_boxed(&self, task: Box<dyn Task>) -> TaskHandle {
        self.dispatcher.push(task)
    }

    /// Queue a closure as a task.
    pub fn push_fn<F>(&self, name: impl Into<String>, f: F) -> TaskHandle
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        self.push_task(FnTask::new(name, f))
    }

    /// Returns a handle that can push tasks from other threads, including
    /// from inside a running task.
    pub fn handle(&self) -> TaskManagerHandle {
        TaskManagerHandle {
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }

    /// Number of task threads in the pool.
    pub fn size(&self) -> usize {
        self.threads.len()
    }

    /// Tasks waiting on each thread, in thread order.
    pub fn queued(&self) -> Vec<usize> {
        self.threads.iter().map(TaskThread::queued).collect()
    }

    pub fn is_running(&self) -> bool {
        self.threads.iter().any(TaskThread::is_running)
    }

    /// Block until every task pushed before this call has left its queue.
    ///
    /// One marker task is queued per thread, bypassing the rotation, and the
    /// call waits for all of them. Returns `false` if a thread shut down
    /// before reaching its marker.
    pub fn wait_for_fence(&self) -> bool {
        if self.threads.is_empty() {
            return false;
        }
        let count = self.dispatcher.queues.len();
        let (tx, rx) = bounded::<()>(count);

        for (index, queue) in self.dispatcher.queues.iter().enumerate() {
            let tx = tx.clone();
            let id = self.dispatcher.next_id.fetch_add(1, Ordering::Relaxed);
            queue.push(QueuedTask {
                handle: TaskHandle::new(id, "fence".into(), index),
                task: Box::new(FnTask::new("fence", move || tx.send(()).is_ok())),
            });
        }
        drop(tx);

        for reached in 0..count {
            if rx.recv().is_err() {
                warn!("Fence abandoned after {} of {} thread(s)", reached, count);
                return false;
            }
        }
        true
    }

    /// Stop every thread and wait for them to exit. Threads that are in the
    /// middle of a batch finish it first. Calling this twice is a no-op.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.dispatcher.running.store(false, Ordering::Release);
        debug!("Stopping {} task thread(s)", self.threads.len());
        for thread in &self.threads {
            thread.stop();
        }
        for thread in &mut self.threads {
            thread.join();
        }
        self.threads.clear();
        info!("Task manager stopped");
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A cloneable handle used to push tasks from any thread.
#[derive(Clone)]
pub struct TaskManagerHandle {
    dispatcher: Arc<Dispatcher>,
}

impl TaskManagerHandle {
    pub fn push_task(&self, task: impl Task) -> TaskHandle {
        self.dispatcher.push(Box::new(task))
    }

    pub fn push_fn<F>(&self, name: impl Into<String>, f: F) -> TaskHandle
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        self.push_task(FnTask::new(name, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tasks::TaskState;
    use std::sync::Mutex;

    const IDLE: Duration = Duration::from_millis(5);

    #[test]
    fn test_new_uses_available_parallelism() {
        let tasks = TaskManager::new().unwrap();
        let expected = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(tasks.size(), expected);
        assert!(tasks.size() >= 1);
    }

    #[test]
    fn test_zero_threads_is_a_pool_failure() {
        let result = TaskManager::with_threads(0, IDLE);
        assert!(matches!(result, Err(EngineError::PoolInitFailure(_))));
    }

    #[test]
    fn test_round_robin_distribution() {
        let tasks = TaskManager::with_threads(3, IDLE).unwrap();
        let handles: Vec<_> = (0..10).map(|_| tasks.push_fn("rr", || true)).collect();

        let assigned: Vec<_> = handles.iter().map(TaskHandle::thread_id).collect();
        assert_eq!(assigned, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);

        let mut per_thread = [0usize; 3];
        for thread_id in assigned {
            per_thread[thread_id] += 1;
        }
        // ceil(10/3) = 4, floor(10/3) = 3
        assert_eq!(per_thread, [4, 3, 3]);
        assert!(tasks.wait_for_fence());
    }

    #[test]
    fn test_task_ids_increase() {
        let tasks = TaskManager::with_threads(2, IDLE).unwrap();
        let a = tasks.push_fn("a", || true);
        let b = tasks.push_fn("b", || true);
        assert!(b.id() > a.id());
        assert_eq!(a.name(), "a");
    }

    #[test]
    fn test_fence_waits_for_prior_tasks() {
        let tasks = TaskManager::with_threads(4, IDLE).unwrap();
        let finished = Arc::new(Mutex::new(Vec::new()));

        for i in 0..16 {
            let finished = Arc::clone(&finished);
            tasks.push_fn("sleepy", move || {
                thread::sleep(Duration::from_millis(5));
                finished.lock().unwrap().push(i);
                true
            });
        }

        assert!(tasks.wait_for_fence());
        assert_eq!(finished.lock().unwrap().len(), 16);
    }

    #[test]
    fn test_expired_before_drain_never_runs() {
        let tasks = TaskManager::with_threads(1, IDLE).unwrap();
        let (release_tx, release_rx) = bounded::<()>(1);
        let ran = Arc::new(Mutex::new(false));

        // Park the only worker so the next task stays queued.
        tasks.push_fn("gate", move || release_rx.recv().is_ok());
        let r = Arc::clone(&ran);
        let cancelled = tasks.push_fn("cancelled", move || {
            *r.lock().unwrap() = true;
            true
        });
        cancelled.set_expired(true);
        release_tx.send(()).unwrap();

        assert!(tasks.wait_for_fence());
        assert_eq!(cancelled.state(), TaskState::Expired);
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn test_handle_pushes_from_inside_a_task() {
        let tasks = TaskManager::with_threads(2, IDLE).unwrap();
        let handle = tasks.handle();
        let (tx, rx) = bounded::<TaskHandle>(1);

        tasks.push_fn("spawner", move || {
            let child = handle.push_fn("child", || true);
            tx.send(child).is_ok()
        });

        let child = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(tasks.wait_for_fence());
        assert_eq!(child.state(), TaskState::Completed);
    }

    #[test]
    fn test_faulting_task_does_not_stop_the_pool() {
        let tasks = TaskManager::with_threads(2, IDLE).unwrap();
        let bad = tasks.push_fn("bad", || panic!("task fault"));
        let good = tasks.push_fn("good", || true);

        assert!(tasks.wait_for_fence());
        assert_eq!(bad.state(), TaskState::Failed);
        assert_eq!(good.state(), TaskState::Completed);
        assert!(tasks.is_running());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut tasks = TaskManager::with_threads(2, IDLE).unwrap();
        let slow = tasks.push_fn("slow", || {
            thread::sleep(Duration::from_millis(20));
            true
        });
        while slow.state() == TaskState::Queued {
            thread::sleep(Duration::from_millis(1));
        }

        tasks.shutdown();
        assert!(!tasks.is_running());
        assert_eq!(tasks.size(), 0);
        assert_eq!(slow.state(), TaskState::Completed);

        tasks.shutdown();
        assert_eq!(tasks.size(), 0);
    }

    #[test]
    fn test_push_after_shutdown_expires_the_task() {
        let mut tasks = TaskManager::with_threads(2, IDLE).unwrap();
        let handle = tasks.handle();
        tasks.shutdown();

        let ran = Arc::new(Mutex::new(false));
        let r = Arc::clone(&ran);
        let late = handle.push_fn("late", move || {
            *r.lock().unwrap() = true;
            true
        });
        let direct = tasks.push_fn("direct", || true);

        assert_eq!(late.state(), TaskState::Expired);
        assert_eq!(direct.state(), TaskState::Expired);
        assert!(late.state().is_finished());
        thread::sleep(Duration::from_millis(20));
        assert!(!*ran.lock().unwrap());
    }
}
