use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, trace};
use parking_lot::{Condvar, Mutex};

use super::task::{QueuedTask, TaskHandle, TaskState};
use crate::error::{EngineError, Result};

/// Queue and run flag of one worker, shared with whoever dispatches to it.
pub(crate) struct ThreadShared {
    queue: Mutex<Vec<QueuedTask>>,
    wake: Condvar,
    running: AtomicBool,
}

impl ThreadShared {
    fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            wake: Condvar::new(),
            running: AtomicBool::new(true),
        }
    }

    pub(crate) fn push(&self, task: QueuedTask) {
        self.queue.lock().push(task);
        self.wake.notify_one();
    }

    pub(crate) fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        // Taking the lock orders the store before a worker's wait.
        let _queue = self.queue.lock();
        self.wake.notify_all();
    }

    fn run(&self, id: usize, idle_wait: Duration) {
        debug!("Task thread {} started", id);
        while self.running.load(Ordering::Acquire) {
            let batch = {
                let mut queue = self.queue.lock();
                if queue.is_empty() && self.running.load(Ordering::Acquire) {
                    self.wake.wait_for(&mut queue, idle_wait);
                }
                std::mem::take(&mut *queue)
            };

            if !batch.is_empty() {
                trace!("Task thread {} draining {} task(s)", id, batch.len());
            }

            for QueuedTask { handle, mut task } in batch {
                run_task(&handle, task.as_mut());
            }

            thread::yield_now();
        }
        debug!("Task thread {} stopped", id);
    }
}

fn run_task(handle: &TaskHandle, task: &mut dyn super::Task) {
    if handle.has_expired() {
        trace!("Skipping expired task {}", handle.label());
        handle.set_state(TaskState::Expired);
        return;
    }

    handle.set_state(TaskState::Active);
    match panic::catch_unwind(AssertUnwindSafe(|| task.execute())) {
        Ok(true) => handle.set_state(TaskState::Completed),
        Ok(false) => {
            debug!("Task {} did not complete", handle.label());
            handle.set_state(TaskState::Failed);
        }
        Err(payload) => {
            let fault = EngineError::TaskFault {
                task: handle.label(),
                message: panic_message(payload.as_ref()),
            };
            error!("{}", fault);
            handle.set_state(TaskState::Failed);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One OS thread draining a private task queue.
///
/// Each iteration snapshots and clears the whole queue, runs every task in the
/// snapshot that has not expired, then drops the batch. Tasks pushed while a
/// batch is running wait for the next iteration. Idle threads sleep on a
/// condition variable until a push or until `idle_wait` elapses.
pub struct TaskThread {
    id: usize,
    shared: Arc<ThreadShared>,
    handle: Option<JoinHandle<()>>,
}

impl TaskThread {
    pub(crate) fn spawn(id: usize, idle_wait: Duration) -> Result<Self> {
        let shared = Arc::new(ThreadShared::new());
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("dream-task-{}", id))
            .spawn(move || worker.run(id, idle_wait))
            .map_err(|e| EngineError::PoolInitFailure(format!("task thread {}: {}", id, e)))?;

        Ok(Self {
            id,
            shared,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Number of tasks waiting for the next drain.
    pub fn queued(&self) -> usize {
        self.shared.queued()
    }

    pub(crate) fn shared(&self) -> Arc<ThreadShared> {
        Arc::clone(&self.shared)
    }

    /// Clear the running flag. The thread finishes its current batch and exits.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// Wait for the thread to exit. Call [`stop`](Self::stop) first.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Task thread {} exited abnormally", self.id);
            }
        }
    }
}

impl Drop for TaskThread {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}
