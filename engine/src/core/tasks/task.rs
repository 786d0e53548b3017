use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Identifier assigned to a task when it is pushed to a [`TaskManager`](super::TaskManager).
pub type TaskId = u64;

/// A unit of work executed on one of the task threads.
///
/// `execute` performs bounded work and returns whether it completed. The
/// return value is advisory: a `false` is logged and the task is dropped like
/// any other. Implementations must not block on other tasks.
pub trait Task: Send + 'static {
    /// Run the task.
    fn execute(&mut self) -> bool;

    /// Name used when logging faults.
    fn name(&self) -> &str {
        "task"
    }
}

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Queued = 0,
    Active = 1,
    Completed = 2,
    Failed = 3,
    Expired = 4,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => TaskState::Queued,
            1 => TaskState::Active,
            2 => TaskState::Completed,
            3 => TaskState::Failed,
            _ => TaskState::Expired,
        }
    }

    /// Whether the task has left the queue for good.
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Expired
        )
    }
}

/// State shared between a queued task and every [`TaskHandle`] to it.
#[derive(Debug)]
pub(crate) struct TaskShared {
    id: TaskId,
    name: String,
    thread_id: usize,
    expired: AtomicBool,
    state: AtomicU8,
}

/// A cheap, cloneable reference to a task that has been pushed.
///
/// Holders can cancel the task with [`set_expired`](Self::set_expired). An
/// expired task is discarded without running if its thread has not drained it
/// yet; once the drain has started the flag has no effect.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    shared: Arc<TaskShared>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, name: String, thread_id: usize) -> Self {
        Self {
            shared: Arc::new(TaskShared {
                id,
                name,
                thread_id,
                expired: AtomicBool::new(false),
                state: AtomicU8::new(TaskState::Queued as u8),
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Index of the task thread this task was dispatched to.
    pub fn thread_id(&self) -> usize {
        self.shared.thread_id
    }

    pub fn has_expired(&self) -> bool {
        self.shared.expired.load(Ordering::Acquire)
    }

    pub fn set_expired(&self, expired: bool) {
        self.shared.expired.store(expired, Ordering::Release);
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.shared.state.store(state as u8, Ordering::Release);
    }

    /// `name#id`, used in log lines.
    pub(crate) fn label(&self) -> String {
        format!("{}#{}", self.shared.name, self.shared.id)
    }
}

/// A task paired with its handle while it sits in a thread's queue.
pub(crate) struct QueuedTask {
    pub(crate) handle: TaskHandle,
    pub(crate) task: Box<dyn Task>,
}

/// Adapts a closure into a [`Task`].
pub struct FnTask<F> {
    name: String,
    f: Option<F>,
}

impl<F> FnTask<F>
where
    F: FnOnce() -> bool + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f: Some(f),
        }
    }
}

impl<F> Task for FnTask<F>
where
    F: FnOnce() -> bool + Send + 'static,
{
    fn execute(&mut self) -> bool {
        match self.f.take() {
            Some(f) => f(),
            None => false,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
