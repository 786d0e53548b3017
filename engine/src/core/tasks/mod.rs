//! Fixed-size worker pool for per-frame component work.
//!
//! A [`TaskManager`] owns one [`TaskThread`] per hardware thread and hands out
//! tasks in rotation. Each thread drains its whole private queue per iteration,
//! so a task pushed while a batch is running waits for the next one.

mod manager;
mod task;
mod thread;

pub use manager::{DEFAULT_IDLE_WAIT, TaskManager, TaskManagerHandle};
pub use task::{FnTask, Task, TaskHandle, TaskId, TaskState};
pub use thread::TaskThread;
