pub mod log;
pub mod runner;
pub mod tasks;
pub mod time;

pub use time::Time;
