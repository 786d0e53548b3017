//! Interactive console for stepping a project runtime by hand.

mod console;

pub use console::{Command, Console, ConsoleError};
