mod channel;

pub use channel::{ChannelLogger, LogMessage};
