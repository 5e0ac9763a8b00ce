//! Wire protocol spoken over the message channel.

pub mod messages;

pub use messages::*;
