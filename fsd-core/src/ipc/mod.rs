//! In-process event bus.

pub mod broadcaster;
pub mod message;

pub use broadcaster::{BroadcastOutcome, Broadcaster, Subscription};
pub use message::{COMPACT_MESSAGE_NAME, FsdOp, Message, OpSet};
