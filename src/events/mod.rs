//! Runtime lifecycle events.
//!
//! The [`Subscriber`] keeps a subscription to the runtime's event bus open in a background task
//! and buffers the [`RawEvent`]s it receives until the next poll cycle flushes them.

mod payload;
mod subscriber;

use std::collections::BTreeMap;

pub use payload::{Payload, PayloadError, decode_payload};
pub use subscriber::{State, Subscriber};

/// An event as received from the runtime, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// Slash separated topic, e.g. `/containers/delete`.
    pub topic: String,
    /// Publication time in UNIX epoch seconds.
    pub timestamp: i64,
    pub namespace: String,
    /// Container ID or image name the event is about.
    pub subject_id: String,
    pub message: String,
    pub extra: BTreeMap<String, String>,
}
