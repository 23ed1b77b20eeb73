//! Background sync: durable queue of mutations replayed when connectivity returns.
//!
//! Delivery is at-least-once. An action is removed only after a 2xx replay, so a
//! crash between sending and the removal write replays it again on the next trigger.

mod queue;

pub use queue::{PendingSyncAction, ReplayReport, SyncPayload, SyncQueue};
