//! Change-notification mechanics for the inventory core.
//!
//! Events are published only after the write they describe has committed.
//! Consumers (read caches, dashboards, audit feeds) subscribe to a bus and use
//! the events as invalidation signals; the database stays the source of truth.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, NoopEventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
