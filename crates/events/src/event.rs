use chrono::{DateTime, Utc};

/// A fact that already happened.
///
/// Events are immutable and carry a stable type name so that consumers outside
/// the process can route on it without deserializing the payload.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. `"inventory.stock.movement_recorded"`).
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the change was committed.
    fn occurred_at(&self) -> DateTime<Utc>;
}
