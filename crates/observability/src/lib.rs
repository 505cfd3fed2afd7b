//! Process-wide tracing/logging setup.

pub mod tracing;

pub use self::tracing::LogFormat;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    self::tracing::init(LogFormat::from_env());
}
