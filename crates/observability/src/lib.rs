//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide tracing/logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &ObservabilityConfig) {
    tracing::init(config);
}

/// Tracing configuration (filters, formatters).
pub mod tracing;

pub use self::tracing::{LogFormat, ObservabilityConfig, UnknownLogFormat};
