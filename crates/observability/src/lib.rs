//! Process-wide tracing setup shared by every binary.

pub mod subscriber;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    subscriber::init_with_default(subscriber::DEFAULT_FILTER);
}
