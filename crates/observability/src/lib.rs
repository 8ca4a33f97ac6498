//! Process-wide logging setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize tracing for the process. Later calls are no-ops.
pub fn init(format: LogFormat) {
    tracing::init(format);
}
