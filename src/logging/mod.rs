//! Structured logging setup and ndjson alert lines.

mod format;

pub use format::{ts_iso, AlertLine, StructuredLogger};
