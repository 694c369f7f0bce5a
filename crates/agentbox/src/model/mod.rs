pub mod outcome;
pub mod request;

pub use outcome::*;
pub use request::*;

/// Number of trailing output lines retained for diagnostics.
pub const TRAILING_LINES: usize = 50;

/// Marker that replaces large tool payloads in captured diagnostics.
pub const REDACTED_MARKER: &str = "[truncated]";
