//! Process-wide tracing setup shared by every jobwire binary.

pub mod subscriber;

pub use subscriber::{DEFAULT_DIRECTIVE, init};
