//! Core types: tracing setup, event query windows

pub mod tracing;
pub mod window;

pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use window::{EventWindow, WindowError};
