// observability/mod.rs - Tracing

//! Structured logging setup for the binaries.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the program embedding the crate.
//!
//! # Example
//!
//! ```ignore
//! use domainkey_trust::observability::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::default())?;
//! ```

mod tracing_setup;

pub use tracing_setup::{init_tracing, TracingConfig, TracingFormat};
