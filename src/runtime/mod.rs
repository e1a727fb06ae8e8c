//! Runtime support outside the actor model itself.
//!
//! # Main Components
//!
//! - [`setup_tracing`] - Initializes the tracing/logging infrastructure
//! - [`setup_test_tracing`] - The same for test binaries, safe to call repeatedly

pub mod tracing;

pub use self::tracing::*;
