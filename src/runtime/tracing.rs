//! # Observability & Tracing
//!
//! The runtime logs through `tracing` with structured fields; nothing is printed unless the
//! application installs a subscriber. [`setup_tracing`] installs the usual one.
//!
//! ## What Gets Traced
//!
//! - **Registry**: system creation, remote bind/unbind, system dispose (`info`)
//! - **Actors**: registration and dispose (`info`), every delivered envelope (`debug`)
//! - **Failures**: handler errors, expired requests, failed forwards (`warn`), panicking
//!   error handlers (`error`)
//! - **Breakers**: every state transition (`info`), rejected calls (`debug`)
//! - **Wire**: malformed or skipped frames (`warn`), cancel frames (`debug`)
//!
//! Every event carries `system` and, where there is one, `actor` and `id` fields, so a single
//! request can be followed across systems by its message id.
//!
//! ## Usage Examples
//!
//! ```bash
//! # Lifecycle and failures only
//! RUST_LOG=info cargo test
//!
//! # Every envelope delivery
//! RUST_LOG=postbox=debug cargo test
//! ```

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
///
/// Panics if a global subscriber is already set.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // module paths add nothing; events carry system/actor fields
        .compact()
        .init();
}

/// Like [`setup_tracing`] but writes through the test harness and tolerates being called
/// from every test.
pub fn setup_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init();
}
