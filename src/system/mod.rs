//! Actor systems and the registry that owns them.
//!
//! # Main Components
//!
//! - [`SystemRegistry`] - injectable name → system table with get-or-add semantics
//! - [`ActorSystem`] - name → process table; creates, resolves and disposes actors
//! - [`ActorSystemOptions`] / [`ActorOptions`] - configuration builders
//! - [`ActorClient`] - typed client trait over a [`Pid`](crate::address::Pid)

mod actor_system;
mod client;
mod options;
mod registry;

pub use actor_system::ActorSystem;
pub(crate) use actor_system::SystemShared;
pub use client::ActorClient;
pub use options::{
    ActorOptions, ActorSystemOptions, SystemSettings, DEFAULT_DISPOSE_TIMEOUT,
    DEFAULT_SEQUENTIAL_INVOKE_LIMIT,
};
pub use registry::SystemRegistry;
