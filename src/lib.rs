#![doc(html_logo_url = "https://www.rust-lang.org/logos/rust-logo-128x128.png")]
#![doc(html_favicon_url = "https://www.rust-lang.org/favicon.ico")]
//! # Postbox
//!
//! > **Location-transparent actors on Tokio.**
//!
//! Actors are registered by name in named systems and addressed through a [`Pid`]. Sending to
//! a `Pid` looks the same whether the actor lives in this process or behind a transport:
//! local actors run their handler, remote proxies frame the envelope and send it.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### One mailbox, one drainer
//!
//! Every actor owns a FIFO mailbox. Enqueueing never blocks and never runs the handler on the
//! caller's task. A compare-and-swap on the process state elects at most one drain task at a
//! time; that task delivers up to `sequential_invoke_limit` envelopes, goes idle, and re-arms
//! itself if producers raced in more work. Handlers therefore never run concurrently for the
//! same actor, and busy actors yield to others between batches.
//!
//! ### Requests are futures
//!
//! [`Pid::request`] returns a [`FutureHandle`] that completes exactly once: with a response,
//! an error, a cancellation, or a timeout. A request that sat in the mailbox past its timeout
//! is never delivered; its handle resolves as expired instead.
//!
//! ### Failures stay contained
//!
//! A handler that returns an error or panics faults the pending request, is reported to the
//! actor's and the system's error handlers, and ends the current batch. The actor keeps
//! serving. Remote sends can be guarded by a [`CircuitBreaker`].
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. Addressing ([`address`])
//! - **Key items**: [`Aid`](address::Aid), [`Pid`](address::Pid),
//!   [`Endpoint`](address::Endpoint), [`RemoteAddress`](address::RemoteAddress).
//!
//! ### 2. Messages ([`message`])
//! - **Role**: What callers build ([`Message`]) and what handlers receive ([`Envelope`]).
//!
//! ### 3. The Engine ([`process`], [`future`])
//! - **Role**: Mailbox scheduling, handler invocation, request completion.
//! - **Key items**: [`Actor`](process::Actor), [`receive_fn`](process::receive_fn),
//!   [`ActorContext`](process::ActorContext), [`FutureHandle`].
//!
//! ### 4. Systems ([`system`])
//! - **Role**: Name → actor tables, owned by an injectable [`SystemRegistry`].
//! - **Key items**: [`ActorSystem`](system::ActorSystem), [`ActorOptions`](system::ActorOptions),
//!   [`ActorClient`](system::ActorClient).
//!
//! ### 5. Remoting ([`remote`], [`wire`])
//! - **Role**: Framing, incremental parsing, request/response correlation across systems.
//! - **Key items**: [`RemoteTransport`](remote::RemoteTransport),
//!   [`LoopbackNetwork`](remote::LoopbackNetwork), [`FrameReader`](wire::FrameReader).
//!
//! ### 6. Resilience ([`breaker`])
//! - **Key items**: [`CircuitBreaker`], [`BreakerPolicy`](breaker::BreakerPolicy).
//!
//! ### 7. Testing ([`mock`])
//! - **Key items**: [`MockTransport`](mock::MockTransport).
//!
//! ## 🚀 Quick Start
//!
//! ```ignore
//! let registry = SystemRegistry::new();
//! let system = registry.get_or_add(ActorSystemOptions::new("app"))?;
//! let echo = system.from(ActorOptions::new("echo").with_function(receive_fn(|ctx, env| async move {
//!     ctx.respond_to(&env, env.data().clone());
//!     Ok(())
//! })))?;
//!
//! let reply = echo.ask("hello").await?;
//! assert_eq!(reply.data(), "hello");
//! ```
//!
//! ### Running Tests
//!
//! ```bash
//! RUST_LOG=debug cargo test
//! ```

pub mod address;
pub mod breaker;
pub mod error;
pub mod future;
pub mod message;
pub mod mock;
pub mod process;
pub mod remote;
pub mod runtime;
pub mod system;
pub mod wire;

pub use address::{Aid, Endpoint, Pid, RemoteAddress};
pub use breaker::{BreakerPolicy, CircuitBreaker, CircuitState};
pub use error::{ActorError, FutureError};
pub use future::{FutureHandle, FutureOutcome, FutureStatus};
pub use message::{Envelope, Message, MessageKind};
pub use process::{receive_fn, Actor, ActorContext};
pub use system::{ActorClient, ActorOptions, ActorSystem, ActorSystemOptions, SystemRegistry};
