use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::runtime::Handle;

use crate::address::Endpoint;
use crate::breaker::BreakerPolicy;
use crate::error::ActorError;
use crate::message::Envelope;
use crate::process::{Actor, Backing, ContextData, ErrorHandler, LocalHandler, ReceiveFn};

/// Envelopes one drain task delivers before yielding the worker.
pub const DEFAULT_SEQUENTIAL_INVOKE_LIMIT: usize = 32;

/// How long system disposal waits for one actor's `on_dispose` hook.
pub const DEFAULT_DISPOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Options for [`SystemRegistry::get_or_add`](super::SystemRegistry::get_or_add).
#[derive(Clone)]
pub struct ActorSystemOptions {
    pub(crate) name: String,
    pub(crate) sequential_invoke_limit: usize,
    pub(crate) default_request_timeout: Option<Duration>,
    pub(crate) dispose_timeout: Duration,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) runtime: Option<Handle>,
}

impl ActorSystemOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequential_invoke_limit: DEFAULT_SEQUENTIAL_INVOKE_LIMIT,
            default_request_timeout: None,
            dispose_timeout: DEFAULT_DISPOSE_TIMEOUT,
            error_handler: None,
            runtime: None,
        }
    }

    /// Values below 1 fall back to [`DEFAULT_SEQUENTIAL_INVOKE_LIMIT`].
    pub fn with_sequential_invoke_limit(mut self, limit: usize) -> Self {
        self.sequential_invoke_limit = if limit < 1 {
            DEFAULT_SEQUENTIAL_INVOKE_LIMIT
        } else {
            limit
        };
        self
    }

    /// Applied to requests whose actor and message set no timeout. Unbounded by default.
    pub fn with_default_request_timeout(mut self, timeout: Duration) -> Self {
        self.default_request_timeout = Some(timeout);
        self
    }

    /// Bounds the wait for each actor's `on_dispose` hook, including the wait for a
    /// handler that is still running.
    pub fn with_dispose_timeout(mut self, timeout: Duration) -> Self {
        self.dispose_timeout = timeout;
        self
    }

    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&ActorError, Option<&Envelope>) + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Runtime the system's actors drain on. Defaults to the caller's current runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn from_settings(settings: SystemSettings) -> Self {
        let limit = usize::try_from(settings.sequential_invoke_limit.unwrap_or(0)).unwrap_or(0);
        let mut options = Self::new(settings.name).with_sequential_invoke_limit(limit);
        if let Some(ms) = settings.default_request_timeout_ms.filter(|ms| *ms > 0) {
            options = options.with_default_request_timeout(Duration::from_millis(ms));
        }
        options
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ActorSystemOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystemOptions")
            .field("name", &self.name)
            .field("sequential_invoke_limit", &self.sequential_invoke_limit)
            .field("default_request_timeout", &self.default_request_timeout)
            .field("dispose_timeout", &self.dispose_timeout)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

/// Deserializable system settings for external config loaders.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemSettings {
    pub name: String,
    #[serde(default)]
    pub sequential_invoke_limit: Option<i64>,
    #[serde(default)]
    pub default_request_timeout_ms: Option<u64>,
}

pub(crate) struct RemoteTarget {
    pub system: String,
    pub endpoint: Endpoint,
}

/// Options for [`ActorSystem::from`](super::ActorSystem::from).
pub struct ActorOptions {
    pub(crate) name: String,
    pub(crate) backing: Option<Backing>,
    pub(crate) remote: Option<RemoteTarget>,
    pub(crate) data: ContextData,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) sequential_invoke_limit: Option<usize>,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) breaker: Option<BreakerPolicy>,
}

impl ActorOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backing: None,
            remote: None,
            data: ContextData::new(),
            request_timeout: None,
            sequential_invoke_limit: None,
            error_handler: None,
            breaker: None,
        }
    }

    /// Backs the actor with a default-constructed `A`.
    pub fn with_type<A: Actor + Default>(self) -> Self {
        self.with_actor(A::default())
    }

    pub fn with_actor<A: Actor>(mut self, actor: A) -> Self {
        self.backing = Some(Backing::class(actor));
        self
    }

    /// Registering the same name again must pass a clone of the same `ReceiveFn`.
    pub fn with_function(mut self, receive: ReceiveFn) -> Self {
        self.backing = Some(Backing::Local(LocalHandler::Function(receive)));
        self
    }

    /// Makes these options describe a proxy for `system/name` at `endpoint`.
    pub fn remote(mut self, system: impl Into<String>, endpoint: Endpoint) -> Self {
        self.remote = Some(RemoteTarget {
            system: system.into(),
            endpoint,
        });
        self
    }

    /// Seeds the actor's context data store.
    pub fn with_data<T: Any + Send + Sync>(mut self, key: impl Into<String>, value: T) -> Self {
        self.data.insert(key.into(), Arc::new(value));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Values below 1 fall back to the system's limit.
    pub fn with_sequential_invoke_limit(mut self, limit: usize) -> Self {
        self.sequential_invoke_limit = Some(limit).filter(|l| *l >= 1);
        self
    }

    pub fn with_error_handler(
        mut self,
        handler: impl Fn(&ActorError, Option<&Envelope>) + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Guards a remote proxy's sends with a circuit breaker.
    pub fn with_circuit_breaker(mut self, policy: BreakerPolicy) -> Self {
        self.breaker = Some(policy);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ActorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorOptions")
            .field("name", &self.name)
            .field("backing", &self.backing.as_ref().map(Backing::describe))
            .field("remote", &self.remote.as_ref().map(|r| format!("{}@{}", r.system, r.endpoint)))
            .field("request_timeout", &self.request_timeout)
            .field("sequential_invoke_limit", &self.sequential_invoke_limit)
            .finish_non_exhaustive()
    }
}
