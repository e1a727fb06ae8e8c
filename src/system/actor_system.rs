use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{info, warn};

use super::options::{ActorOptions, ActorSystemOptions};
use super::registry::RegistryInner;
use crate::address::{Aid, Endpoint, Pid, RemoteAddress};
use crate::breaker::CircuitBreaker;
use crate::error::ActorError;
use crate::process::{panic_message, Backing, ErrorHandler, Process, ProcessSettings, RemoteProxy};
use crate::remote::{InboundChannel, RemoteBinding, RemoteSettings, RemoteTransport};
use crate::wire::{MessageIdGenerator, SerializerRegistry};

/// State every process of a system shares.
pub(crate) struct SystemShared {
    pub name: String,
    pub runtime: Handle,
    pub ids: Arc<MessageIdGenerator>,
    pub invoke_limit: usize,
    pub request_timeout: Option<Duration>,
    pub dispose_timeout: Duration,
    pub error_handler: Option<ErrorHandler>,
    pub remote: RwLock<Option<Arc<RemoteBinding>>>,
}

impl SystemShared {
    pub fn remote_binding(&self) -> Option<Arc<RemoteBinding>> {
        self.remote.read().clone()
    }
}

/// A named table of actors.
///
/// Local actors are keyed by name; remote proxies by `"{remote_system}/{remote_actor}"`.
pub struct ActorSystem {
    shared: Arc<SystemShared>,
    processes: RwLock<HashMap<String, Arc<Process>>>,
    registry: Weak<RegistryInner>,
    serializers: SerializerRegistry,
    disposed: AtomicBool,
}

impl ActorSystem {
    pub(crate) fn create(
        options: ActorSystemOptions,
        registry: Weak<RegistryInner>,
        ids: Arc<MessageIdGenerator>,
        serializers: SerializerRegistry,
    ) -> Result<Arc<Self>, ActorError> {
        let runtime = match options.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| ActorError::NoRuntime)?,
        };
        Ok(Arc::new(Self {
            shared: Arc::new(SystemShared {
                name: options.name,
                runtime,
                ids,
                invoke_limit: options.sequential_invoke_limit,
                request_timeout: options.default_request_timeout,
                dispose_timeout: options.dispose_timeout,
                error_handler: options.error_handler,
                remote: RwLock::new(None),
            }),
            processes: RwLock::new(HashMap::new()),
            registry,
            serializers,
            disposed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<(), ActorError> {
        if self.is_disposed() {
            return Err(ActorError::SystemDisposed(self.shared.name.clone()));
        }
        Ok(())
    }

    /// Creates or fetches a local actor, or a remote proxy when the options name one.
    ///
    /// Fetching succeeds only when the existing registration has the same kind and the same
    /// concrete type (or the same function); anything else is [`ActorError::AlreadyExists`].
    pub fn from(&self, options: ActorOptions) -> Result<Pid, ActorError> {
        if options.remote.is_some() {
            return self.from_remote(options);
        }
        self.ensure_live()?;
        let name = options.name.trim().to_string();
        if name.is_empty() {
            return Err(ActorError::EmptyName("actor name"));
        }
        let Some(backing) = options.backing else {
            return Err(ActorError::MissingBacking(name));
        };
        let settings = ProcessSettings {
            invoke_limit: options.sequential_invoke_limit.unwrap_or(self.shared.invoke_limit),
            request_timeout: options.request_timeout.or(self.shared.request_timeout),
            error_handler: options.error_handler,
            data: options.data,
        };
        let aid = Aid::new(&self.shared.name, &name);
        self.get_or_register(name, aid, backing, settings)
    }

    /// Creates or fetches the proxy for an actor hosted elsewhere.
    pub fn from_remote(&self, options: ActorOptions) -> Result<Pid, ActorError> {
        self.ensure_live()?;
        let name = options.name.trim().to_string();
        if name.is_empty() {
            return Err(ActorError::EmptyName("actor name"));
        }
        let Some(target) = options.remote else {
            return Err(ActorError::InvalidConfig(format!(
                "actor {name} has no remote system and endpoint"
            )));
        };
        if target.system.trim().is_empty() {
            return Err(ActorError::EmptyName("remote system name"));
        }
        let aid = Aid::new(target.system.trim(), &name);
        let key = aid.to_string();
        let breaker = options
            .breaker
            .map(|policy| CircuitBreaker::named(format!("{key}@{}", target.endpoint), policy));
        let backing = Backing::Remote(RemoteProxy {
            address: RemoteAddress::new(target.endpoint, aid.clone()),
            breaker,
        });
        let settings = ProcessSettings {
            invoke_limit: options.sequential_invoke_limit.unwrap_or(self.shared.invoke_limit),
            request_timeout: options.request_timeout.or(self.shared.request_timeout),
            error_handler: options.error_handler,
            data: options.data,
        };
        self.get_or_register(key, aid, backing, settings)
    }

    fn get_or_register(
        &self,
        key: String,
        aid: Aid,
        backing: Backing,
        settings: ProcessSettings,
    ) -> Result<Pid, ActorError> {
        let mut processes = self.processes.write();
        if let Some(existing) = processes.get(&key) {
            if existing.backing().is_compatible(&backing) {
                return Ok(existing.pid());
            }
            return Err(ActorError::AlreadyExists {
                name: key,
                existing: format!("{}: {}", existing.kind(), existing.backing().describe()),
            });
        }
        let process = Process::spawn(aid, self.shared.clone(), backing, settings);
        let pid = process.pid();
        processes.insert(key, process);
        Ok(pid)
    }

    /// Resolves a registered name. Never creates.
    pub fn try_get(&self, name: &str) -> Option<Pid> {
        self.processes.read().get(name.trim()).map(|p| p.pid())
    }

    /// Resolves a proxy previously created with [`from_remote`](Self::from_remote).
    pub fn try_get_remote(&self, aid: &Aid) -> Option<Pid> {
        self.processes
            .read()
            .get(&aid.to_string())
            .filter(|p| matches!(p.backing(), Backing::Remote(_)))
            .map(|p| p.pid())
    }

    pub(crate) fn local_process(&self, name: &str) -> Option<Arc<Process>> {
        self.processes.read().get(name).cloned()
    }

    pub fn actor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.processes.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Connects this system to a transport. Replaces any previous binding.
    pub fn bind_remote(
        self: &Arc<Self>,
        transport: Arc<dyn RemoteTransport>,
        settings: RemoteSettings,
    ) -> Result<(), ActorError> {
        self.ensure_live()?;
        let serializer = self.serializers.get(&settings.serializer)?;
        let binding = RemoteBinding::new(
            Arc::downgrade(self),
            &self.shared,
            transport,
            settings,
            serializer,
        );
        let local = binding.local_endpoint().clone();
        let previous = self.shared.remote.write().replace(binding);
        if let Some(previous) = previous {
            previous.close();
        }
        info!(system = %self.shared.name, endpoint = %local, "Remote transport bound");
        Ok(())
    }

    /// Detaches the transport; outbound requests still waiting are canceled.
    pub fn unbind_remote(&self) -> bool {
        let previous = self.shared.remote.write().take();
        match previous {
            Some(binding) => {
                binding.close();
                info!(system = %self.shared.name, "Remote transport unbound");
                true
            }
            None => false,
        }
    }

    /// The current binding, for inspecting its pending and in-flight requests.
    pub fn remote_binding(&self) -> Option<Arc<RemoteBinding>> {
        self.shared.remote_binding()
    }

    pub fn remote_endpoint(&self) -> Option<Endpoint> {
        self.shared.remote_binding().map(|b| b.local_endpoint().clone())
    }

    /// Entry point for frames arriving from `from`. One channel per connection.
    pub fn inbound(&self, from: Endpoint) -> Result<InboundChannel, ActorError> {
        self.ensure_live()?;
        let binding = self
            .shared
            .remote_binding()
            .ok_or_else(|| ActorError::NotBound(self.shared.name.clone()))?;
        Ok(InboundChannel::new(from, binding))
    }

    /// Unbinds the transport, leaves the registry and disposes every actor.
    ///
    /// Every mailbox is closed first, so queued requests resolve `Disposed` right away. The
    /// `on_dispose` hooks then run concurrently, each bounded by the system's dispose
    /// timeout; a hook that fails, panics or waits on a stuck handler is logged and does not
    /// hold up the others.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.unbind_remote();
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.shared.name, self);
        }

        let processes: Vec<Arc<Process>> = self.processes.write().drain().map(|(_, p)| p).collect();
        for process in &processes {
            process.close();
        }
        let hooks = processes.iter().map(|process| async move {
            let outcome = AssertUnwindSafe(process.run_dispose_hook()).catch_unwind().await;
            (process, outcome)
        });
        for (process, outcome) in join_all(hooks).await {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    system = %self.shared.name,
                    actor = %process.aid().actor(),
                    error = %e,
                    "Actor dispose failed"
                ),
                Err(panic) => warn!(
                    system = %self.shared.name,
                    actor = %process.aid().actor(),
                    error = %panic_message(panic.as_ref()),
                    "Actor dispose panicked"
                ),
            }
        }
        info!(system = %self.shared.name, actors = processes.len(), "Actor system disposed");
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("name", &self.shared.name)
            .field("actors", &self.actor_names())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
