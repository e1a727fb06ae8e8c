//! # Process & Mailbox Scheduler
//!
//! One [`Process`] per registered actor name. It owns the mailbox and the drain state.
//!
//! ## Scheduling
//! Every enqueue tries to move the drain state from `Idle` to `Draining` with a
//! compare-and-set. The winner spawns one drain task on the system's tokio runtime; the
//! task delivers up to `sequential_invoke_limit` envelopes in order, stores `Idle`, and
//! re-arms itself if the mailbox is still non-empty. Losers just leave their envelope in
//! the queue. Two drains of the same process are therefore never in flight, and work
//! enqueued while a drain is finishing is always picked up.

use std::any::TypeId;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{Actor, ActorContext, ActorKind, ContextData, ErrorHandler, ReceiveFn};
use crate::address::{Aid, Pid, RemoteAddress};
use crate::breaker::CircuitBreaker;
use crate::error::ActorError;
use crate::future::FutureHandle;
use crate::message::{Envelope, Message, MessageKind};
use crate::system::SystemShared;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DrainState {
    Idle = 0,
    Draining = 1,
}

impl DrainState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DrainState::Draining,
            _ => DrainState::Idle,
        }
    }
}

/// A local handler, either an actor value or a receive function.
pub(crate) enum LocalHandler {
    Class {
        actor: tokio::sync::Mutex<Box<dyn Actor>>,
        type_id: TypeId,
        type_name: &'static str,
    },
    Function(ReceiveFn),
}

/// Stand-in for an actor living in another process.
pub(crate) struct RemoteProxy {
    pub address: RemoteAddress,
    pub breaker: Option<CircuitBreaker>,
}

/// What a process delivers its envelopes to.
pub(crate) enum Backing {
    Local(LocalHandler),
    Remote(RemoteProxy),
}

impl Backing {
    pub(crate) fn class<A: Actor>(actor: A) -> Self {
        Backing::Local(LocalHandler::Class {
            actor: tokio::sync::Mutex::new(Box::new(actor)),
            type_id: TypeId::of::<A>(),
            type_name: std::any::type_name::<A>(),
        })
    }

    pub(crate) fn kind(&self) -> ActorKind {
        match self {
            Backing::Local(LocalHandler::Class { .. }) => ActorKind::Class,
            Backing::Local(LocalHandler::Function(_)) => ActorKind::Function,
            Backing::Remote(_) => ActorKind::Remote,
        }
    }

    /// Readable description for conflict errors and logs.
    pub(crate) fn describe(&self) -> String {
        match self {
            Backing::Local(LocalHandler::Class { type_name, .. }) => type_name.to_string(),
            Backing::Local(LocalHandler::Function(_)) => "function".to_string(),
            Backing::Remote(proxy) => format!("remote {}", proxy.address),
        }
    }

    /// True when re-registering under the same name would return the existing process.
    pub(crate) fn is_compatible(&self, other: &Backing) -> bool {
        match (self, other) {
            (
                Backing::Local(LocalHandler::Class { type_id: a, .. }),
                Backing::Local(LocalHandler::Class { type_id: b, .. }),
            ) => a == b,
            (
                Backing::Local(LocalHandler::Function(a)),
                Backing::Local(LocalHandler::Function(b)),
            ) => Arc::ptr_eq(a, b),
            (Backing::Remote(a), Backing::Remote(b)) => a.address == b.address,
            _ => false,
        }
    }
}

/// Per-process settings resolved from actor and system options.
pub(crate) struct ProcessSettings {
    pub invoke_limit: usize,
    pub request_timeout: Option<Duration>,
    pub error_handler: Option<ErrorHandler>,
    pub data: ContextData,
}

/// The runtime object owning one actor's mailbox and scheduling state.
pub struct Process {
    aid: Aid,
    system: Arc<SystemShared>,
    backing: Backing,
    context: ActorContext,
    mailbox: Mutex<VecDeque<Envelope>>,
    state: AtomicU8,
    disposed: AtomicBool,
    invoke_limit: usize,
    request_timeout: Option<Duration>,
    error_handler: Option<ErrorHandler>,
}

impl Process {
    pub(crate) fn spawn(
        aid: Aid,
        system: Arc<SystemShared>,
        backing: Backing,
        settings: ProcessSettings,
    ) -> Arc<Self> {
        let process = Arc::new_cyclic(|weak: &Weak<Process>| Process {
            context: ActorContext::new(Pid::new(aid.clone(), weak.clone()), settings.data),
            aid,
            system,
            backing,
            mailbox: Mutex::new(VecDeque::new()),
            state: AtomicU8::new(DrainState::Idle as u8),
            disposed: AtomicBool::new(false),
            invoke_limit: settings.invoke_limit.max(1),
            request_timeout: settings.request_timeout,
            error_handler: settings.error_handler,
        });
        info!(
            system = %process.system.name,
            actor = %process.aid.actor(),
            kind = %process.backing.kind(),
            "Actor registered"
        );
        process
    }

    pub fn aid(&self) -> &Aid {
        &self.aid
    }

    pub fn pid(&self) -> Pid {
        self.context.pid().clone()
    }

    pub fn kind(&self) -> ActorKind {
        self.backing.kind()
    }

    pub(crate) fn backing(&self) -> &Backing {
        &self.backing
    }

    pub fn context(&self) -> &ActorContext {
        &self.context
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn drain_state(&self) -> DrainState {
        DrainState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn mailbox_len(&self) -> usize {
        self.mailbox.lock().len()
    }

    pub fn sequential_invoke_limit(&self) -> usize {
        self.invoke_limit
    }

    /// Enqueues a fire-and-forget message. `Ok` means enqueued, not processed.
    pub fn send(self: &Arc<Self>, message: Message) -> Result<(), ActorError> {
        let timeout = message.timeout;
        let envelope = Envelope::from_message(
            message,
            MessageKind::Default,
            self.system.ids.next(),
            timeout,
            Arc::default(),
            None,
        );
        self.enqueue(envelope)
    }

    /// Enqueues a request and returns its completion handle.
    ///
    /// The message's own timeout wins over the actor's request timeout.
    pub fn request(self: &Arc<Self>, message: Message) -> Result<FutureHandle, ActorError> {
        let id = self.system.ids.next();
        let timeout = message.timeout.or(self.request_timeout);
        let expired = Arc::new(AtomicBool::new(false));
        let future = FutureHandle::new(id, self.aid.clone(), expired.clone());
        let envelope = Envelope::from_message(
            message,
            MessageKind::FutureRequest,
            id,
            timeout,
            expired,
            Some(future.clone()),
        );
        self.enqueue(envelope)?;
        if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
            future.arm_timeout(timeout, &self.system.runtime);
        }
        Ok(future)
    }

    /// Enqueues an already built envelope, e.g. one decoded from the wire.
    pub(crate) fn enqueue(self: &Arc<Self>, envelope: Envelope) -> Result<(), ActorError> {
        {
            let mut mailbox = self.mailbox.lock();
            if self.is_disposed() {
                return Err(ActorError::ProcessUnavailable(self.aid.to_string()));
            }
            mailbox.push_back(envelope);
        }
        self.schedule();
        Ok(())
    }

    fn schedule(self: &Arc<Self>) {
        let won = self
            .state
            .compare_exchange(
                DrainState::Idle as u8,
                DrainState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            let process = self.clone();
            self.system.runtime.spawn(async move { process.drain().await });
        }
    }

    async fn drain(self: Arc<Self>) {
        let mut processed = 0;
        while processed < self.invoke_limit && !self.is_disposed() {
            let next = self.mailbox.lock().pop_front();
            let Some(envelope) = next else { break };
            processed += 1;
            if !self.invoke(envelope).await {
                break;
            }
        }

        self.state.store(DrainState::Idle as u8, Ordering::Release);
        let has_work = !self.mailbox.lock().is_empty();
        if has_work && !self.is_disposed() {
            self.schedule();
        }
    }

    /// Delivers one envelope. Returns `false` when the rest of the batch must wait for the
    /// next turn.
    async fn invoke(&self, envelope: Envelope) -> bool {
        if envelope.expired() {
            self.skip_expired(&envelope);
            return true;
        }
        match &self.backing {
            Backing::Local(handler) => self.invoke_local(handler, envelope).await,
            Backing::Remote(proxy) => {
                self.forward(proxy, envelope).await;
                true
            }
        }
    }

    fn skip_expired(&self, envelope: &Envelope) {
        match envelope.future() {
            Some(future) if envelope.kind() == MessageKind::FutureRequest => {
                future.expire();
                warn!(
                    system = %self.system.name,
                    actor = %self.aid.actor(),
                    id = %envelope.id(),
                    "Request expired before delivery"
                );
            }
            _ => debug!(
                system = %self.system.name,
                actor = %self.aid.actor(),
                id = %envelope.id(),
                "Dropped expired message"
            ),
        }
    }

    async fn invoke_local(&self, handler: &LocalHandler, envelope: Envelope) -> bool {
        debug!(
            system = %self.system.name,
            actor = %self.aid.actor(),
            id = %envelope.id(),
            kind = ?envelope.kind(),
            "Receive"
        );
        let call = async {
            match handler {
                LocalHandler::Class { actor, .. } => {
                    let mut actor = actor.lock().await;
                    actor.receive(&self.context, envelope.clone()).await
                }
                LocalHandler::Function(f) => f(self.context.clone(), envelope.clone()).await,
            }
        };
        let result = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ActorError::HandlerPanic(panic_message(panic.as_ref()))),
        };

        match result {
            Ok(()) => {
                if envelope.kind() == MessageKind::FutureRequest {
                    if let Some(future) = envelope.future() {
                        future.respond(Envelope::empty_reply(self.aid.clone(), envelope.id()));
                    }
                }
                true
            }
            Err(e) => {
                warn!(
                    system = %self.system.name,
                    actor = %self.aid.actor(),
                    id = %envelope.id(),
                    error = %e,
                    "Handler failed"
                );
                if let Some(future) = envelope.future() {
                    future.respond_with_error(e.to_future_error());
                }
                self.report(&e, Some(&envelope));
                false
            }
        }
    }

    async fn forward(&self, proxy: &RemoteProxy, envelope: Envelope) {
        let result = match self.system.remote_binding() {
            Some(binding) => binding.forward(proxy, &envelope).await,
            None => Err(ActorError::NotBound(self.system.name.clone())),
        };
        if let Err(e) = result {
            warn!(
                system = %self.system.name,
                actor = %self.aid.actor(),
                to = %proxy.address,
                id = %envelope.id(),
                error = %e,
                "Forward failed"
            );
            if let Some(future) = envelope.future() {
                future.respond_with_error(e.to_future_error());
            }
            self.report(&e, Some(&envelope));
        }
    }

    /// Hands `error` to the process handler, then the system handler. A panicking handler
    /// is logged and otherwise ignored.
    pub(crate) fn report(&self, error: &ActorError, envelope: Option<&Envelope>) {
        let handlers = [self.error_handler.as_ref(), self.system.error_handler.as_ref()];
        for handler in handlers.into_iter().flatten() {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(error, envelope)));
            if outcome.is_err() {
                error!(
                    system = %self.system.name,
                    actor = %self.aid.actor(),
                    "Error handler panicked"
                );
            }
        }
    }

    /// Closes the mailbox and cancels queued requests. Later sends fail. Never waits on the
    /// handler.
    pub(crate) fn close(&self) {
        let pending = {
            let mut mailbox = self.mailbox.lock();
            if self.disposed.swap(true, Ordering::AcqRel) {
                return;
            }
            std::mem::take(&mut *mailbox)
        };
        let canceled = pending
            .iter()
            .filter_map(Envelope::future)
            .filter(|future| future.dispose())
            .count();
        info!(
            system = %self.system.name,
            actor = %self.aid.actor(),
            dropped = pending.len(),
            canceled,
            "Actor disposed"
        );
    }

    /// Runs the actor's `on_dispose` hook once the running handler, if any, has returned.
    /// Gives up after the system's dispose timeout.
    pub(crate) async fn run_dispose_hook(&self) -> Result<(), ActorError> {
        let Backing::Local(LocalHandler::Class { actor, .. }) = &self.backing else {
            return Ok(());
        };
        let hook = async { actor.lock().await.on_dispose(&self.context).await };
        match tokio::time::timeout(self.system.dispose_timeout, hook).await {
            Ok(result) => result,
            Err(_) => Err(ActorError::DisposeTimedOut(self.aid.to_string())),
        }
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("aid", &self.aid)
            .field("kind", &self.kind())
            .field("state", &self.drain_state())
            .field("mailbox", &self.mailbox_len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
