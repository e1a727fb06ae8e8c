//! # Remote Binding
//!
//! Joins an [`ActorSystem`] to a [`RemoteTransport`].
//!
//! Outbound, remote proxies hand each dequeued envelope to [`RemoteBinding::forward`]: the
//! envelope is framed, requests are parked in the pending table by id, and the frame is sent
//! (through the proxy's breaker when it has one). If a parked request is canceled or times
//! out locally a cancel frame follows it.
//!
//! Inbound, [`RemoteBinding::dispatch`] routes decoded frames: plain messages to the local
//! actor, requests to the local actor behind a fresh future whose completion sends the
//! response frame back, responses to the parked request, cancel frames to the in-flight
//! request.
//!
//! Sends triggered from completions are spawned, so no table lock is ever held across I/O.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::{RemoteSettings, RemoteTransport, TransportError};
use crate::address::{Aid, Endpoint, RemoteAddress};
use crate::breaker::CallOutcome;
use crate::error::ActorError;
use crate::future::{FutureHandle, FutureOutcome, FutureStatus};
use crate::message::{Envelope, FutureState, MessageKind};
use crate::process::{ErrorHandler, Process, RemoteProxy};
use crate::system::{ActorSystem, SystemShared};
use crate::wire::{DataType, MessageId, Serializer, WireMessage};

struct PendingRequest {
    future: FutureHandle,
    to: RemoteAddress,
    from: Aid,
}

/// Per-system remote state. Created by [`ActorSystem::bind_remote`].
pub struct RemoteBinding {
    system: Weak<ActorSystem>,
    system_name: String,
    settings: RemoteSettings,
    runtime: Handle,
    error_handler: Option<ErrorHandler>,
    transport: Arc<dyn RemoteTransport>,
    serializer: Arc<dyn Serializer>,
    pending: Mutex<HashMap<MessageId, PendingRequest>>,
    inflight: Mutex<HashMap<(Endpoint, MessageId), FutureHandle>>,
    closed: AtomicBool,
}

impl RemoteBinding {
    pub(crate) fn new(
        system: Weak<ActorSystem>,
        shared: &SystemShared,
        transport: Arc<dyn RemoteTransport>,
        settings: RemoteSettings,
        serializer: Arc<dyn Serializer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            system,
            system_name: shared.name.clone(),
            settings,
            runtime: shared.runtime.clone(),
            error_handler: shared.error_handler.clone(),
            transport,
            serializer,
            pending: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_endpoint(&self) -> &Endpoint {
        &self.settings.local_endpoint
    }

    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Outbound requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Inbound requests whose response has not been sent yet.
    pub fn inflight_requests(&self) -> usize {
        self.inflight.lock().len()
    }

    /// Frames `envelope` for the proxy's remote actor and sends it.
    pub(crate) async fn forward(self: &Arc<Self>, proxy: &RemoteProxy, envelope: &Envelope) -> Result<(), ActorError> {
        if self.is_closed() {
            return Err(ActorError::NotBound(self.system_name.clone()));
        }
        let request = match envelope.future() {
            Some(future) if envelope.kind() == MessageKind::FutureRequest => {
                if future.is_terminal() {
                    // Canceled while queued; nothing to ask for.
                    return Ok(());
                }
                Some(future.clone())
            }
            _ => None,
        };

        let to = proxy.address.clone();
        let frame = WireMessage::from_envelope(envelope, to.clone()).encode(self.serializer())?;
        let id = envelope.id();
        if let Some(future) = &request {
            self.pending.lock().insert(
                id,
                PendingRequest {
                    future: future.clone(),
                    to: to.clone(),
                    from: envelope.from().clone(),
                },
            );
            let binding = Arc::downgrade(self);
            future.on_complete(move |status, outcome| {
                if let Some(binding) = binding.upgrade() {
                    binding.on_outbound_complete(id, status, outcome);
                }
            });
        }

        debug!(system = %self.system_name, %to, %id, kind = ?envelope.kind(), "Forward");
        let sent = self.send_frame(to.endpoint(), frame, proxy).await;
        if sent.is_err() {
            self.pending.lock().remove(&id);
        }
        sent.map_err(ActorError::from)
    }

    async fn send_frame(&self, endpoint: &Endpoint, frame: Bytes, proxy: &RemoteProxy) -> Result<(), TransportError> {
        match &proxy.breaker {
            Some(breaker) => {
                match breaker
                    .execute_async(|| self.transport.send(endpoint, frame))
                    .await
                {
                    CallOutcome::Success(()) => Ok(()),
                    CallOutcome::CircuitOpen => Err(TransportError::CircuitOpen(endpoint.to_string())),
                    CallOutcome::Failure(e) => Err(e),
                }
            }
            None => self.transport.send(endpoint, frame).await,
        }
    }

    /// Still parked means no response arrived: tell the other side to stop.
    fn on_outbound_complete(&self, id: MessageId, status: FutureStatus, outcome: &FutureOutcome) {
        let Some(pending) = self.pending.lock().remove(&id) else {
            return;
        };
        if status != FutureStatus::Canceled || self.is_closed() {
            return;
        }
        if let Err(e) = outcome {
            debug!(system = %self.system_name, to = %pending.to, %id, reason = %e, "Sending cancel");
        }
        let message = WireMessage::cancel(id, pending.to.clone(), pending.from);
        self.spawn_send(pending.to.endpoint().clone(), message);
    }

    /// Routes one decoded frame received from `from`.
    pub(crate) fn dispatch(self: &Arc<Self>, from: &Endpoint, message: WireMessage) {
        if self.is_closed() {
            debug!(system = %self.system_name, %from, id = %message.id(), "Binding closed, frame dropped");
            return;
        }
        match message.data_type() {
            DataType::Empty => {}
            DataType::Cancel => {
                let canceled = self.inflight.lock().remove(&(from.clone(), message.id()));
                if let Some(future) = canceled {
                    debug!(system = %self.system_name, %from, id = %message.id(), "Remote cancel");
                    future.cancel();
                }
            }
            DataType::Envelope => match message.kind() {
                MessageKind::Default => self.deliver(from, message),
                MessageKind::FutureRequest => self.handle_request(from, message),
                MessageKind::FutureResponse | MessageKind::FutureError => self.complete_pending(message),
            },
        }
    }

    fn target(&self, message: &WireMessage) -> Result<Arc<Process>, ActorError> {
        let body = message
            .body()
            .ok_or_else(|| ActorError::InvalidConfig(format!("frame {} has no body", message.id())))?;
        let actor = body.to.actor();
        if actor.system() != self.system_name {
            return Err(ActorError::NotFound(format!(
                "{actor} is not hosted by system {}",
                self.system_name
            )));
        }
        let system = self
            .system
            .upgrade()
            .ok_or_else(|| ActorError::SystemDisposed(self.system_name.clone()))?;
        system
            .local_process(actor.actor())
            .ok_or_else(|| ActorError::NotFound(actor.to_string()))
    }

    fn deliver(&self, from: &Endpoint, message: WireMessage) {
        let id = message.id();
        let delivered = self
            .target(&message)
            .and_then(|process| process.enqueue(message.into_envelope()));
        if let Err(e) = delivered {
            warn!(system = %self.system_name, %from, %id, error = %e, "Inbound message dropped");
            self.report(&e);
        }
    }

    fn handle_request(self: &Arc<Self>, from: &Endpoint, message: WireMessage) {
        let id = message.id();
        let Some(body) = message.body() else {
            return;
        };
        let reply_to = RemoteAddress::new(from.clone(), body.from.clone());
        let responder = body.to.actor().clone();
        let timeout = message.timeout();

        let expired = Arc::new(AtomicBool::new(false));
        let future = FutureHandle::new(id, responder.clone(), expired.clone());
        let key = (from.clone(), id);
        self.inflight.lock().insert(key.clone(), future.clone());
        let binding = Arc::downgrade(self);
        future.on_complete(move |_, outcome| {
            if let Some(binding) = binding.upgrade() {
                binding.respond_remote(key, reply_to, responder, outcome);
            }
        });

        let process = match self.target(&message) {
            Ok(process) => process,
            Err(e) => {
                warn!(system = %self.system_name, %from, %id, error = %e, "Inbound request rejected");
                future.respond_with_error(e.to_future_error());
                return;
            }
        };
        if let Err(e) = process.enqueue(message.into_request_envelope(future.clone(), expired)) {
            future.respond_with_error(e.to_future_error());
            return;
        }
        if let Some(timeout) = timeout {
            future.arm_timeout(timeout, &self.runtime);
        }
    }

    fn respond_remote(
        &self,
        key: (Endpoint, MessageId),
        reply_to: RemoteAddress,
        responder: Aid,
        outcome: &FutureOutcome,
    ) {
        // Gone from the table means the requester already canceled.
        if self.inflight.lock().remove(&key).is_none() || self.is_closed() {
            return;
        }
        let message = WireMessage::response(key.1, reply_to.clone(), responder, outcome);
        self.spawn_send(reply_to.endpoint().clone(), message);
    }

    fn complete_pending(&self, message: WireMessage) {
        let id = message.id();
        let pending = self.pending.lock().remove(&id);
        let Some(pending) = pending else {
            debug!(system = %self.system_name, %id, "Response for unknown request ignored");
            return;
        };
        let state = message.header().state;
        if state.contains(FutureState::CANCELED) {
            pending.future.cancel_with(message.remote_error());
        } else if message.kind() == MessageKind::FutureError {
            pending.future.respond_with_error(message.remote_error());
        } else {
            pending.future.respond(message.into_envelope());
        }
    }

    fn spawn_send(&self, endpoint: Endpoint, message: WireMessage) {
        let frame = match message.encode(self.serializer()) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(system = %self.system_name, %endpoint, id = %message.id(), error = %e, "Encode failed");
                self.report(&ActorError::from(e));
                return;
            }
        };
        let transport = self.transport.clone();
        let system = self.system_name.clone();
        let id = message.id();
        self.runtime.spawn(async move {
            if let Err(e) = transport.send(&endpoint, frame).await {
                warn!(%system, %endpoint, %id, error = %e, "Send failed");
            }
        });
    }

    pub(crate) fn report(&self, error: &ActorError) {
        if let Some(handler) = &self.error_handler {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(error, None)));
            if outcome.is_err() {
                tracing::error!(system = %self.system_name, "Error handler panicked");
            }
        }
    }

    /// Stops dispatching and cancels everything still tracked.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let pending: Vec<PendingRequest> = self.pending.lock().drain().map(|(_, p)| p).collect();
        let inflight: Vec<FutureHandle> = self.inflight.lock().drain().map(|(_, f)| f).collect();
        for request in pending {
            request.future.dispose();
        }
        for future in inflight {
            future.dispose();
        }
    }
}

impl fmt::Debug for RemoteBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBinding")
            .field("system", &self.system_name)
            .field("local_endpoint", &self.settings.local_endpoint)
            .field("pending", &self.pending_requests())
            .field("inflight", &self.inflight_requests())
            .field("closed", &self.is_closed())
            .finish()
    }
}
