//! # Futures
//!
//! A [`FutureHandle`] is the single-assignment completion slot behind every request.
//!
//! Exactly one of `respond`, `respond_with_error`, `cancel`, expiry, disposal or the timeout
//! timer wins the `Pending` slot through a compare-and-set; every later attempt is a no-op
//! that returns `false`. Waiters, completion callbacks and the timeout event all observe the
//! winner's outcome.

use std::fmt;
use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::address::Aid;
use crate::error::FutureError;
use crate::message::Envelope;
use crate::wire::MessageId;

/// What a finished future resolved to.
pub type FutureOutcome = Result<Envelope, FutureError>;

type CompletionCallback = Box<dyn FnOnce(FutureStatus, &FutureOutcome) + Send>;
type TimeoutCallback = Box<dyn FnOnce(FutureStatus) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FutureStatus {
    Pending = 0,
    Completed = 1,
    Canceled = 2,
    Faulted = 3,
}

impl FutureStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => FutureStatus::Completed,
            2 => FutureStatus::Canceled,
            3 => FutureStatus::Faulted,
            _ => FutureStatus::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != FutureStatus::Pending
    }
}

/// Completion handle for one request. Clones share the slot.
#[derive(Clone)]
pub struct FutureHandle {
    inner: Arc<FutureInner>,
}

struct FutureInner {
    id: MessageId,
    target: Aid,
    status: AtomicU8,
    outcome: watch::Sender<Option<FutureOutcome>>,
    request_expired: Arc<AtomicBool>,
    timer: Mutex<Option<JoinHandle<()>>>,
    on_complete: Mutex<Vec<CompletionCallback>>,
    on_timeout: Mutex<Vec<TimeoutCallback>>,
    timed_out: AtomicBool,
}

impl FutureHandle {
    /// `request_expired` is the sticky expiry flag of the request envelope.
    pub(crate) fn new(id: MessageId, target: Aid, request_expired: Arc<AtomicBool>) -> Self {
        let (outcome, _) = watch::channel(None);
        Self {
            inner: Arc::new(FutureInner {
                id,
                target,
                status: AtomicU8::new(FutureStatus::Pending as u8),
                outcome,
                request_expired,
                timer: Mutex::new(None),
                on_complete: Mutex::new(Vec::new()),
                on_timeout: Mutex::new(Vec::new()),
                timed_out: AtomicBool::new(false),
            }),
        }
    }

    /// A standalone handle, useful for completing work outside any actor.
    pub fn detached(id: MessageId, target: Aid) -> Self {
        Self::new(id, target, Arc::default())
    }

    pub fn id(&self) -> MessageId {
        self.inner.id
    }

    /// The actor the request was addressed to.
    pub fn target(&self) -> &Aid {
        &self.inner.target
    }

    pub fn status(&self) -> FutureStatus {
        FutureStatus::from_u8(self.inner.status.load(Ordering::Acquire))
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// True when the timeout timer fired.
    pub fn timed_out(&self) -> bool {
        self.inner.timed_out.load(Ordering::Acquire)
    }

    /// The outcome, if already resolved.
    pub fn try_result(&self) -> Option<FutureOutcome> {
        self.inner.outcome.borrow().clone()
    }

    pub fn respond(&self, response: Envelope) -> bool {
        self.complete(FutureStatus::Completed, Ok(response))
    }

    pub fn respond_with_error(&self, error: FutureError) -> bool {
        self.complete(FutureStatus::Faulted, Err(error))
    }

    /// Cooperative cancellation: a running handler is not interrupted.
    pub fn cancel(&self) -> bool {
        self.complete(FutureStatus::Canceled, Err(FutureError::Canceled))
    }

    pub(crate) fn cancel_with(&self, error: FutureError) -> bool {
        self.complete(FutureStatus::Canceled, Err(error))
    }

    pub(crate) fn expire(&self) -> bool {
        self.cancel_with(FutureError::Expired)
    }

    pub(crate) fn dispose(&self) -> bool {
        self.cancel_with(FutureError::Disposed)
    }

    fn complete(&self, status: FutureStatus, outcome: FutureOutcome) -> bool {
        let won = self
            .inner
            .status
            .compare_exchange(
                FutureStatus::Pending as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !won {
            return false;
        }
        if let Some(timer) = self.inner.timer.lock().take() {
            timer.abort();
        }

        // Publishing under the callback lock orders late registrations after the outcome.
        let callbacks = {
            let mut callbacks = self.inner.on_complete.lock();
            self.inner.outcome.send_replace(Some(outcome.clone()));
            std::mem::take(&mut *callbacks)
        };
        debug!(id = %self.inner.id, target = %self.inner.target, ?status, "Future resolved");
        for callback in callbacks {
            callback(status, &outcome);
        }
        true
    }

    /// Runs `callback` once the handle is terminal, immediately if it already is.
    pub fn on_complete(&self, callback: impl FnOnce(FutureStatus, &FutureOutcome) + Send + 'static) {
        let ready = {
            let mut callbacks = self.inner.on_complete.lock();
            match self.inner.outcome.borrow().clone() {
                Some(outcome) => Some(outcome),
                None => {
                    callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        if let Some(outcome) = ready {
            callback(self.status(), &outcome);
        }
    }

    /// Runs `callback` with the final status when the timeout timer fires.
    pub fn on_timeout(&self, callback: impl FnOnce(FutureStatus) + Send + 'static) {
        self.inner.on_timeout.lock().push(Box::new(callback));
    }

    /// Starts the timeout timer on `runtime`. The timer holds only a weak reference.
    pub(crate) fn arm_timeout(&self, timeout: Duration, runtime: &Handle) {
        if self.is_terminal() {
            return;
        }
        let weak: Weak<FutureInner> = Arc::downgrade(&self.inner);
        let timer = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                FutureHandle { inner }.do_timed_out();
            }
        });
        let mut slot = self.inner.timer.lock();
        if self.is_terminal() {
            timer.abort();
        } else {
            *slot = Some(timer);
        }
    }

    /// Expires the request, cancels the handle if still pending and raises the timeout
    /// event once with the final status.
    pub(crate) fn do_timed_out(&self) {
        if self.inner.timed_out.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.request_expired.store(true, Ordering::Release);
        // Drop our own JoinHandle first so `complete` does not abort the running timer.
        drop(self.inner.timer.lock().take());
        self.cancel_with(FutureError::TimedOut);

        let status = self.status();
        debug!(id = %self.inner.id, target = %self.inner.target, ?status, "Future timed out");
        let callbacks = std::mem::take(&mut *self.inner.on_timeout.lock());
        for callback in callbacks {
            callback(status);
        }
    }

    /// Waits for the outcome.
    pub async fn result(&self) -> FutureOutcome {
        let mut rx = self.inner.outcome.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(FutureError::Disposed))
    }

    /// Waits at most `timeout` without resolving the handle.
    pub async fn result_within(&self, timeout: Duration) -> Option<FutureOutcome> {
        tokio::time::timeout(timeout, self.result()).await.ok()
    }
}

impl IntoFuture for FutureHandle {
    type Output = FutureOutcome;
    type IntoFuture = BoxFuture<'static, FutureOutcome>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.result().await })
    }
}

impl fmt::Debug for FutureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FutureHandle")
            .field("id", &self.inner.id)
            .field("target", &self.inner.target)
            .field("status", &self.status())
            .finish()
    }
}
