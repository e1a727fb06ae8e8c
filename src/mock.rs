//! # Mock Transport
//!
//! A [`RemoteTransport`] for testing remote proxies without a peer.
//!
//! Queue expected sends with [`MockTransport::expect_send`], run the code under test, then
//! inspect what was sent and call [`MockTransport::verify`].

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::address::Endpoint;
use crate::remote::{RemoteTransport, TransportError};
use crate::wire::{FrameReader, JsonSerializer, WireMessage};

struct Expectation {
    endpoint: Option<Endpoint>,
    response: Result<(), TransportError>,
}

#[derive(Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    sent: Vec<(Endpoint, Bytes)>,
    unexpected: Vec<String>,
    accept_all: bool,
}

/// A transport that answers sends from a queue of expectations.
///
/// Sends with no matching expectation fail with [`TransportError::Protocol`] and are
/// remembered, so [`verify`](Self::verify) can report them; the send itself never panics,
/// since it runs inside an actor's drain.
///
/// # Example
/// ```ignore
/// let mock = MockTransport::new();
/// mock.expect_send().to(endpoint.clone()).return_ok();
/// mock.expect_send().return_err(TransportError::Unreachable("peer".into()));
///
/// system.bind_remote(Arc::new(mock.clone()), RemoteSettings::new(local))?;
/// // Use the proxy in tests...
/// mock.verify(); // Ensures all expectations were met
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a mock with no expectations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock that accepts every send once its expectations are used up.
    pub fn accepting() -> Self {
        let mock = Self::default();
        mock.state.lock().accept_all = true;
        mock
    }

    /// Expects one more send.
    pub fn expect_send(&self) -> SendExpectationBuilder {
        SendExpectationBuilder {
            endpoint: None,
            state: self.state.clone(),
        }
    }

    /// Every frame sent so far, in order.
    pub fn sent_frames(&self) -> Vec<(Endpoint, Bytes)> {
        self.state.lock().sent.clone()
    }

    /// Sent frames decoded with the default serializer.
    pub fn sent_messages(&self) -> Vec<(Endpoint, WireMessage)> {
        self.sent_frames()
            .into_iter()
            .flat_map(|(endpoint, frame)| {
                let mut reader = FrameReader::new();
                reader.push(&frame);
                reader
                    .drain()
                    .into_iter()
                    .filter_map(|f| f.and_then(|f| f.decode(&JsonSerializer)).ok())
                    .map(move |m| (endpoint.clone(), m))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn remaining_expectations(&self) -> usize {
        self.state.lock().expectations.len()
    }

    /// Panics if an expectation was not met or an unexpected send happened.
    pub fn verify(&self) {
        let state = self.state.lock();
        if !state.unexpected.is_empty() {
            panic!("Unexpected sends: {:?}", state.unexpected);
        }
        if !state.expectations.is_empty() {
            panic!("Not all expectations were met. {} remaining", state.expectations.len());
        }
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn send(&self, endpoint: &Endpoint, frame: Bytes) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.sent.push((endpoint.clone(), frame));
        match state.expectations.pop_front() {
            Some(Expectation { endpoint: Some(expected), .. }) if &expected != endpoint => {
                let problem = format!("expected send to {expected}, got {endpoint}");
                state.unexpected.push(problem.clone());
                Err(TransportError::Protocol(problem))
            }
            Some(expectation) => expectation.response,
            None if state.accept_all => Ok(()),
            None => {
                let problem = format!("unexpected send to {endpoint}");
                state.unexpected.push(problem.clone());
                Err(TransportError::Protocol(problem))
            }
        }
    }
}

/// Builder for send expectations.
pub struct SendExpectationBuilder {
    endpoint: Option<Endpoint>,
    state: Arc<Mutex<MockState>>,
}

impl SendExpectationBuilder {
    /// Only a send to `endpoint` satisfies this expectation.
    pub fn to(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the expectation to succeed.
    pub fn return_ok(self) {
        self.push(Ok(()));
    }

    /// Sets the expectation to fail with `error`.
    pub fn return_err(self, error: TransportError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<(), TransportError>) {
        self.state.lock().expectations.push_back(Expectation {
            endpoint: self.endpoint,
            response,
        });
    }
}
