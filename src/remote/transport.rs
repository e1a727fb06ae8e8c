use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::address::Endpoint;
use crate::wire::DEFAULT_SERIALIZER;

/// Delivery failures reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
    #[error("circuit open for {0}")]
    CircuitOpen(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// The byte-moving collaborator behind a [`RemoteBinding`](super::RemoteBinding).
///
/// Implementations deliver each frame over a persistent connection to `endpoint`,
/// reconnecting as needed, and feed bytes they receive into
/// [`ActorSystem::inbound`](crate::system::ActorSystem::inbound).
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn send(&self, endpoint: &Endpoint, frame: Bytes) -> Result<(), TransportError>;
}

/// How a system presents itself on the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// The address peers use to reach this system.
    pub local_endpoint: Endpoint,
    /// Key into the [`SerializerRegistry`](crate::wire::SerializerRegistry).
    #[serde(default = "default_serializer")]
    pub serializer: String,
}

fn default_serializer() -> String {
    DEFAULT_SERIALIZER.to_string()
}

impl RemoteSettings {
    pub fn new(local_endpoint: Endpoint) -> Self {
        Self {
            local_endpoint,
            serializer: default_serializer(),
        }
    }

    pub fn with_serializer(mut self, key: impl Into<String>) -> Self {
        self.serializer = key.into();
        self
    }
}
