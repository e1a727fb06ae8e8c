use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::{InboundChannel, RemoteSettings, RemoteTransport, TransportError};
use crate::address::Endpoint;
use crate::error::ActorError;
use crate::system::ActorSystem;

type Link = Arc<Mutex<InboundChannel>>;

/// In-process network connecting actor systems by endpoint.
///
/// Each attached system gets a transport that writes frames straight into the target
/// system's inbound channel, one channel per (sender, receiver) pair, the way a persistent
/// connection would. With [`with_chunk_size`](Self::with_chunk_size) frames are delivered in
/// pieces to exercise the incremental parser.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

#[derive(Default)]
struct NetworkInner {
    nodes: RwLock<HashMap<Endpoint, Weak<ActorSystem>>>,
    links: Mutex<HashMap<(Endpoint, Endpoint), Link>>,
    chunk_size: Option<usize>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits every frame into chunks of at most `size` bytes.
    pub fn with_chunk_size(size: usize) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                chunk_size: Some(size.max(1)),
                ..Default::default()
            }),
        }
    }

    /// Binds `system` to this network at `endpoint`.
    pub fn attach(&self, system: &Arc<ActorSystem>, endpoint: Endpoint) -> Result<(), ActorError> {
        let transport = LoopbackTransport {
            local: endpoint.clone(),
            network: Arc::downgrade(&self.inner),
        };
        system.bind_remote(Arc::new(transport), RemoteSettings::new(endpoint.clone()))?;
        self.inner.drop_links(&endpoint);
        self.inner
            .nodes
            .write()
            .insert(endpoint.clone(), Arc::downgrade(system));
        info!(system = %system.name(), %endpoint, "Attached to loopback network");
        Ok(())
    }

    /// Takes `endpoint` off the network. Frames sent to it afterwards fail as unreachable.
    pub fn detach(&self, endpoint: &Endpoint) -> bool {
        let removed = self.inner.nodes.write().remove(endpoint).is_some();
        self.inner.drop_links(endpoint);
        removed
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.inner.nodes.read().keys().cloned().collect()
    }
}

impl NetworkInner {
    fn drop_links(&self, endpoint: &Endpoint) {
        self.links
            .lock()
            .retain(|(from, to), _| from != endpoint && to != endpoint);
    }

    fn link(&self, from: &Endpoint, to: &Endpoint) -> Result<Link, TransportError> {
        let key = (from.clone(), to.clone());
        let existing = self.links.lock().get(&key).cloned();
        if let Some(link) = existing {
            if !link.lock().is_closed() {
                return Ok(link);
            }
        }

        let system = self
            .nodes
            .read()
            .get(to)
            .and_then(Weak::upgrade)
            .ok_or_else(|| TransportError::Unreachable(to.to_string()))?;
        let channel = system
            .inbound(from.clone())
            .map_err(|e| TransportError::Unreachable(format!("{to}: {e}")))?;
        let link = Arc::new(Mutex::new(channel));
        self.links.lock().insert(key, link.clone());
        debug!(%from, %to, "Loopback link opened");
        Ok(link)
    }

    fn deliver(&self, from: &Endpoint, to: &Endpoint, frame: &[u8]) -> Result<(), TransportError> {
        let link = self.link(from, to)?;
        let mut channel = link.lock();
        let chunk_size = self.chunk_size.unwrap_or(frame.len().max(1));
        for chunk in frame.chunks(chunk_size) {
            if let Err(e) = channel.receive(chunk) {
                drop(channel);
                self.links.lock().remove(&(from.clone(), to.clone()));
                return Err(TransportError::Protocol(e.to_string()));
            }
        }
        Ok(())
    }
}

struct LoopbackTransport {
    local: Endpoint,
    network: Weak<NetworkInner>,
}

#[async_trait]
impl RemoteTransport for LoopbackTransport {
    async fn send(&self, endpoint: &Endpoint, frame: Bytes) -> Result<(), TransportError> {
        let network = self
            .network
            .upgrade()
            .ok_or_else(|| TransportError::ConnectionClosed("loopback network dropped".to_string()))?;
        network.deliver(&self.local, endpoint, &frame)
    }
}

impl std::fmt::Debug for LoopbackNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackNetwork")
            .field("endpoints", &self.endpoints())
            .field("chunk_size", &self.inner.chunk_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::message::Message;
    use crate::system::{ActorOptions, ActorSystemOptions, SystemRegistry};

    #[tokio::test]
    async fn test_unreachable_endpoint_faults_request() {
        let registry = SystemRegistry::new();
        let network = LoopbackNetwork::new();
        let local = registry.get_or_add(ActorSystemOptions::new("near")).unwrap();
        network.attach(&local, Endpoint::new("near", 1).unwrap()).unwrap();

        let proxy = local
            .from(ActorOptions::new("echo").remote("far", Endpoint::new("far", 2).unwrap()))
            .unwrap();
        let future = proxy
            .request(Message::new("hi").with_timeout(Duration::from_secs(5)))
            .unwrap();
        let err = future.await.unwrap_err();
        assert!(err.to_string().contains("unreachable"), "{err}");
    }

    #[tokio::test]
    async fn test_detach_removes_node() {
        let registry = SystemRegistry::new();
        let network = LoopbackNetwork::new();
        let system = registry.get_or_add(ActorSystemOptions::new("solo")).unwrap();
        let endpoint = Endpoint::new("solo", 1).unwrap();
        network.attach(&system, endpoint.clone()).unwrap();
        assert_eq!(network.endpoints(), vec![endpoint.clone()]);
        assert!(network.detach(&endpoint));
        assert!(!network.detach(&endpoint));
        assert!(network.endpoints().is_empty());
    }
}
