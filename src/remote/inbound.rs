use std::sync::Arc;

use tracing::warn;

use super::RemoteBinding;
use crate::address::Endpoint;
use crate::error::ActorError;
use crate::wire::{FrameReader, WireError};

/// Receiving side of one connection: buffers raw chunks, cuts frames and hands them to the
/// system's [`RemoteBinding`].
///
/// Obtained from [`ActorSystem::inbound`](crate::system::ActorSystem::inbound).
#[derive(Debug)]
pub struct InboundChannel {
    from: Endpoint,
    binding: Arc<RemoteBinding>,
    reader: FrameReader,
}

impl InboundChannel {
    pub(crate) fn new(from: Endpoint, binding: Arc<RemoteBinding>) -> Self {
        Self {
            from,
            binding,
            reader: FrameReader::new(),
        }
    }

    /// The peer this channel reads from.
    pub fn peer(&self) -> &Endpoint {
        &self.from
    }

    /// True once the system this channel feeds has been unbound or disposed.
    pub fn is_closed(&self) -> bool {
        self.binding.is_closed()
    }

    /// Bytes buffered towards an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.reader.buffered().len()
    }

    /// Feeds a chunk and dispatches every frame it completes. Returns how many were
    /// dispatched.
    ///
    /// A malformed frame is logged, reported to the system error handler and skipped. A
    /// [fatal](WireError::is_fatal) error means the stream cannot be resynchronized; the
    /// caller should drop the connection.
    pub fn receive(&mut self, chunk: &[u8]) -> Result<usize, WireError> {
        self.reader.push(chunk);
        let mut dispatched = 0;
        for frame in self.reader.drain() {
            let decoded = frame.and_then(|frame| frame.decode(self.binding.serializer()));
            match decoded {
                Ok(message) => {
                    self.binding.dispatch(&self.from, message);
                    dispatched += 1;
                }
                Err(e) if e.is_fatal() => {
                    warn!(peer = %self.from, error = %e, "Inbound stream corrupt");
                    return Err(e);
                }
                Err(e) => {
                    warn!(peer = %self.from, error = %e, "Skipping malformed frame");
                    self.binding.report(&ActorError::from(e));
                }
            }
        }
        Ok(dispatched)
    }
}
