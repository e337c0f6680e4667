//! Channel-backed transport
//!
//! [`ChannelTransport`] forwards each command to a worker that owns the real
//! card session, possibly on another thread, and awaits exactly one reply.
//! When the worker goes away the pending await resolves to
//! [`TransportError::SessionClosed`] instead of hanging.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::{CardTransport, TransportError};

/// Create a connected transport/worker pair
///
/// `buffer` bounds the number of queued commands. A single session never
/// queues more than one.
pub fn channel(buffer: usize) -> (ChannelTransport, ChannelTransportWorker) {
    let (sender, receiver) = mpsc::channel(buffer.max(1));
    (
        ChannelTransport { sender },
        ChannelTransportWorker { receiver },
    )
}

/// One command awaiting a reply from the worker
pub struct TransportRequest {
    command: Bytes,
    responder: oneshot::Sender<Result<Bytes, TransportError>>,
}

impl fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Command data may carry a PIN
        let header = &self.command[..self.command.len().min(4)];
        f.debug_struct("TransportRequest")
            .field("header", &hex::encode_upper(header))
            .field("len", &self.command.len())
            .finish_non_exhaustive()
    }
}

impl TransportRequest {
    /// Raw command bytes
    pub fn command(&self) -> &[u8] {
        &self.command
    }

    /// Deliver the reply. Dropping the request without responding fails the
    /// waiting command with [`TransportError::SessionClosed`].
    pub fn respond(self, response: Result<Bytes, TransportError>) {
        if self.responder.send(response).is_err() {
            debug!("Reply dropped, the requesting side is gone");
        }
    }
}

/// Host side of the channel
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<TransportRequest>,
}

#[async_trait]
impl CardTransport for ChannelTransport {
    async fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let (responder, reply) = oneshot::channel();
        let request = TransportRequest {
            command: Bytes::copy_from_slice(command),
            responder,
        };

        self.sender
            .send(request)
            .await
            .map_err(|_| TransportError::SessionClosed)?;

        reply.await.map_err(|_| TransportError::SessionClosed)?
    }

    fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Card side of the channel, owned by whatever holds the physical session
#[derive(Debug)]
pub struct ChannelTransportWorker {
    receiver: mpsc::Receiver<TransportRequest>,
}

impl ChannelTransportWorker {
    /// Wait for the next command, `None` once every transport handle is dropped
    pub async fn recv(&mut self) -> Option<TransportRequest> {
        self.receiver.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for dedicated worker threads
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<TransportRequest> {
        self.receiver.blocking_recv()
    }

    /// Stop accepting commands. Queued commands still drain.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}
