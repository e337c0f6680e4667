//! Transport traits for APDU communication with cards
//!
//! A transport delivers one raw command to the card and resolves with the raw
//! reply. It has no knowledge of command structure or status words.

pub mod channel;
pub mod error;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Trait for asynchronous card transports
///
/// Only one command may be in flight at a time, which `&mut self` enforces.
/// Implementations deliver each command exactly once and never retry.
#[async_trait]
pub trait CardTransport: Send + fmt::Debug {
    /// Send raw APDU bytes to card and return response bytes
    async fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        // Header only, command data may carry a PIN
        let header = &command[..command.len().min(4)];
        trace!(header = %hex::encode_upper(header), len = command.len(), "Transmitting raw command");
        let result = self.do_transmit_raw(command).await;
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode_upper(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    async fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;
}

#[async_trait]
impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    async fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).transmit_raw(command).await
    }

    async fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transmit_raw(command).await
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;

#[cfg(any(test, feature = "mock"))]
mod mock {
    use std::collections::VecDeque;

    use super::*;

    /// Scripted transport for tests
    ///
    /// Replies are consumed in order, one per command. Every command that
    /// reaches the transport is recorded.
    #[derive(Debug, Clone)]
    pub struct MockTransport {
        /// Replies still to be delivered
        responses: VecDeque<Result<Bytes, TransportError>>,
        /// Commands that were sent
        commands: Vec<Bytes>,
        /// Whether the transport is connected
        connected: bool,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self {
                responses: VecDeque::new(),
                commands: Vec::new(),
                connected: true,
            }
        }
    }

    impl MockTransport {
        /// Create a new mock transport with the given raw replies
        pub fn new<I, B>(responses: I) -> Self
        where
            I: IntoIterator<Item = B>,
            B: Into<Bytes>,
        {
            Self {
                responses: responses.into_iter().map(|r| Ok(r.into())).collect(),
                ..Self::default()
            }
        }

        /// Create a mock transport that is not connected to any card
        pub fn disconnected() -> Self {
            Self {
                connected: false,
                ..Self::default()
            }
        }

        /// Queue a raw reply
        pub fn push_response(&mut self, response: impl Into<Bytes>) -> &mut Self {
            self.responses.push_back(Ok(response.into()));
            self
        }

        /// Queue a transport failure
        pub fn push_error(&mut self, error: TransportError) -> &mut Self {
            self.responses.push_back(Err(error));
            self
        }

        /// Commands that reached the transport, in order
        pub fn commands(&self) -> &[Bytes] {
            &self.commands
        }

        /// Number of replies not yet consumed
        pub fn pending(&self) -> usize {
            self.responses.len()
        }
    }

    #[async_trait]
    impl CardTransport for MockTransport {
        async fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }

            self.commands.push(Bytes::copy_from_slice(command));

            self.responses
                .pop_front()
                .unwrap_or(Err(TransportError::Transmission))
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }
}
