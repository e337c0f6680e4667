use tokio::sync::Mutex;
use tracing::debug;
use ykpgp_apdu_core::CardTransport;

use crate::{CommandSession, Error, Report, Result, RunConfig};

/// A card shared between callers that may request runs concurrently
///
/// Runs against one physical card are serialized. [`CardSession::run`] waits
/// for any run in flight and [`CardSession::try_run`] refuses instead.
#[derive(Debug)]
pub struct CardSession<T: CardTransport> {
    transport: Mutex<T>,
}

impl<T: CardTransport> CardSession<T> {
    /// Wrap a transport
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
        }
    }

    /// Run once the card is free
    pub async fn run(&self, config: &RunConfig) -> Result<Report> {
        config.validate()?;
        let mut transport = self.transport.lock().await;
        Ok(CommandSession::new(&mut *transport, config).run().await)
    }

    /// Run now, or fail with [`Error::RunInProgress`] if the card is busy
    pub async fn try_run(&self, config: &RunConfig) -> Result<Report> {
        config.validate()?;
        let mut transport = self.transport.try_lock().map_err(|_| {
            debug!("Rejecting run, card busy");
            Error::RunInProgress
        })?;
        Ok(CommandSession::new(&mut *transport, config).run().await)
    }

    /// Release the transport
    pub fn into_transport(self) -> T {
        self.transport.into_inner()
    }
}
