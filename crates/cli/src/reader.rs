//! PC/SC reader discovery and the card worker thread

use std::ffi::CString;
use std::thread::{self, JoinHandle};

use eyre::{OptionExt, eyre};
use pcsc::{Card, Context, Disposition, Protocols, ReaderState, Scope, ShareMode, State};
use tracing::{debug, warn};
use ykpgp_apdu_core::transport::channel::channel;
use ykpgp_apdu_core::{Bytes, ChannelTransport, ChannelTransportWorker, TransportError};

/// Short APDU response: 256 data bytes plus SW1 SW2
const RESPONSE_BUFFER_LEN: usize = 258;

/// A reader and whether a card is inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReaderInfo {
    pub(crate) name: String,
    pub(crate) has_card: bool,
}

/// Establish a user-scoped PC/SC context
pub(crate) fn establish() -> eyre::Result<Context> {
    Ok(Context::establish(Scope::User)?)
}

/// Snapshot every connected reader
pub(crate) fn list_readers(context: &Context) -> eyre::Result<Vec<ReaderInfo>> {
    let names = context.list_readers_owned()?;
    let mut readers = Vec::with_capacity(names.len());

    for name in names {
        let mut states = vec![ReaderState::new(name.as_c_str(), State::UNAWARE)];
        let has_card = match context.get_status_change(None, &mut states) {
            Ok(()) => states[0].event_state().contains(State::PRESENT),
            Err(e) => {
                debug!(reader = ?name, error = %e, "Failed to query reader state");
                false
            }
        };
        readers.push(ReaderInfo {
            name: name.to_string_lossy().into_owned(),
            has_card,
        });
    }

    Ok(readers)
}

/// Print the readers the way `list` shows them
pub(crate) fn print_readers(readers: &[ReaderInfo]) {
    if readers.is_empty() {
        println!("No readers found!");
        return;
    }

    println!("Available readers:");
    for (i, reader) in readers.iter().enumerate() {
        let status = if reader.has_card {
            "card present"
        } else {
            "no card"
        };
        println!("{}. {} ({})", i + 1, reader.name, status);
    }
}

/// Pick the named reader, or the first one with a card
pub(crate) fn select_reader(readers: &[ReaderInfo], name: Option<&str>) -> eyre::Result<String> {
    if readers.is_empty() {
        eyre::bail!("No readers found!");
    }

    let reader = match name {
        Some(name) => readers
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| eyre!("Reader '{name}' not found"))?,
        None => readers
            .iter()
            .find(|r| r.has_card)
            .ok_or_eyre("No card found in any reader!")?,
    };

    Ok(reader.name.clone())
}

/// Connect to the card in `reader` and serve commands from a dedicated thread
///
/// The thread exits once the returned transport is dropped or the card goes
/// away.
pub(crate) fn spawn_card_worker(
    context: &Context,
    reader: &str,
) -> eyre::Result<(ChannelTransport, JoinHandle<()>)> {
    let name = CString::new(reader)?;
    let card = match context.connect(&name, ShareMode::Shared, Protocols::ANY) {
        Ok(card) => card,
        Err(pcsc::Error::NoSmartcard) => eyre::bail!("No card present in reader: {reader}"),
        Err(e) => return Err(e.into()),
    };

    let (transport, worker) = channel(1);
    let handle = thread::Builder::new()
        .name("pcsc-card".into())
        .spawn(move || serve(card, worker))?;

    Ok((transport, handle))
}

fn serve(card: Card, mut worker: ChannelTransportWorker) {
    let mut buffer = [0u8; RESPONSE_BUFFER_LEN];

    while let Some(request) = worker.blocking_recv() {
        let reply = match card.transmit(request.command(), &mut buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(e @ (pcsc::Error::RemovedCard | pcsc::Error::ResetCard)) => {
                warn!(error = %e, "Card session lost");
                worker.close();
                Err(TransportError::SessionClosed)
            }
            Err(pcsc::Error::NoSmartcard) => Err(TransportError::NotConnected),
            Err(e) => Err(TransportError::device(e.to_string())),
        };
        request.respond(reply);
    }

    if let Err((_, e)) = card.disconnect(Disposition::LeaveCard) {
        debug!(error = %e, "Failed to disconnect card");
    }
}
