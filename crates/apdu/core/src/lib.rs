//! Core types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types for talking to smart cards
//! according to ISO/IEC 7816-4:
//!
//! - Building short-form APDU commands ([`Command`])
//! - Splitting card replies into payload and status word ([`Response`])
//! - Classifying status words into outcomes ([`StatusOutcome`])
//! - An asynchronous transport boundary ([`CardTransport`]) plus a
//!   channel-backed implementation for driving a card from a worker thread
//!
//! Enable the `mock` feature for a scripted [`transport::MockTransport`] and
//! the `serde` feature to serialize outcomes and errors.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod transport;

pub use command::{Command, CommandError, ExpectedLength, MAX_DATA_LEN};
pub use response::status::{StatusOutcome, StatusWord};
pub use response::{Response, ResponseError};
pub use transport::channel::{ChannelTransport, ChannelTransportWorker, TransportRequest};
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Bytes, BytesMut};

    // Command related
    pub use crate::command::{Command, CommandError, ExpectedLength};

    // Response related
    pub use crate::response::status::{StatusOutcome, StatusWord, common as status};
    pub use crate::response::{Response, ResponseError};

    // Transport layer
    pub use crate::transport::{CardTransport, TransportError};
}
