//! APDU command definitions
//!
//! This module provides the [`Command`] value type and its short-form
//! encoding according to ISO/IEC 7816-4.

pub mod error;

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

pub use error::CommandError;

/// Expected length type for APDU commands
pub type ExpectedLength = u8;

/// Largest data field a short-form command can carry (one Lc byte)
pub const MAX_DATA_LEN: usize = 255;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Command class (CLA)
    pub const fn class(&self) -> u8 {
        self.cla
    }

    /// Instruction code (INS)
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// First parameter (P1)
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter (P2)
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Command payload data, `None` when absent or empty
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref().filter(|data| !data.is_empty())
    }

    /// Expected response length (optional)
    pub const fn expected_length(&self) -> Option<ExpectedLength> {
        self.le
    }

    /// Calculate length of the serialized command
    pub fn command_length(&self) -> usize {
        // Header (CLA, INS, P1, P2) is always 4 bytes
        let mut length = 4;

        if let Some(data) = self.data() {
            length += 1 + data.len();
        }

        if self.le.is_some() {
            length += 1;
        }

        length
    }

    /// Encode to raw APDU bytes
    ///
    /// Layout is `CLA INS P1 P2 [Lc data…] [Le]`. Fails when the data field
    /// exceeds [`MAX_DATA_LEN`].
    pub fn encode(&self) -> Result<Bytes, CommandError> {
        if let Some(data) = self.data() {
            if data.len() > MAX_DATA_LEN {
                return Err(CommandError::data_too_long(data.len(), MAX_DATA_LEN));
            }
        }

        let mut buffer = BytesMut::with_capacity(self.command_length());

        // Header: CLA, INS, P1, P2
        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        // Add Lc and data if present
        if let Some(data) = self.data() {
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        Ok(buffer.freeze())
    }

    /// Parse a command from raw short-form bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, CommandError> {
        if data.len() < 4 {
            return Err(CommandError::InvalidLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);
        let body = &data[4..];

        match body.len() {
            0 => {}
            // Only Le present, no data
            1 => command.le = Some(body[0]),
            _ => {
                let lc = body[0] as usize;
                if lc == 0 {
                    return Err(CommandError::InvalidLength(data.len()));
                }
                match body.len() - 1 {
                    rest if rest == lc => {}
                    rest if rest == lc + 1 => command.le = Some(body[1 + lc]),
                    _ => return Err(CommandError::InvalidLength(data.len())),
                }
                command.data = Some(Bytes::copy_from_slice(&body[1..1 + lc]));
            }
        }

        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CLA={:02X} INS={:02X} P1={:02X} P2={:02X}",
            self.cla, self.ins, self.p1, self.p2
        )?;
        if let Some(data) = self.data() {
            write!(f, " Lc={:02X}", data.len())?;
        }
        if let Some(le) = self.le {
            write!(f, " Le={le:02X}")?;
        }
        Ok(())
    }
}
