//! VERIFY for the user PIN (PW1)

use bytes::Bytes;
use serde::Serialize;
use ykpgp_apdu_core::Command;

use crate::constants::{CLA_ISO, ins};

/// PW1 reference in the P2 byte of VERIFY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PinReference {
    /// PW1 for PSO: COMPUTE DIGITAL SIGNATURE (81)
    #[display("PW1 (sign)")]
    Sign = 0x81,
    /// PW1 for PSO: DECIPHER and other operations (82)
    #[display("PW1 (decipher)")]
    Decipher = 0x82,
}

impl PinReference {
    /// Value of the P2 byte
    pub const fn p2(self) -> u8 {
        self as u8
    }
}

/// VERIFY the given PIN against a PW1 reference
pub fn verify_pin(reference: PinReference, pin: &[u8]) -> Command {
    Command::new_with_data(
        CLA_ISO,
        ins::VERIFY,
        0x00,
        reference.p2(),
        Bytes::copy_from_slice(pin),
    )
}
