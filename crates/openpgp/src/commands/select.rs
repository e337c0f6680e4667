//! SELECT by application identifier

use bytes::Bytes;
use ykpgp_apdu_core::Command;

use crate::constants::{CLA_ISO, OPENPGP_AID, ins};

/// SELECT by DF name (P1 = 04, first occurrence)
pub fn select_application(aid: &[u8]) -> Command {
    Command::new_with_data(CLA_ISO, ins::SELECT, 0x04, 0x00, Bytes::copy_from_slice(aid))
}

/// SELECT the OpenPGP application
pub fn select_openpgp() -> Command {
    select_application(&OPENPGP_AID)
}
