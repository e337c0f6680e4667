//! GET DATA for the data objects a run reads

use std::ops::Range;

use ykpgp_apdu_core::Command;

use crate::constants::{CLA_ISO, ins, tags};

/// Position of the card serial number within the application identifier
const AID_SERIAL: Range<usize> = 10..14;

/// GET DATA for a data object, tag carried in P1/P2, Le = 00
pub fn get_data(tag: u16) -> Command {
    let [p1, p2] = tag.to_be_bytes();
    Command::new_with_le(CLA_ISO, ins::GET_DATA, p1, p2, 0x00)
}

/// GET DATA for the full application identifier (4F)
pub fn get_aid() -> Command {
    get_data(tags::AID)
}

/// GET DATA for the public key URL (5F50)
pub fn get_url() -> Command {
    get_data(tags::URL)
}

/// Serial number bytes of an application identifier, if it is long enough
pub fn serial_from_aid(aid: &[u8]) -> Option<&[u8]> {
    aid.get(AID_SERIAL)
}
