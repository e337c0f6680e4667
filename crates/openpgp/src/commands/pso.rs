//! PERFORM SECURITY OPERATION: DECIPHER and COMPUTE DIGITAL SIGNATURE

use bytes::Bytes;
use iso7816_tlv::ber::{Tag, Tlv, Value};
use ykpgp_apdu_core::{Command, CommandError};

use crate::constants::{CLA_ISO, ins, pso, tags};

/// PSO: DECIPHER for an ECDH key
///
/// The ephemeral public point is wrapped as `A6 { 7F49 { 86 point } }`. For a
/// 32-byte point this yields `27 A6 25 7F 49 22 86 20 …`.
pub fn decipher(ciphertext: &[u8]) -> Result<Command, CommandError> {
    let data = cipher_do(ciphertext).map_err(|_| CommandError::InvalidData("cipher DO"))?;
    let (p1, p2) = pso::DECIPHER;
    Ok(Command::new_with_data(CLA_ISO, ins::PSO, p1, p2, data))
}

/// PSO: COMPUTE DIGITAL SIGNATURE over caller-prepared data (hash or DigestInfo)
pub fn compute_digital_signature(data: &[u8]) -> Command {
    let (p1, p2) = pso::COMPUTE_DIGITAL_SIGNATURE;
    Command::new_with_data(CLA_ISO, ins::PSO, p1, p2, Bytes::copy_from_slice(data))
}

fn cipher_do(ciphertext: &[u8]) -> Result<Vec<u8>, iso7816_tlv::TlvError> {
    let point = Tlv::new(
        Tag::try_from(tags::EXTERNAL_PUBLIC_KEY)?,
        Value::Primitive(ciphertext.to_vec()),
    )?;
    let public_key = Tlv::new(
        Tag::try_from(tags::PUBLIC_KEY)?,
        Value::Constructed(vec![point]),
    )?;
    let cipher = Tlv::new(
        Tag::try_from(tags::CIPHER_DO)?,
        Value::Constructed(vec![public_key]),
    )?;
    Ok(cipher.to_vec())
}
