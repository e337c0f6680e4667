//! Builders for the OpenPGP card commands used by a session
//!
//! Every builder returns a plain [`Command`]; length limits are enforced when
//! the command is encoded.
//!
//! [`Command`]: ykpgp_apdu_core::Command

pub mod get_data;
pub use get_data::*;
pub mod pin;
pub use pin::*;
pub mod pso;
pub use pso::*;
pub mod select;
pub use select::*;
