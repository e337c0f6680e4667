//! OpenPGP card session core
//!
//! Builds the OpenPGP card commands, sends them one at a time over any
//! [`CardTransport`](ykpgp_apdu_core::CardTransport) and records one
//! [`StepResult`] per step:
//!
//! 1. SELECT the OpenPGP application (a failure aborts the run)
//! 2. GET DATA for the public key URL (informational)
//! 3. VERIFY PW1 (82) then PSO: DECIPHER with an optional known-answer check
//! 4. VERIFY PW1 (81) then PSO: COMPUTE DIGITAL SIGNATURE
//!
//! Card rejections never surface as errors. They are data in the [`Report`].
//!
//! ```no_run
//! # async fn demo(transport: &mut impl ykpgp_apdu_core::CardTransport) {
//! use ykpgp_openpgp::{CommandSession, DecipherVector, RunConfig};
//!
//! let config = RunConfig::new()
//!     .with_pin("123456")
//!     .with_decipher(DecipherVector::new(vec![0x42; 32]));
//! let report = CommandSession::new(transport, &config).run().await;
//! println!("{report}");
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

mod card;
pub mod commands;
pub mod config;
pub mod constants;
mod error;
pub mod report;
pub mod session;

pub use card::CardSession;
pub use config::{DEFAULT_COMMAND_TIMEOUT, DecipherVector, RunConfig};
pub use error::{Error, Result};
pub use report::{
    Report, SelfTest, SessionPhase, SkipReason, StepFailure, StepKind, StepOutcome, StepResult,
};
pub use session::{CommandSession, SessionState};
