//! Command session orchestrator
//!
//! A run sends its commands strictly in order and waits for each reply before
//! building the next command. Card rejections steer the state machine. Parse
//! and transport failures end the run.

use std::fmt;

use bytes::Bytes;
use tokio::time;
use tracing::{Level, debug, error, info, instrument, warn};
use ykpgp_apdu_core::{CardTransport, Command, Response, StatusOutcome, TransportError};
use zeroize::Zeroizing;

use crate::commands::{self, PinReference};
use crate::config::{DecipherVector, RunConfig};
use crate::report::{
    Report, SelfTest, SessionPhase, SkipReason, StepFailure, StepKind, StepResult,
};

/// Per-run state owned by a [`CommandSession`]
#[derive(Default)]
pub struct SessionState {
    phase: SessionPhase,
    pin: Option<Zeroizing<Vec<u8>>>,
    last_deciphered_payload: Option<Bytes>,
    has_selected_application: bool,
}

impl SessionState {
    fn for_run(config: &RunConfig) -> Self {
        Self {
            pin: config.pin().map(|pin| Zeroizing::new(pin.to_vec())),
            ..Self::default()
        }
    }

    /// Current phase
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Output of the last successful decipher
    pub const fn last_deciphered_payload(&self) -> Option<&Bytes> {
        self.last_deciphered_payload.as_ref()
    }

    /// Whether SELECT succeeded in this run
    pub const fn has_selected_application(&self) -> bool {
        self.has_selected_application
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("phase", &self.phase)
            .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
            .field("last_deciphered_payload", &self.last_deciphered_payload)
            .field("has_selected_application", &self.has_selected_application)
            .finish()
    }
}

/// Marker for a run that must stop sending commands
#[derive(Debug)]
struct Aborted;

/// Drives one configured sequence of commands over a transport
///
/// The session borrows the transport mutably for its whole lifetime, so no
/// other run can interleave commands on it.
#[derive(Debug)]
pub struct CommandSession<'a, T: CardTransport + ?Sized> {
    transport: &'a mut T,
    config: &'a RunConfig,
    state: SessionState,
    results: Vec<StepResult>,
}

impl<'a, T: CardTransport + ?Sized> CommandSession<'a, T> {
    /// Create a session over `transport`
    pub fn new(transport: &'a mut T, config: &'a RunConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::for_run(config),
            results: Vec::new(),
        }
    }

    /// State left by the last run
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Execute every configured step and return the report
    ///
    /// Each call starts from fresh state. The report always ends in
    /// [`SessionPhase::Completed`] or [`SessionPhase::Aborted`].
    #[instrument(skip_all, name = "openpgp_run")]
    pub async fn run(&mut self) -> Report {
        self.state = SessionState::for_run(self.config);
        self.results.clear();

        let phase = match self.drive().await {
            Ok(()) => SessionPhase::Completed,
            Err(Aborted) => SessionPhase::Aborted,
        };
        self.enter(phase);
        info!(steps = self.results.len(), %phase, "Run finished");

        Report::new(phase, std::mem::take(&mut self.results))
    }

    async fn drive(&mut self) -> Result<(), Aborted> {
        let config = self.config;

        if !self.transport.is_connected() {
            error!("Transport is not connected");
            self.record(StepResult::failed(
                StepKind::SelectApplication,
                TransportError::NotConnected.into(),
            ));
            return Err(Aborted);
        }

        self.select_application().await?;

        if config.fetch_serial() {
            self.fetch_serial().await?;
        }

        if config.fetch_url() {
            self.fetch_url().await?;
        }

        if let Some(vector) = config.decipher() {
            match self.verify_pin(PinReference::Decipher).await? {
                None => self.decipher(vector).await?,
                Some(reason) => self.skip(StepKind::Decipher, reason),
            }
        }

        if let Some(data) = config.sign_data() {
            match self.verify_pin(PinReference::Sign).await? {
                None => self.sign(data).await?,
                Some(reason) => self.skip(StepKind::Sign, reason),
            }
        }

        Ok(())
    }

    async fn select_application(&mut self) -> Result<(), Aborted> {
        const STEP: StepKind = StepKind::SelectApplication;
        self.enter(SessionPhase::SelectingApplication);

        let response = match self.exchange(&commands::select_openpgp()).await {
            Ok(response) => response,
            Err(failure) => {
                // Nothing after SELECT is meaningful without it
                self.fail(STEP, failure)?;
                return Err(Aborted);
            }
        };

        let outcome = response.outcome();
        if outcome.is_success() {
            self.state.has_selected_application = true;
            self.record(StepResult::card(
                STEP,
                outcome,
                None,
                "OpenPGP application selected.",
            ));
            Ok(())
        } else {
            self.record(StepResult::card(
                STEP,
                outcome,
                None,
                format!(
                    "OpenPGP application selection failed. SW returned by the key: {}.",
                    response.status()
                ),
            ));
            Err(Aborted)
        }
    }

    async fn fetch_serial(&mut self) -> Result<(), Aborted> {
        const STEP: StepKind = StepKind::FetchSerial;
        self.enter(SessionPhase::FetchingMetadata);

        let response = match self.exchange(&commands::get_aid()).await {
            Ok(response) => response,
            Err(failure) => return self.fail(STEP, failure),
        };

        let outcome = response.outcome();
        if !outcome.is_success() {
            let message = format!(
                "Failed to get the serial number. SW returned by the key: {}.",
                response.status()
            );
            self.record(StepResult::card(STEP, outcome, None, message));
            return Ok(());
        }

        let (payload, message) = match commands::serial_from_aid(response.payload()) {
            Some(serial) => (
                Some(Bytes::copy_from_slice(serial)),
                format!("The key serial number is: {}.", hex::encode_upper(serial)),
            ),
            None => (
                None,
                "The application identifier is too short to hold a serial number.".to_string(),
            ),
        };
        self.record(StepResult::card(STEP, outcome, payload, message));
        Ok(())
    }

    async fn fetch_url(&mut self) -> Result<(), Aborted> {
        const STEP: StepKind = StepKind::FetchUrl;
        self.enter(SessionPhase::FetchingMetadata);

        let response = match self.exchange(&commands::get_url()).await {
            Ok(response) => response,
            Err(failure) => return self.fail(STEP, failure),
        };

        let outcome = response.outcome();
        let message = if !outcome.is_success() {
            format!("Failed to get URL. SW returned by the key: {}.", response.status())
        } else if response.payload().is_empty() {
            "No URL stored on the key.".to_string()
        } else {
            format!("Got URL: {}", String::from_utf8_lossy(response.payload()))
        };

        let payload = Some(response.into_payload()).filter(|p| !p.is_empty());
        self.record(StepResult::card(STEP, outcome, payload, message));
        Ok(())
    }

    /// Returns why the dependent step must be skipped, if it must
    async fn verify_pin(&mut self, reference: PinReference) -> Result<Option<SkipReason>, Aborted> {
        let (step, phase) = match reference {
            PinReference::Decipher => {
                (StepKind::VerifyPinForDecipher, SessionPhase::VerifyingPinForDecipher)
            }
            PinReference::Sign => (StepKind::VerifyPinForSign, SessionPhase::VerifyingPinForSign),
        };

        let command = match self.state.pin.as_deref() {
            Some(pin) => commands::verify_pin(reference, pin),
            None => {
                self.skip(step, SkipReason::NoPin);
                return Ok(Some(SkipReason::NoPin));
            }
        };
        self.enter(phase);

        let response = match self.exchange(&command).await {
            Ok(response) => response,
            Err(failure) => {
                self.fail(step, failure)?;
                return Ok(Some(SkipReason::PinNotVerified));
            }
        };

        let outcome = response.outcome();
        let message = match outcome {
            StatusOutcome::Success => format!("{reference} verified."),
            StatusOutcome::PinVerificationFailed { retries_remaining } => format!(
                "{reference} verification failed. {retries_remaining} retries remaining."
            ),
            _ => format!(
                "{reference} verification failed. SW returned by the key: {}.",
                response.status()
            ),
        };
        self.record(StepResult::card(step, outcome, None, message));

        Ok((!outcome.is_success()).then_some(SkipReason::PinNotVerified))
    }

    async fn decipher(&mut self, vector: &DecipherVector) -> Result<(), Aborted> {
        const STEP: StepKind = StepKind::Decipher;
        self.enter(SessionPhase::Deciphering);

        let command = match commands::decipher(vector.ciphertext()) {
            Ok(command) => command,
            Err(e) => return self.fail(STEP, e.into()),
        };
        let response = match self.exchange(&command).await {
            Ok(response) => response,
            Err(failure) => return self.fail(STEP, failure),
        };

        let outcome = response.outcome();
        if !outcome.is_success() {
            let message = format!("Decipher failed. SW returned by the key: {}.", response.status());
            self.record(StepResult::card(STEP, outcome, None, message));
            return Ok(());
        }

        let plaintext = response.into_payload();
        let verdict = vector
            .expected_plaintext()
            .map(|expected| SelfTest::check(&plaintext, expected));
        let message = match verdict {
            Some(verdict) => format!("Deciphered {} bytes, {verdict}.", plaintext.len()),
            None => format!("Deciphered {} bytes.", plaintext.len()),
        };
        if verdict == Some(SelfTest::Mismatch) {
            warn!(len = plaintext.len(), "Deciphered plaintext does not match expected");
        }

        self.state.last_deciphered_payload = Some(plaintext.clone());
        let mut result = StepResult::card(STEP, outcome, Some(plaintext), message);
        if let Some(verdict) = verdict {
            result = result.with_self_test(verdict);
        }
        self.record(result);
        Ok(())
    }

    async fn sign(&mut self, data: &Bytes) -> Result<(), Aborted> {
        const STEP: StepKind = StepKind::Sign;
        self.enter(SessionPhase::Signing);

        let command = commands::compute_digital_signature(data);
        let response = match self.exchange(&command).await {
            Ok(response) => response,
            Err(failure) => return self.fail(STEP, failure),
        };

        let outcome = response.outcome();
        let result = if outcome.is_success() {
            let signature = response.into_payload();
            let message = format!("Signature computed, {} bytes.", signature.len());
            StepResult::card(STEP, outcome, Some(signature), message)
        } else {
            let message = format!("Signing failed. SW returned by the key: {}.", response.status());
            StepResult::card(STEP, outcome, None, message)
        };
        self.record(result);
        Ok(())
    }

    /// Encode, send with a deadline and split the reply
    async fn exchange(&mut self, command: &Command) -> Result<Response, StepFailure> {
        let bytes = command.encode()?;
        debug!(%command, "Sending command");

        let raw = time::timeout(
            self.config.command_timeout(),
            self.transport.transmit_raw(&bytes),
        )
        .await
        .map_err(|_| TransportError::Timeout)??;

        let response = Response::from_bytes(&raw)?;
        let status = response.status();
        let level = status.tracing_level();
        if level == Level::DEBUG {
            debug!(%status, len = response.payload().len(), "Card replied");
        } else if level == Level::INFO {
            info!(%status, description = status.description(), "Card replied");
        } else {
            warn!(%status, description = status.description(), "Card rejected command");
        }
        Ok(response)
    }

    /// Record a structural failure; errs when it ends the run
    fn fail(&mut self, step: StepKind, failure: StepFailure) -> Result<(), Aborted> {
        let aborts = failure.aborts_run();
        if aborts {
            error!(%step, error = %failure, "Step failed, aborting run");
        } else {
            warn!(%step, error = %failure, "Step failed");
        }
        self.record(StepResult::failed(step, failure));
        if aborts { Err(Aborted) } else { Ok(()) }
    }

    fn skip(&mut self, step: StepKind, reason: SkipReason) {
        warn!(%step, %reason, "Skipping step");
        self.record(StepResult::skipped(step, reason));
    }

    fn record(&mut self, result: StepResult) {
        info!(step = %result.step(), outcome = %result.outcome(), "Step recorded");
        self.results.push(result);
    }

    fn enter(&mut self, phase: SessionPhase) {
        debug!(from = %self.state.phase, to = %phase, "Phase transition");
        self.state.phase = phase;
    }
}
