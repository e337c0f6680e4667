//! Step results and the run report

use std::fmt;

use bytes::Bytes;
use serde::{Serialize, Serializer};
use ykpgp_apdu_core::{CommandError, ResponseError, StatusOutcome, TransportError};

/// Steps a run can execute, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// SELECT the OpenPGP application
    #[display("select application")]
    SelectApplication,
    /// GET DATA for the application identifier, which carries the serial number
    #[display("fetch serial number")]
    FetchSerial,
    /// GET DATA for the public key URL
    #[display("fetch URL")]
    FetchUrl,
    /// VERIFY PW1 (82)
    #[display("verify PIN for decipher")]
    VerifyPinForDecipher,
    /// PSO: DECIPHER
    #[display("decipher")]
    Decipher,
    /// VERIFY PW1 (81)
    #[display("verify PIN for sign")]
    VerifyPinForSign,
    /// PSO: COMPUTE DIGITAL SIGNATURE
    #[display("sign")]
    Sign,
}

/// Why a step was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The preceding VERIFY did not succeed
    #[display("PIN not verified")]
    PinNotVerified,
    /// No PIN was configured for a path that needs one
    #[display("no PIN configured")]
    NoPin,
}

/// Structural failure of a step
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepFailure {
    /// The command could not be encoded
    #[error("encoding failed: {0}")]
    Encoding(#[from] CommandError),

    /// The reply could not be parsed
    #[error("malformed response: {0}")]
    Parse(#[from] ResponseError),

    /// The command was not delivered or the reply never arrived
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

impl StepFailure {
    /// Whether this failure ends the run
    ///
    /// Encoding failures affect only the step that built the command.
    pub const fn aborts_run(&self) -> bool {
        !matches!(self, Self::Encoding(_))
    }
}

/// Terminal outcome of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The card replied with this status
    Card(StatusOutcome),
    /// The command was never built or sent
    Skipped(SkipReason),
    /// Encoding, parsing or transport failed
    Failed(StepFailure),
}

impl StepOutcome {
    /// Whether the card accepted the command
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Card(outcome) if outcome.is_success())
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Card(outcome) => fmt::Display::fmt(outcome, f),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::Failed(failure) => fmt::Display::fmt(failure, f),
        }
    }
}

/// Decipher known-answer verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfTest {
    /// Output equals the reference
    #[display("plaintext matches expected")]
    Match,
    /// Output differs from the reference
    #[display("plaintext does not match expected")]
    Mismatch,
}

impl SelfTest {
    /// Compare card output against the reference byte for byte
    pub fn check(actual: &[u8], expected: &[u8]) -> Self {
        if actual == expected { Self::Match } else { Self::Mismatch }
    }
}

/// Record of a single executed or skipped step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    step: StepKind,
    outcome: StepOutcome,
    #[serde(serialize_with = "serialize_payload", skip_serializing_if = "Option::is_none")]
    payload: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    self_test: Option<SelfTest>,
    message: String,
}

impl StepResult {
    /// Step answered by the card
    pub fn card(
        step: StepKind,
        outcome: StatusOutcome,
        payload: Option<Bytes>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step,
            outcome: StepOutcome::Card(outcome),
            payload,
            self_test: None,
            message: message.into(),
        }
    }

    /// Step never sent
    pub fn skipped(step: StepKind, reason: SkipReason) -> Self {
        Self {
            step,
            outcome: StepOutcome::Skipped(reason),
            payload: None,
            self_test: None,
            message: format!("{step} skipped: {reason}."),
        }
    }

    /// Step that failed structurally
    pub fn failed(step: StepKind, failure: StepFailure) -> Self {
        let message = match &failure {
            StepFailure::Transport(TransportError::NotConnected) => {
                TransportError::NotConnected.to_string()
            }
            StepFailure::Transport(e) => format!("Error when executing command: {e}."),
            other => format!("{step} {other}."),
        };
        Self {
            step,
            outcome: StepOutcome::Failed(failure),
            payload: None,
            self_test: None,
            message,
        }
    }

    /// Attach a self-test verdict
    pub const fn with_self_test(mut self, verdict: SelfTest) -> Self {
        self.self_test = Some(verdict);
        self
    }

    /// Step this result belongs to
    pub const fn step(&self) -> StepKind {
        self.step
    }

    /// How the step ended
    pub const fn outcome(&self) -> &StepOutcome {
        &self.outcome
    }

    /// Response payload for steps that return data
    pub const fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Known-answer verdict, decipher only
    pub const fn self_test(&self) -> Option<SelfTest> {
        self.self_test
    }

    /// Human-readable summary
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.step, self.message)
    }
}

fn serialize_payload<S: Serializer>(payload: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
    match payload {
        Some(bytes) => serializer.serialize_str(&hex::encode_upper(bytes)),
        None => serializer.serialize_none(),
    }
}

/// Orchestrator phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, derive_more::Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No run started
    #[default]
    #[display("idle")]
    Idle,
    /// SELECT in flight
    #[display("selecting application")]
    SelectingApplication,
    /// GET DATA for the serial number or the URL in flight
    #[display("fetching metadata")]
    FetchingMetadata,
    /// VERIFY (82) in flight
    #[display("verifying PIN for decipher")]
    VerifyingPinForDecipher,
    /// PSO: DECIPHER in flight
    #[display("deciphering")]
    Deciphering,
    /// VERIFY (81) in flight
    #[display("verifying PIN for sign")]
    VerifyingPinForSign,
    /// PSO: COMPUTE DIGITAL SIGNATURE in flight
    #[display("signing")]
    Signing,
    /// Every configured step was attempted
    #[display("completed")]
    Completed,
    /// A prerequisite or structural failure stopped the run
    #[display("aborted")]
    Aborted,
}

impl SessionPhase {
    /// Whether no further transitions can happen
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// Ordered step results of one run plus its terminal phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    phase: SessionPhase,
    steps: Vec<StepResult>,
}

impl Report {
    pub(crate) const fn new(phase: SessionPhase, steps: Vec<StepResult>) -> Self {
        Self { phase, steps }
    }

    /// Terminal phase
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Results in execution order
    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    /// First result recorded for `kind`
    pub fn step(&self, kind: StepKind) -> Option<&StepResult> {
        self.steps.iter().find(|result| result.step == kind)
    }

    /// Whether the run reached `Completed`
    pub const fn is_completed(&self) -> bool {
        matches!(self.phase, SessionPhase::Completed)
    }

    /// Consume the report, keeping the results
    pub fn into_steps(self) -> Vec<StepResult> {
        self.steps
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.steps {
            writeln!(f, "{result}")?;
        }
        write!(f, "Run {}.", self.phase)
    }
}
