//! Run configuration supplied by the caller

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Default bound on a single command round trip
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Known-answer vector for the decipher self-test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecipherVector {
    ciphertext: Bytes,
    expected_plaintext: Option<Bytes>,
}

impl DecipherVector {
    /// Decipher `ciphertext` without checking the result
    pub fn new(ciphertext: impl Into<Bytes>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            expected_plaintext: None,
        }
    }

    /// Compare the card's output against `plaintext`
    pub fn with_expected_plaintext(mut self, plaintext: impl Into<Bytes>) -> Self {
        self.expected_plaintext = Some(plaintext.into());
        self
    }

    /// Data sent to the card (the ephemeral ECDH point)
    pub const fn ciphertext(&self) -> &Bytes {
        &self.ciphertext
    }

    /// Reference output, if configured
    pub const fn expected_plaintext(&self) -> Option<&Bytes> {
        self.expected_plaintext.as_ref()
    }
}

/// Which steps a run executes and with what inputs
///
/// Selecting the application always runs first. Reading the serial number is
/// off by default, the URL fetch is on by default, the decipher path runs when a [`DecipherVector`] is set and the
/// sign path runs when sign data is set.
#[derive(Clone)]
pub struct RunConfig {
    pin: Option<Zeroizing<Vec<u8>>>,
    fetch_serial: bool,
    fetch_url: bool,
    decipher: Option<DecipherVector>,
    sign_data: Option<Bytes>,
    command_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pin: None,
            fetch_serial: false,
            fetch_url: true,
            decipher: None,
            sign_data: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("pin", &self.pin.as_ref().map(|_| "<redacted>"))
            .field("fetch_serial", &self.fetch_serial)
            .field("fetch_url", &self.fetch_url)
            .field("decipher", &self.decipher)
            .field("sign_data", &self.sign_data)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

impl RunConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user PIN (UTF-8 bytes as typed)
    pub fn with_pin(mut self, pin: impl AsRef<[u8]>) -> Self {
        self.pin = Some(Zeroizing::new(pin.as_ref().to_vec()));
        self
    }

    /// Read the card serial number from the application identifier
    pub const fn with_fetch_serial(mut self, fetch_serial: bool) -> Self {
        self.fetch_serial = fetch_serial;
        self
    }

    /// Enable or disable the URL fetch
    pub const fn with_fetch_url(mut self, fetch_url: bool) -> Self {
        self.fetch_url = fetch_url;
        self
    }

    /// Run the decipher path with this vector
    pub fn with_decipher(mut self, vector: DecipherVector) -> Self {
        self.decipher = Some(vector);
        self
    }

    /// Run the sign path over this data
    pub fn with_sign_data(mut self, data: impl Into<Bytes>) -> Self {
        self.sign_data = Some(data.into());
        self
    }

    /// Bound each command round trip
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Configured PIN
    pub fn pin(&self) -> Option<&[u8]> {
        self.pin.as_ref().map(|pin| pin.as_slice())
    }

    /// Whether the serial number is read
    pub const fn fetch_serial(&self) -> bool {
        self.fetch_serial
    }

    /// Whether the URL fetch runs
    pub const fn fetch_url(&self) -> bool {
        self.fetch_url
    }

    /// Decipher vector, if the decipher path is enabled
    pub const fn decipher(&self) -> Option<&DecipherVector> {
        self.decipher.as_ref()
    }

    /// Sign input, if the sign path is enabled
    pub const fn sign_data(&self) -> Option<&Bytes> {
        self.sign_data.as_ref()
    }

    /// Per-command timeout
    pub const fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Reject configurations that could only produce malformed commands
    pub fn validate(&self) -> Result<()> {
        if self.pin.as_ref().is_some_and(|pin| pin.is_empty()) {
            return Err(Error::InvalidConfig("PIN is empty".into()));
        }
        if self.decipher.as_ref().is_some_and(|v| v.ciphertext.is_empty()) {
            return Err(Error::InvalidConfig("decipher ciphertext is empty".into()));
        }
        if self.sign_data.as_ref().is_some_and(Bytes::is_empty) {
            return Err(Error::InvalidConfig("sign data is empty".into()));
        }
        if self.command_timeout.is_zero() {
            return Err(Error::InvalidConfig("command timeout must be non-zero".into()));
        }
        Ok(())
    }
}
