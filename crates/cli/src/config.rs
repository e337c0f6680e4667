//! Configuration file and command-line overrides
//!
//! Values given on the command line win over `~/.ykpgp/ykpgp.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use eyre::{OptionExt, WrapErr};
use figment::{
    Figment,
    providers::{Format, Toml},
};
use serde::Deserialize;
use ykpgp_openpgp::{DecipherVector, RunConfig};

/// Contents of the configuration file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct FileConfig {
    pub(crate) reader: Option<String>,
    pub(crate) pin: Option<String>,
    pub(crate) fetch_serial: Option<bool>,
    pub(crate) fetch_url: Option<bool>,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) decipher: Option<DecipherSection>,
    pub(crate) sign_data: Option<String>,
}

/// `[decipher]` table, values in hex
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DecipherSection {
    pub(crate) ciphertext: String,
    pub(crate) expected_plaintext: Option<String>,
}

/// Arguments of the `run` subcommand
#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// User PIN (PW1)
    #[arg(long)]
    pub(crate) pin: Option<String>,

    /// Ephemeral ECDH point to decipher, as hex
    #[arg(long, value_name = "HEX")]
    pub(crate) ciphertext: Option<String>,

    /// Plaintext the card should return for the ciphertext, as hex
    #[arg(long, value_name = "HEX")]
    pub(crate) expected_plaintext: Option<String>,

    /// Data to sign (hash or DigestInfo), as hex
    #[arg(long, value_name = "HEX")]
    pub(crate) sign_data: Option<String>,

    /// Read the card serial number
    #[arg(long)]
    pub(crate) serial: bool,

    /// Skip reading the public key URL
    #[arg(long)]
    pub(crate) no_url: bool,

    /// Per-command timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,

    /// Configuration file (default: ~/.ykpgp/ykpgp.toml)
    #[arg(long, value_name = "PATH")]
    pub(crate) config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

impl RunArgs {
    /// Merge these arguments over the file configuration
    pub(crate) fn resolve(&self, file: &FileConfig) -> eyre::Result<RunConfig> {
        let fetch_url = !self.no_url && file.fetch_url.unwrap_or(true);
        let fetch_serial = self.serial || file.fetch_serial.unwrap_or(false);
        let mut config = RunConfig::new()
            .with_fetch_serial(fetch_serial)
            .with_fetch_url(fetch_url);

        if let Some(pin) = self.pin.as_ref().or(file.pin.as_ref()) {
            config = config.with_pin(pin);
        }

        let file_decipher = file.decipher.as_ref();
        let ciphertext = self
            .ciphertext
            .as_ref()
            .or(file_decipher.map(|d| &d.ciphertext));
        let expected = self
            .expected_plaintext
            .as_ref()
            .or(file_decipher.and_then(|d| d.expected_plaintext.as_ref()));
        match (ciphertext, expected) {
            (Some(ciphertext), expected) => {
                let mut vector = DecipherVector::new(decode_hex("ciphertext", ciphertext)?);
                if let Some(expected) = expected {
                    vector = vector
                        .with_expected_plaintext(decode_hex("expected plaintext", expected)?);
                }
                config = config.with_decipher(vector);
            }
            (None, Some(_)) => eyre::bail!("an expected plaintext needs a ciphertext"),
            (None, None) => {}
        }

        if let Some(data) = self.sign_data.as_ref().or(file.sign_data.as_ref()) {
            config = config.with_sign_data(decode_hex("sign data", data)?);
        }

        if let Some(secs) = self.timeout.or(file.timeout_secs) {
            config = config.with_command_timeout(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }
}

fn decode_hex(what: &str, value: &str) -> eyre::Result<Vec<u8>> {
    let value = value.trim();
    let value = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(value).wrap_err_with(|| format!("invalid hex for {what}"))
}

/// Returns the base config directory for ykpgp. It also creates the directory
/// if it doesn't exist yet.
pub(crate) fn config_dir() -> eyre::Result<PathBuf> {
    let dir = std::env::home_dir()
        .ok_or_eyre("home directory not found")?
        .join(".ykpgp");
    if !dir.exists() {
        std::fs::create_dir(&dir)?
    }
    Ok(dir)
}

/// Load `path`, or the default file when none is given. A missing file is empty.
pub(crate) fn load(path: Option<&Path>) -> eyre::Result<FileConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => config_dir()?.join("ykpgp.toml"),
    };
    extract(Figment::new().merge(Toml::file(path)))
}

fn extract(figment: Figment) -> eyre::Result<FileConfig> {
    Ok(figment.extract()?)
}
