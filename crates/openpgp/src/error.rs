/// Result type for OpenPGP session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for OpenPGP session setup
///
/// Failures during a run are never returned as errors; they are recorded in
/// the run's [`Report`](crate::Report).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Another run holds the card
    #[error("A run is already in progress on this card")]
    RunInProgress,

    /// Configuration cannot produce valid commands
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
