//! Error types specific to APDU commands

/// Error for APDU command construction and decoding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "detail", rename_all = "snake_case"))]
pub enum CommandError {
    /// Command data does not fit a short-form Lc byte
    #[error("Data too long: {len} bytes (max {max})")]
    DataTooLong {
        /// Actual data length
        len: usize,
        /// Largest length the encoding allows
        max: usize,
    },

    /// Raw command bytes do not follow the short-form layout
    #[error("Invalid command length: {0}")]
    InvalidLength(usize),

    /// Command data could not be assembled
    #[error("Invalid command data: {0}")]
    InvalidData(&'static str),
}

impl CommandError {
    /// Create a data too long error
    pub const fn data_too_long(len: usize, max: usize) -> Self {
        Self::DataTooLong { len, max }
    }
}
