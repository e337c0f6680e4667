//! Error types specific to APDU responses

/// Error for APDU response parsing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "detail", rename_all = "snake_case"))]
pub enum ResponseError {
    /// Response shorter than the two status word bytes
    #[error("Incomplete response: {0} bytes, expected at least 2")]
    TooShort(usize),
}
