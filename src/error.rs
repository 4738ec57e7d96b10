//! Error taxonomy
//!
//! Only `InvalidShapeDescriptor` and the settings errors ever leave the
//! crate as hard failures. Stale handles and reset re-entrancy are
//! recovered where they happen: logged, then the operation is skipped.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Operation on a retired or unknown body/entity
    #[error("stale handle: {0}")]
    StaleHandle(String),

    /// Malformed collision shape at creation time
    #[error("invalid shape descriptor: {0}")]
    InvalidShapeDescriptor(String),

    /// Reset triggered while a previous reset is still running
    #[error("reset already in progress")]
    ResetReentrancy,

    /// Settings file could not be parsed
    #[error("settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Recoverable errors degrade to a skipped operation inside the frame loop
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SimError::StaleHandle(_) | SimError::ResetReentrancy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(SimError::StaleHandle("body 3".into()).is_recoverable());
        assert!(SimError::ResetReentrancy.is_recoverable());
        assert!(!SimError::InvalidShapeDescriptor("radius 0".into()).is_recoverable());
    }

    #[test]
    fn test_settings_error_from_json() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: SimError = err.into();
        assert!(matches!(err, SimError::Settings(_)));
        assert!(!err.is_recoverable());
    }
}
