//! Error taxonomy shared across the engine.

use thiserror::Error;

use crate::id::BackupId;

/// Errors that can occur during lifecycle coordination.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed request, fatal to the call.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The requested edge violates the transition graph.
    #[error("invalid transition for {backup_id}: {from} -> {to}")]
    InvalidTransition {
        backup_id: BackupId,
        from: crate::state::BackupState,
        to: crate::state::BackupState,
    },

    /// Lock contention timeout; retryable.
    #[error("backup {0} is busy: lock acquisition timed out")]
    Busy(BackupId),

    /// Confidence below the action threshold; escalate to a human.
    #[error("confidence {confidence:.2} below threshold {threshold:.2} for {backup_id}")]
    LowConfidence {
        backup_id: BackupId,
        confidence: f64,
        threshold: f64,
    },

    /// The archiver/deleter failed; already rolled back.
    #[error("side effect failed for {backup_id}: {message}")]
    SideEffectFailure {
        backup_id: BackupId,
        message: String,
    },

    /// A record failed its integrity check on read and was quarantined.
    #[error("record {0} failed integrity check and was quarantined")]
    CorruptionDetected(BackupId),

    /// A previous holder's liveness deadline elapsed.
    #[error("stale lock on {backup_id} held by {holder} was force-released")]
    StaleLock { backup_id: BackupId, holder: String },

    /// No record under the given id.
    #[error("backup not found: {0}")]
    NotFound(BackupId),

    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EngineError::Busy(BackupId::new("b1"));
        assert_eq!(err.to_string(), "backup b1 is busy: lock acquisition timed out");

        let err = EngineError::LowConfidence {
            backup_id: BackupId::new("b2"),
            confidence: 0.4,
            threshold: 0.9,
        };
        assert!(err.to_string().contains("0.40"));
        assert!(err.to_string().contains("0.90"));
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Storage(_)));
    }
}
