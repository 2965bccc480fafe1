use thiserror::Error;

/// Custom error types for the HiveMind session service
#[derive(Debug, Error)]
pub enum HiveError {
    /// Login errors
    #[error("Please enter both ID and password")]
    InvalidCredentials,

    /// Roster and grouping errors
    #[error("Student {0} not found")]
    StudentNotFound(u32),

    #[error("Student {0} is already in peer node {1}")]
    AlreadyGrouped(u32, String),

    #[error("Please enter a node name and select students")]
    InvalidPeerNode,

    /// Capture errors
    #[error("Screen recording permission denied or cancelled")]
    CaptureDenied,

    /// Analysis service errors
    #[error("Analysis request failed: {0}")]
    AnalysisRequest(#[from] reqwest::Error),

    #[error("Analysis service returned status {0}")]
    AnalysisStatus(u16),

    #[error("Analysis service reported: {0}")]
    AnalysisRejected(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    /// Generic errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using HiveError
pub type Result<T> = std::result::Result<T, HiveError>;

impl HiveError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        HiveError::Internal(msg.into())
    }

    /// Whether the error stems from caller input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HiveError::InvalidCredentials
                | HiveError::StudentNotFound(_)
                | HiveError::AlreadyGrouped(..)
                | HiveError::InvalidPeerNode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HiveError::StudentNotFound(42);
        assert_eq!(err.to_string(), "Student 42 not found");

        let err = HiveError::AlreadyGrouped(3, "Calculus Help".to_string());
        assert_eq!(err.to_string(), "Student 3 is already in peer node Calculus Help");
    }

    #[test]
    fn test_error_helpers() {
        let err = HiveError::internal("Something went wrong");
        assert!(matches!(err, HiveError::Internal(_)));
        assert!(!err.is_client_error());
        assert!(HiveError::InvalidPeerNode.is_client_error());
    }

    #[test]
    fn test_serialization_failure_is_server_side() {
        let err: HiveError = serde_json::from_str::<u8>("not a number").unwrap_err().into();
        assert!(matches!(err, HiveError::SerializationFailed(_)));
        assert!(!err.is_client_error());
    }
}
