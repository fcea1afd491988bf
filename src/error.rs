use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum RustyHubError {
    // Connection errors
    ConnectionError(String),
    WriteTimeout,

    // Hub errors
    HubUnavailable,
    NoChannel { message_id: i64 },

    // Auth errors
    AuthError(String),
    Unauthorized,
    WorkspaceMismatch { requested: i64, bound: i64 },

    // Configuration errors
    ConfigError(String),
}

impl fmt::Display for RustyHubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Self::WriteTimeout => write!(f, "Write deadline exceeded"),
            Self::HubUnavailable => write!(f, "Hub is not running"),
            Self::NoChannel { message_id } => write!(
                f,
                "Message {} has no channel; deliver it to its participants",
                message_id
            ),
            Self::AuthError(msg) => write!(f, "Authentication error: {}", msg),
            Self::Unauthorized => write!(f, "Unauthorized access"),
            Self::WorkspaceMismatch { requested, bound } => write!(
                f,
                "Workspace mismatch: requested {} but session is bound to {}",
                requested, bound
            ),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RustyHubError {}

// Generic result type for RustyHub
pub type Result<T> = std::result::Result<T, RustyHubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_mismatch_message() {
        let err = RustyHubError::WorkspaceMismatch {
            requested: 9,
            bound: 3,
        };
        assert_eq!(
            err.to_string(),
            "Workspace mismatch: requested 9 but session is bound to 3"
        );
    }

    #[test]
    fn test_no_channel_names_the_message() {
        let err = RustyHubError::NoChannel { message_id: 42 };
        assert!(err.to_string().starts_with("Message 42 has no channel"));
    }
}
