use thiserror::Error;

/// Failure talking to the remote backend.
///
/// Timeouts are one more cause here; nothing upstream treats them differently
/// from any other failed round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("backend returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("backend rejected the request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Short, user-facing wording for notifications.
    pub fn user_message(&self) -> String {
        match self {
            RemoteError::Status { code, .. } if *code >= 500 => {
                "The server encountered an error".to_string()
            }
            RemoteError::Status { message, .. } | RemoteError::Rejected(message) => {
                message.clone()
            }
            RemoteError::Transport(_) => "The server could not be reached".to_string(),
            RemoteError::Timeout => "The server took too long to respond".to_string(),
            RemoteError::Decode(_) => "The server sent an unexpected response".to_string(),
        }
    }
}

/// Top-level error type for shared infrastructure (config, I/O, remote).
///
/// Component crates define their own error enums and convert into or out of
/// this one where they cross boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IsetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl From<toml::de::Error> for IsetError {
    fn from(err: toml::de::Error) -> Self {
        IsetError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for IsetError {
    fn from(err: toml::ser::Error) -> Self {
        IsetError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for IsetError {
    fn from(err: serde_json::Error) -> Self {
        IsetError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for shared infrastructure.
pub type Result<T> = std::result::Result<T, IsetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::Status {
            code: 500,
            message: "Internal server error".into(),
        };
        assert_eq!(err.to_string(), "backend returned 500: Internal server error");
        assert_eq!(RemoteError::Timeout.to_string(), "request timed out");
        assert_eq!(
            RemoteError::Transport("connection refused".into()).to_string(),
            "transport error: connection refused"
        );
    }

    #[test]
    fn test_remote_error_user_message() {
        let server = RemoteError::Status {
            code: 503,
            message: "stack trace".into(),
        };
        assert_eq!(server.user_message(), "The server encountered an error");

        let client = RemoteError::Status {
            code: 400,
            message: "session_id manquant.".into(),
        };
        assert_eq!(client.user_message(), "session_id manquant.");

        assert!(RemoteError::Timeout.user_message().contains("too long"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: IsetError = io_err.into();
        assert!(matches!(err, IsetError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_remote_error_conversion() {
        let err: IsetError = RemoteError::Timeout.into();
        assert!(matches!(err, IsetError::Remote(RemoteError::Timeout)));
        assert_eq!(err.to_string(), "Remote error: request timed out");
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Value>("= nope").unwrap_err();
        let err: IsetError = parse_err.into();
        assert!(matches!(err, IsetError::Config(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: IsetError = parse_err.into();
        assert!(matches!(err, IsetError::Serialization(_)));
    }
}
