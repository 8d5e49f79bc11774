use serde::Serialize;
use thiserror::Error;

/// Unified error type for the triage library.
///
/// Serializes to `{"type": ..., "details": {...}}` so JSON callers can
/// branch on the kind of failure.
#[derive(Error, Debug, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Escalation error: {message}")]
    Escalation { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid input: {message}")]
    Invalid { message: String },

    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },
}

impl AppError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn escalation(message: impl Into<String>) -> Self {
        Self::Escalation {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Whether retrying (or fixing the environment) can help.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Locked database, flaky network, slow reasoner
            Self::Storage { .. } | Self::Escalation { .. } | Self::Io { .. } => true,
            // Same input fails the same way
            Self::Config { .. } | Self::NotFound { .. } | Self::Invalid { .. } | Self::Parse { .. } => {
                false
            }
        }
    }
}

impl From<crate::taxonomy::StoreError> for AppError {
    fn from(err: crate::taxonomy::StoreError) -> Self {
        use crate::taxonomy::StoreError;
        match err {
            StoreError::Sqlite(e) => AppError::storage(format!("SQLite: {e}")),
            StoreError::Io(e) => AppError::io(e.to_string()),
            StoreError::Invalid(msg) => AppError::invalid(msg),
            StoreError::NotFound(resource) => AppError::not_found(resource),
            StoreError::Poisoned => AppError::storage("Store lock poisoned"),
        }
    }
}

impl From<crate::taxonomy::SourceError> for AppError {
    fn from(err: crate::taxonomy::SourceError) -> Self {
        use crate::taxonomy::SourceError;
        match err {
            SourceError::Unavailable(msg) => AppError::storage(msg),
            SourceError::Store(e) => e.into(),
            SourceError::Dictionary(e) => e.into(),
        }
    }
}

impl From<crate::taxonomy::dictionary::DictionaryError> for AppError {
    fn from(err: crate::taxonomy::dictionary::DictionaryError) -> Self {
        use crate::taxonomy::dictionary::DictionaryError;
        match err {
            DictionaryError::Io(e) => AppError::io(e.to_string()),
            DictionaryError::Json(e) => AppError::parse(format!("Dictionary: {e}")),
        }
    }
}

impl From<crate::escalate::EscalationError> for AppError {
    fn from(err: crate::escalate::EscalationError) -> Self {
        use crate::escalate::EscalationError;
        match err {
            EscalationError::Io(e) => AppError::io(e.to_string()),
            EscalationError::MissingApiKey(var) => {
                AppError::config(format!("Environment variable {var} is not set"))
            }
            other => AppError::escalation(other.to_string()),
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::Io(e) => AppError::io(e.to_string()),
            ConfigError::Json(e) => AppError::parse(format!("Config: {e}")),
            ConfigError::Invalid(msg) => AppError::config(msg),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::parse(err.to_string())
    }
}

// CLI commands return Result<(), String>
impl From<AppError> for String {
    fn from(err: AppError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::StoreError;

    #[test]
    fn test_error_serialization() {
        let err = AppError::not_found("issue category 'ac'");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"NotFound\""));
        assert!(json.contains("\"resource\":\"issue category 'ac'\""));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(AppError::storage("database is locked").is_recoverable());
        assert!(AppError::escalation("timeout").is_recoverable());
        assert!(!AppError::config("bad reasoner kind").is_recoverable());
        assert!(!AppError::not_found("keyword 4").is_recoverable());
        assert!(!AppError::parse("unexpected token").is_recoverable());
    }

    #[test]
    fn test_store_error_conversion() {
        let err: AppError = StoreError::NotFound("keyword 9".to_owned()).into();
        match err {
            AppError::NotFound { resource } => assert_eq!(resource, "keyword 9"),
            _ => panic!("Wrong variant"),
        }

        let err: AppError = StoreError::Invalid("keywords array is required".to_owned()).into();
        assert!(matches!(err, AppError::Invalid { .. }));
    }

    #[test]
    fn test_escalation_error_conversion() {
        use crate::escalate::EscalationError;

        let err: AppError = EscalationError::MissingApiKey("GROQ_API_KEY".to_owned()).into();
        assert!(matches!(err, AppError::Config { .. }));

        let err: AppError = EscalationError::Timeout(300).into();
        assert!(matches!(err, AppError::Escalation { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_into_string() {
        let message: String = AppError::io("disk full").into();
        assert_eq!(message, "IO error: disk full");
    }
}
