use thiserror::Error;

/// Core error types for sgsync
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The provider rejected or failed a call
    #[error("gateway error ({code}): {message}")]
    Gateway { code: String, message: String },

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Stored spec operation failed
    #[error("Spec error: {0}")]
    Spec(#[from] SpecError),

    /// Internal logic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn gateway(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Gateway {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Stored spec errors
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("Invalid spec name: {0}")]
    InvalidName(String),

    #[error("Spec not found: {0}")]
    NotFound(String),

    #[error("Data directory not available")]
    DataDirUnavailable,
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Known provider error codes and their translations
pub struct GatewayErrorPattern;

impl GatewayErrorPattern {
    /// Matches a provider error code or message against known patterns.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        if lower.contains("invalidgroup.notfound") {
            return ErrorTranslation::new("Security group does not exist")
                .with_suggestion("Check the group name or id and the region")
                .with_suggestion("Use `sgsync create` to provision a new group");
        }

        if lower.contains("invalidgroup.duplicate") {
            return ErrorTranslation::new("A security group with this name already exists")
                .with_suggestion("Group names are unique per network")
                .with_suggestion("Use `sgsync update` to reconcile the existing group");
        }

        if lower.contains("invalidpermission.duplicate") {
            return ErrorTranslation::new("Rule source is already authorized")
                .with_suggestion("Live state changed since it was fetched")
                .with_suggestion("Run `sgsync audit` again to recompute the diff");
        }

        if lower.contains("invalidpermission.notfound") {
            return ErrorTranslation::new("Rule to revoke is not present in the group")
                .with_suggestion("Live state changed since it was fetched")
                .with_suggestion("Run `sgsync audit` again to recompute the diff");
        }

        if lower.contains("invalidpermission.malformed") {
            return ErrorTranslation::new("Provider returned a rule sgsync cannot represent")
                .with_suggestion("Only tcp, udp and icmp rules are supported")
                .with_suggestion("Remove the rule manually or edit the state document");
        }

        if lower.contains("unauthorized") || lower.contains("permission denied") {
            return ErrorTranslation::new("Insufficient permissions for the provider call")
                .with_suggestion("Check the access rights of the state document")
                .with_suggestion("Verify the configured region and state file path");
        }

        if lower.contains("requestlimitexceeded") || lower.contains("throttl") {
            return ErrorTranslation::new("Provider request rate exceeded")
                .with_suggestion("Wait a moment and run the command again");
        }

        if lower.contains("json error") || lower.contains("expected value") {
            return ErrorTranslation::new("State document is not valid JSON")
                .with_suggestion("Inspect the state file for manual edits")
                .with_suggestion("Restore it from a backup or delete it to start empty");
        }

        ErrorTranslation::new(format!("Gateway error: {msg}"))
            .with_suggestion("Run with --verbose for the full call log")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_not_found() {
        let translation = GatewayErrorPattern::match_error("InvalidGroup.NotFound: sg-123");
        assert!(translation.user_message.contains("does not exist"));
        assert!(translation.suggestions.iter().any(|s| s.contains("create")));
    }

    #[test]
    fn test_duplicate_permission() {
        let translation = GatewayErrorPattern::match_error(
            &Error::gateway("InvalidPermission.Duplicate", "10.0.0.0/8").to_string(),
        );
        assert!(translation.user_message.contains("already authorized"));
        assert!(translation.suggestions.iter().any(|s| s.contains("audit")));
    }

    #[test]
    fn test_duplicate_group() {
        let translation = GatewayErrorPattern::match_error("InvalidGroup.Duplicate");
        assert!(translation.user_message.contains("already exists"));
    }

    #[test]
    fn test_generic_fallback() {
        let translation = GatewayErrorPattern::match_error("something odd");
        assert!(translation.user_message.contains("something odd"));
        assert!(!translation.suggestions.is_empty());
    }

    #[test]
    fn test_gateway_error_display() {
        let err = Error::gateway("InvalidGroup.NotFound", "web");
        assert_eq!(err.to_string(), "gateway error (InvalidGroup.NotFound): web");
    }
}
