//! Error handling for the key pool.
//!
//! Every fallible operation in the crate returns [`Result`]. Selection and store
//! failures carry the provider and, where one is involved, the credential name so
//! that callers can decide on retries or cross-provider fallback themselves.

pub mod types;

use thiserror::Error;
use tracing::{error, warn};

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String, line: Option<usize> },

    // Credential store
    #[error("{}", not_found_message(provider, key_name.as_deref()))]
    NotFound {
        provider: String,
        key_name: Option<String>,
    },

    #[error("Failed to encrypt key: {message}")]
    EncryptionFailure { message: String },

    #[error("Failed to decrypt key: {message}")]
    DecryptionFailure { message: String },

    // Key selection
    #[error("No enabled keys available for provider {provider}")]
    NoCredentialsAvailable { provider: String },

    #[error("All keys for provider {provider} have exceeded their cost limits")]
    AllCredentialsOverBudget { provider: String },

    #[error("Key {key_name} for provider {provider} is unhealthy and no fallback is available")]
    NoHealthyCredential { provider: String, key_name: String },

    // Dispatch
    #[error("Provider call to {provider} with key {key_name} failed: {message}")]
    Dispatch {
        provider: String,
        key_name: String,
        message: String,
    },

    #[error("Unsupported provider: {provider}")]
    UnsupportedProvider { provider: String },

    #[error("Invalid model: {message}")]
    InvalidModel { message: String },

    #[error("Invalid response format: {message}")]
    ResponseFormat { message: String },

    #[error("HTTP client error: {message}")]
    HttpClient { message: String, status_code: Option<u16> },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    // System errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("IO operation failed: {operation} - {message}")]
    Io { operation: String, message: String },
}

fn not_found_message(provider: &str, key_name: Option<&str>) -> String {
    match key_name {
        Some(name) => format!("Key {name} not found for provider {provider}"),
        None => format!("Provider {provider} not found"),
    }
}

impl AppError {
    /// Create a new configuration validation error
    pub fn config_validation(message: impl Into<String>, field: Option<impl Into<String>>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            field: field.map(Into::into),
        }
    }

    pub fn provider_not_found(provider: impl Into<String>) -> Self {
        Self::NotFound {
            provider: provider.into(),
            key_name: None,
        }
    }

    pub fn key_not_found(provider: impl Into<String>, key_name: impl Into<String>) -> Self {
        Self::NotFound {
            provider: provider.into(),
            key_name: Some(key_name.into()),
        }
    }

    pub fn dispatch(
        provider: impl Into<String>,
        key_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Dispatch {
            provider: provider.into(),
            key_name: key_name.into(),
            message: message.into(),
        }
    }

    pub fn response_format(message: impl Into<String>) -> Self {
        Self::ResponseFormat {
            message: message.into(),
        }
    }

    /// True for failures produced by key selection rather than by I/O.
    pub fn is_key_management(&self) -> bool {
        matches!(
            self,
            Self::NoCredentialsAvailable { .. }
                | Self::AllCredentialsOverBudget { .. }
                | Self::NoHealthyCredential { .. }
        )
    }

    /// Short machine-readable code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigValidation { .. } | Self::ConfigNotFound { .. } | Self::ConfigParse { .. } => {
                "configuration"
            }
            Self::NotFound { .. } => "not_found",
            Self::EncryptionFailure { .. } => "encryption_failure",
            Self::DecryptionFailure { .. } => "decryption_failure",
            Self::NoCredentialsAvailable { .. } => "no_credentials_available",
            Self::AllCredentialsOverBudget { .. } => "all_credentials_over_budget",
            Self::NoHealthyCredential { .. } => "no_healthy_credential",
            Self::Dispatch { .. } => "dispatch_failure",
            Self::UnsupportedProvider { .. } | Self::InvalidModel { .. } => "invalid_request",
            Self::ResponseFormat { .. } => "response_format",
            Self::HttpClient { .. } => "http_client",
            Self::Cancelled { .. } => "cancelled",
            Self::Serialization { .. } | Self::Io { .. } => "internal",
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            Self::Dispatch { .. }
            | Self::HttpClient { .. }
            | Self::DecryptionFailure { .. }
            | Self::EncryptionFailure { .. }
            | Self::Io { .. } => {
                error!(error = %self, error_code = self.code(), "Key pool error occurred");
            }
            _ => {
                warn!(error = %self, error_code = self.code(), "Key pool request failed");
            }
        }
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, AppError>;
