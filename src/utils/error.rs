use crate::domain::model::{Cart, UserError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Cart validation failed: {}", format_user_errors(.errors))]
    ValidationError {
        errors: Vec<UserError>,
        /// Partial cart returned alongside the user errors, if any.
        cart: Option<Box<Cart>>,
    },

    #[error("Unexpected response from cart API: {message}")]
    ProtocolError { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Missing required field: {field}")]
    MissingFieldError { field: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Background task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),

    #[error("Checkout session has ended")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, CheckoutError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Remote,
    Input,
    Configuration,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

fn format_user_errors(errors: &[UserError]) -> String {
    if errors.is_empty() {
        return "no details".to_string();
    }
    errors
        .iter()
        .map(|e| match &e.code {
            Some(code) => format!("{} ({}) at [{}]", e.message, code, e.field.join(".")),
            None => format!("{} at [{}]", e.message, e.field.join(".")),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl CheckoutError {
    pub fn protocol(message: impl Into<String>) -> Self {
        CheckoutError::ProtocolError {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        CheckoutError::NetworkError {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        CheckoutError::InvalidInput {
            message: message.into(),
        }
    }

    /// User errors carried by a `ValidationError`, in server order.
    pub fn user_errors(&self) -> &[UserError] {
        match self {
            CheckoutError::ValidationError { errors, .. } => errors,
            _ => &[],
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CheckoutError::ApiError(_) | CheckoutError::NetworkError { .. } => {
                ErrorCategory::Network
            }
            CheckoutError::ValidationError { .. } | CheckoutError::ProtocolError { .. } => {
                ErrorCategory::Remote
            }
            CheckoutError::InvalidInput { .. } | CheckoutError::MissingFieldError { .. } => {
                ErrorCategory::Input
            }
            CheckoutError::ConfigError { .. }
            | CheckoutError::ConfigValidationError { .. }
            | CheckoutError::MissingConfigError { .. }
            | CheckoutError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            CheckoutError::IoError(_)
            | CheckoutError::SerializationError(_)
            | CheckoutError::TaskError(_)
            | CheckoutError::SessionClosed => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CheckoutError::ValidationError { .. }
            | CheckoutError::InvalidInput { .. }
            | CheckoutError::MissingFieldError { .. } => ErrorSeverity::Low,
            CheckoutError::ApiError(_)
            | CheckoutError::NetworkError { .. }
            | CheckoutError::SessionClosed => ErrorSeverity::Medium,
            CheckoutError::ProtocolError { .. }
            | CheckoutError::ConfigError { .. }
            | CheckoutError::ConfigValidationError { .. }
            | CheckoutError::MissingConfigError { .. }
            | CheckoutError::InvalidConfigValueError { .. } => ErrorSeverity::High,
            CheckoutError::IoError(_)
            | CheckoutError::SerializationError(_)
            | CheckoutError::TaskError(_) => ErrorSeverity::Critical,
        }
    }

    /// Whether a caller may reasonably try the same operation again.
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            CheckoutError::ApiError(e) => e.is_timeout() || e.is_connect(),
            CheckoutError::NetworkError { .. } => true,
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            CheckoutError::ApiError(_) => {
                "Check network connectivity and the storefront endpoint".to_string()
            }
            CheckoutError::NetworkError { .. } => {
                "Try again later or continue in the web checkout".to_string()
            }
            CheckoutError::ValidationError { .. } => {
                "Correct the highlighted fields and try again".to_string()
            }
            CheckoutError::ProtocolError { .. } => {
                "Check that the configured API version matches the storefront".to_string()
            }
            CheckoutError::InvalidInput { .. } | CheckoutError::MissingFieldError { .. } => {
                "Provide the missing contact details".to_string()
            }
            CheckoutError::ConfigError { .. }
            | CheckoutError::ConfigValidationError { .. }
            | CheckoutError::MissingConfigError { .. }
            | CheckoutError::InvalidConfigValueError { .. } => {
                "Review the configuration file and environment variables".to_string()
            }
            CheckoutError::IoError(_) => "Check file paths and permissions".to_string(),
            CheckoutError::SerializationError(_) => {
                "Check that the input file is valid JSON".to_string()
            }
            CheckoutError::TaskError(_) => "Report the failure with the logs attached".to_string(),
            CheckoutError::SessionClosed => "Start a new wallet payment".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            CheckoutError::ValidationError { errors, .. } => match errors.first() {
                Some(first) if errors.len() == 1 => first.message.clone(),
                Some(first) => format!("{} (and {} more)", first.message, errors.len() - 1),
                None => "The cart rejected the request".to_string(),
            },
            CheckoutError::ApiError(_) | CheckoutError::NetworkError { .. } => {
                "Could not reach the store. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}
