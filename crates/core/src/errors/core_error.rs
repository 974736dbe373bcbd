use std::sync::Arc;
use thiserror::Error;

use crate::config::ConfigError;
use crate::container::scope::ScopeKind;

/// Broad classification of a [`CoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested id is absent from the definition table
    NotFound,
    /// Malformed definition: excess args, unknown type, bad callable, wrong argument type
    Configuration,
    /// A cycle was found in a resolution stack
    Recursion,
    /// A new dependency was requested after scope teardown began
    CleanupViolation,
    /// A constructor factory reported a failure
    Construction,
}

impl ErrorKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Recursion => "recursion",
            ErrorKind::CleanupViolation => "cleanup_violation",
            ErrorKind::Construction => "construction",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Core error type for the container
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("The requested dependency {id} is not defined")]
    ServiceNotFound { id: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("A recursion detected while loading dependency {id}. The dependency stack so far is [{}]", .stack.join(", "))]
    RecursionDetected { id: String, stack: Vec<String> },

    #[error("The {scope} context {context} is in dependency cleanup and a new dependency {id} was requested")]
    CleanupViolation {
        scope: ScopeKind,
        context: String,
        id: String,
    },

    #[error("Resolution depth limit of {depth} exceeded while loading dependency {id}. The dependency stack so far is [{}]", .stack.join(", "))]
    ResolutionDepthExceeded {
        id: String,
        depth: usize,
        stack: Vec<String>,
    },

    #[error("Service initialization failed for '{service_type}': {source}")]
    ServiceInitializationFailed {
        service_type: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new service not found error
    pub fn service_not_found(id: impl Into<String>) -> Self {
        Self::ServiceNotFound { id: id.into() }
    }

    /// Create a wrong-argument-type error
    pub fn wrong_type(
        argument: &str,
        class_name: &str,
        expected: &str,
        actual: &str,
    ) -> Self {
        Self::configuration(format!(
            "wrong type for argument {} on dependency {}: expected {}, got {}",
            argument, class_name, expected, actual
        ))
    }

    /// Create a construction failure from any error the factory produced
    pub fn initialization_failed(
        service_type: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::ServiceInitializationFailed {
            service_type: service_type.into(),
            source: source.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ServiceNotFound { .. } => ErrorKind::NotFound,
            Self::Configuration { .. } | Self::ResolutionDepthExceeded { .. } | Self::Config(_) => {
                ErrorKind::Configuration
            }
            Self::RecursionDetected { .. } => ErrorKind::Recursion,
            Self::CleanupViolation { .. } => ErrorKind::CleanupViolation,
            Self::ServiceInitializationFailed { .. } => ErrorKind::Construction,
        }
    }

    /// Check if the error is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ServiceNotFound { .. })
    }

    /// Check if the error belongs to the container error family (everything except not-found)
    pub fn is_container_error(&self) -> bool {
        !self.is_not_found()
    }

    /// Check if the error is a configuration error
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// Check if the error reports a resolution cycle
    pub fn is_recursion(&self) -> bool {
        matches!(self, Self::RecursionDetected { .. })
    }

    /// Check if the error reports a request made during scope cleanup
    pub fn is_cleanup_violation(&self) -> bool {
        matches!(self, Self::CleanupViolation { .. })
    }

    /// The resolution stack carried by recursion and depth errors
    pub fn resolution_stack(&self) -> Option<&[String]> {
        match self {
            Self::RecursionDetected { stack, .. } | Self::ResolutionDepthExceeded { stack, .. } => {
                Some(stack)
            }
            _ => None,
        }
    }
}

/// Translation hook applied to every error leaving the public `get` boundary
pub type ErrorHook = Arc<dyn Fn(CoreError) -> CoreError + Send + Sync>;
