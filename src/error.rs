//! Error taxonomy for the lifecycle driver.
//!
//! The driver reports every failure through a small closed set of variants:
//! resolution failures, poll-phase timeouts, calling-convention misuse,
//! transport failures, and configuration problems. Transport failures that
//! occur inside a bounded retry loop (directory lookup, status polling) are
//! logged and treated as an absent observation rather than surfaced; the
//! loop then converts exhaustion into [`DriverError::NotFound`] or
//! [`DriverError::Timeout`].

use std::time::Duration;

use crate::bootstrap::BootstrapError;
use crate::config::ConfigError;
use thiserror::Error;

/// Errors raised by the lifecycle driver.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DriverError {
    /// Raised when a named or identified resource could not be resolved
    /// after the retry budget was exhausted, or when a freshly created VM
    /// exposes no usable IPv4 address.
    #[error("{resource} could not be found")]
    NotFound {
        /// Description of the resource that failed to resolve.
        resource: String,
    },
    /// Raised when a poll phase exceeds its wall-clock budget.
    #[error("timed out after {}s waiting for {phase}", limit.as_secs())]
    Timeout {
        /// The wait phase that expired.
        phase: String,
        /// The configured wall-clock budget for the phase.
        limit: Duration,
    },
    /// Raised when an operation is invoked with an argument shape it cannot
    /// act on, such as a creation request without a source template.
    #[error("operation '{operation}' invoked incorrectly: {reason}")]
    InvalidInvocation {
        /// Name of the misused operation.
        operation: String,
        /// What was wrong with the invocation.
        reason: String,
    },
    /// Raised when a request to the cluster API fails outside a retrying
    /// loop: network errors, non-success HTTP statuses, or unparsable
    /// payloads.
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the underlying failure.
        message: String,
    },
    /// Raised when the bootstrap collaborator reports a failure.
    #[error("bootstrap failed: {message}")]
    Bootstrap {
        /// Message reported by the collaborator.
        message: String,
    },
    /// Raised when configuration loading or validation fails.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DriverError {
    /// Builds a [`DriverError::Transport`] from any displayable failure.
    pub(crate) fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<ConfigError> for DriverError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<BootstrapError> for DriverError {
    fn from(value: BootstrapError) -> Self {
        Self::Bootstrap {
            message: value.message,
        }
    }
}
