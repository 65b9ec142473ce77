//! Post-provision bootstrap boundary.
//!
//! Once a freshly created VM is running, has a discovered IPv4 address, and
//! answers on its SSH port, the driver hands control to this collaborator.
//! What the bootstrap actually does (key installation, agent enrolment) is
//! the embedding tool's business; the driver only forwards the VM options
//! and the resolved address, and merges the returned record into the
//! creation outcome.

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use thiserror::Error;

use crate::driver::VmOptions;

/// Failure reported by a bootstrap collaborator.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct BootstrapError {
    /// Description of what went wrong on the far side.
    pub message: String,
}

/// Future returned by bootstrap operations.
pub type BootstrapFuture<'a> =
    Pin<Box<dyn Future<Output = Result<serde_json::Value, BootstrapError>> + Send + 'a>>;

/// Executes post-provision configuration against a reachable VM.
pub trait Bootstrap: Send + Sync {
    /// Bootstraps the VM at `address` and returns the collaborator's result
    /// record.
    fn bootstrap<'a>(&'a self, options: &'a VmOptions, address: IpAddr) -> BootstrapFuture<'a>;
}
