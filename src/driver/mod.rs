//! Lifecycle driver: directory lookup, status polling, lifecycle actions,
//! and the provisioning orchestrator.

mod create;
mod directory;
mod lifecycle;
mod wait;

#[cfg(test)]
mod tests;

use std::time::Duration;

use crate::api::ClusterApi;
use crate::bootstrap::Bootstrap;
use crate::events::EventSink;
use crate::poll::PollPolicy;

pub use create::{CreateOutcome, VmOptions};
pub use lifecycle::{DEFAULT_STORAGE, InstanceDetails, InstanceSummary};

const DEFAULT_SSH_PORT: u16 = 22;

/// Poll policies for every wait phase of the driver.
///
/// Each phase carries its own policy because remote convergence latency
/// differs by operation: a status flip lands within seconds, a guest OS
/// shutdown or agent boot can take minutes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicies {
    /// Budget for a name to appear in the inventory. Newly submitted
    /// operations such as a clone are not visible immediately.
    pub name_lookup: PollPolicy,
    /// Budget for a started VM to report "running".
    pub start: PollPolicy,
    /// Budget for a hard stop to report "stopped".
    pub stop: PollPolicy,
    /// Budget for a cooperative shutdown to report "stopped".
    pub shutdown: PollPolicy,
    /// Budget for a freshly created VM to report "running".
    pub create_running: PollPolicy,
    /// Budget for the guest agent to answer with an interface report.
    /// Tuned for agent startup lag, not VM boot.
    pub agent: PollPolicy,
    /// Number of SSH connection attempts before giving up.
    pub ssh_attempts: u32,
    /// Fixed backoff between SSH attempts.
    pub ssh_backoff: Duration,
    /// Per-attempt TCP connect timeout.
    pub ssh_connect_timeout: Duration,
}

impl Default for PollPolicies {
    fn default() -> Self {
        Self {
            name_lookup: PollPolicy::new(Duration::from_secs(1), Duration::from_secs(60)),
            start: PollPolicy::new(Duration::from_secs(1), Duration::from_secs(300)),
            stop: PollPolicy::new(Duration::from_secs(1), Duration::from_secs(20)),
            shutdown: PollPolicy::new(Duration::from_secs(1), Duration::from_secs(300)),
            create_running: PollPolicy::new(Duration::from_secs(2), Duration::from_secs(60)),
            agent: PollPolicy::new(Duration::from_secs(2), Duration::from_secs(10)),
            ssh_attempts: 5,
            ssh_backoff: Duration::from_secs(1),
            ssh_connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Drives a single VM through its lifecycle against a cluster API.
///
/// Operations are independent of each other and hold no state across calls;
/// a caller may run operations for different VMs concurrently, but
/// serialising operations against the same VM is the caller's
/// responsibility.
#[derive(Clone, Debug)]
pub struct ProxmoxDriver<C, E, B> {
    api: C,
    events: E,
    bootstrap: B,
    ssh_port: u16,
    policies: PollPolicies,
}

impl<C, E, B> ProxmoxDriver<C, E, B>
where
    C: ClusterApi,
    E: EventSink,
    B: Bootstrap,
{
    /// Creates a driver with default poll policies.
    #[must_use]
    pub fn new(api: C, events: E, bootstrap: B) -> Self {
        Self {
            api,
            events,
            bootstrap,
            ssh_port: DEFAULT_SSH_PORT,
            policies: PollPolicies::default(),
        }
    }

    /// Overrides the poll policies.
    ///
    /// This is primarily used by tests to keep timeout scenarios fast.
    #[must_use]
    pub const fn with_policies(mut self, policies: PollPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Overrides the SSH port probed during provisioning.
    #[must_use]
    pub const fn with_ssh_port(mut self, port: u16) -> Self {
        self.ssh_port = port;
        self
    }

    /// Returns the configured poll policies.
    #[must_use]
    pub const fn policies(&self) -> &PollPolicies {
        &self.policies
    }
}
