//! Convergence and reachability wait helpers.

use std::net::IpAddr;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::api::{AgentProbe, ClusterApi, NetworkInterface, VmRef};
use crate::bootstrap::Bootstrap;
use crate::error::DriverError;
use crate::events::EventSink;
use crate::poll::{PollPolicy, poll_until};

use super::ProxmoxDriver;

impl<C, E, B> ProxmoxDriver<C, E, B>
where
    C: ClusterApi,
    E: EventSink,
    B: Bootstrap,
{
    /// Waits until the VM reports `target` as its status.
    ///
    /// The status is fetched fresh on every iteration; it is mutated both by
    /// this driver's own in-flight operation and by independent external
    /// actors, so no caching is permitted. When the VM already reports the
    /// target, the call returns success on the first check without sleeping.
    /// Transport failures during an iteration are logged and treated as an
    /// absent observation.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Timeout`] when the status does not converge
    /// within the policy budget.
    pub async fn wait_for_status(
        &self,
        vm: &VmRef,
        target: &str,
        policy: &PollPolicy,
    ) -> Result<(), DriverError> {
        let phase = format!("VM {} to report status '{target}'", vm.vmid);
        poll_until(policy, phase, || async move {
            match self.api.current_status(vm).await {
                Ok(status) if status.as_str() == target => Ok(Some(())),
                Ok(status) => {
                    tracing::debug!(
                        vmid = vm.vmid,
                        observed = status.as_str(),
                        expected = target,
                        "status not yet converged"
                    );
                    Ok(None)
                }
                Err(DriverError::Transport { message }) => {
                    tracing::warn!(vmid = vm.vmid, error = %message, "status fetch failed, retrying");
                    Ok(None)
                }
                Err(other) => Err(other),
            }
        })
        .await
    }

    /// Waits for the guest agent to produce an interface report.
    ///
    /// The agent endpoint answers with a distinguished "not ready" signal
    /// until the in-guest service is reachable; that signal keeps the poll
    /// going rather than failing it.
    pub(in crate::driver) async fn wait_for_agent_interfaces(
        &self,
        vm: &VmRef,
        policy: &PollPolicy,
    ) -> Result<Vec<NetworkInterface>, DriverError> {
        let phase = format!("guest agent on VM {} to report interfaces", vm.vmid);
        poll_until(policy, phase, || async move {
            match self.api.agent_interfaces(vm).await {
                Ok(AgentProbe::Ready(interfaces)) => Ok(Some(interfaces)),
                Ok(AgentProbe::NotReady) => {
                    tracing::debug!(vmid = vm.vmid, "guest agent not answering yet");
                    Ok(None)
                }
                Err(DriverError::Transport { message }) => {
                    tracing::warn!(vmid = vm.vmid, error = %message, "agent probe failed, retrying");
                    Ok(None)
                }
                Err(other) => Err(other),
            }
        })
        .await
    }

    /// Probes the SSH port a bounded number of times with a fixed backoff.
    pub(in crate::driver) async fn wait_for_ssh(&self, address: IpAddr) -> Result<(), DriverError> {
        let policies = &self.policies;
        for attempt in 1..=policies.ssh_attempts {
            let connect = timeout(
                policies.ssh_connect_timeout,
                TcpStream::connect((address, self.ssh_port)),
            )
            .await;
            if matches!(connect, Ok(Ok(_))) {
                return Ok(());
            }
            tracing::debug!(
                %address,
                port = self.ssh_port,
                attempt,
                attempts = policies.ssh_attempts,
                "SSH port not reachable yet"
            );
            if attempt < policies.ssh_attempts {
                sleep(policies.ssh_backoff).await;
            }
        }

        let budget = policies
            .ssh_connect_timeout
            .saturating_add(policies.ssh_backoff)
            .saturating_mul(policies.ssh_attempts);
        Err(DriverError::Timeout {
            phase: format!("SSH port {} on {address} to accept connections", self.ssh_port),
            limit: budget,
        })
    }
}
