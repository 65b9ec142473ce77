//! Cluster directory: resolving VM references from the resource inventory.

use crate::api::{ClusterApi, VmRef};
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
    /// Resolves a VM by display name, retrying until `policy` is exhausted.
    ///
    /// The inventory is fetched fresh on every attempt because newly
    /// submitted operations (a clone in particular) may not be visible
    /// immediately. Names are not unique across the cluster; the first
    /// matching entry wins. Transport failures during an attempt are logged
    /// and count as "not found yet".
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotFound`] when no entry with the given name
    /// appears before the budget runs out.
    pub async fn resolve_by_name(
        &self,
        name: &str,
        policy: &PollPolicy,
    ) -> Result<VmRef, DriverError> {
        let lookup = poll_until(policy, format!("VM '{name}' to appear in inventory"), || {
            async move {
                match self.api.list_vms().await {
                    Ok(resources) => Ok(resources
                        .iter()
                        .find(|resource| resource.name.as_deref() == Some(name))
                        .map(crate::api::ClusterResource::to_ref)),
                    Err(DriverError::Transport { message }) => {
                        tracing::warn!(error = %message, "inventory fetch failed, retrying");
                        Ok(None)
                    }
                    Err(other) => Err(other),
                }
            }
        })
        .await;

        match lookup {
            Ok(vm) => Ok(vm),
            Err(DriverError::Timeout { .. }) => Err(DriverError::NotFound {
                resource: format!("VM named '{name}'"),
            }),
            Err(other) => Err(other),
        }
    }

    /// Resolves a VM by numeric id with a single inventory fetch.
    ///
    /// The id is assumed to be already materialised by the caller, so there
    /// is no retry.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotFound`] immediately when the id is absent
    /// and [`DriverError::Transport`] when the inventory fetch fails.
    pub async fn resolve_by_id(&self, vmid: u32) -> Result<VmRef, DriverError> {
        let resources = self.api.list_vms().await?;
        resources
            .iter()
            .find(|resource| resource.vmid == vmid)
            .map(crate::api::ClusterResource::to_ref)
            .ok_or_else(|| DriverError::NotFound {
                resource: format!("VM with id {vmid}"),
            })
    }
}
