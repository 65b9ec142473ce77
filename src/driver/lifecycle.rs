//! Power-state actions, teardown, reconfiguration, and the inspect surface.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Serialize;
use serde_json::json;

use crate::api::{ClusterApi, ClusterResource, NodeEntry, StorageItem, VmAction};
use crate::bootstrap::Bootstrap;
use crate::error::DriverError;
use crate::events::EventSink;
use crate::net;

use super::ProxmoxDriver;

/// Storage searched by [`ProxmoxDriver::list_images`] when the caller does
/// not name one; every node carries a storage with this name by default.
pub const DEFAULT_STORAGE: &str = "local";

/// Full details of one VM: its inventory entry plus its configuration map.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceDetails {
    /// The fresh inventory entry.
    pub resource: ClusterResource,
    /// The VM's configuration key/value map.
    pub config: BTreeMap<String, String>,
}

/// Condensed view of one VM for inventory listings.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InstanceSummary {
    /// Cluster-wide numeric identifier.
    pub vmid: u32,
    /// Status token at the time of the listing.
    pub status: String,
    /// Private addresses found in the VM's configuration.
    pub private_ips: Vec<IpAddr>,
    /// Public addresses found in the VM's configuration.
    pub public_ips: Vec<IpAddr>,
}

impl<C, E, B> ProxmoxDriver<C, E, B>
where
    C: ClusterApi,
    E: EventSink,
    B: Bootstrap,
{
    /// Starts the VM and waits until it reports "running".
    ///
    /// The wait budget is long because the guest OS may take a while to
    /// come up.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotFound`] when the name cannot be resolved,
    /// [`DriverError::Timeout`] when the status never converges, and
    /// [`DriverError::Transport`] when the action submission fails.
    pub async fn start(&self, name: &str) -> Result<(), DriverError> {
        let vm = self
            .resolve_by_name(name, &self.policies.name_lookup)
            .await?;
        self.api.submit_action(&vm, VmAction::Start).await?;
        self.wait_for_status(&vm, "running", &self.policies.start)
            .await
    }

    /// Hard-stops the VM and waits until it reports "stopped".
    ///
    /// A hard stop needs no guest cooperation, so the wait budget is short.
    ///
    /// # Errors
    ///
    /// See [`ProxmoxDriver::start`]; the same failure modes apply.
    pub async fn stop(&self, name: &str) -> Result<(), DriverError> {
        let vm = self
            .resolve_by_name(name, &self.policies.name_lookup)
            .await?;
        self.api.submit_action(&vm, VmAction::Stop).await?;
        self.wait_for_status(&vm, "stopped", &self.policies.stop)
            .await
    }

    /// Asks the guest OS to shut down and waits until the VM reports
    /// "stopped".
    ///
    /// # Errors
    ///
    /// See [`ProxmoxDriver::start`]; the same failure modes apply.
    pub async fn shutdown(&self, name: &str) -> Result<(), DriverError> {
        let vm = self
            .resolve_by_name(name, &self.policies.name_lookup)
            .await?;
        self.api.submit_action(&vm, VmAction::Shutdown).await?;
        self.wait_for_status(&vm, "stopped", &self.policies.shutdown)
            .await
    }

    /// Stops and deletes the VM.
    ///
    /// Deletion is only ever submitted after the poller has confirmed the
    /// VM reports "stopped"; a VM that never stops leaves this method with
    /// a timeout and no delete request issued. Emits a "destroying
    /// instance" event immediately before submitting the stop and a
    /// "destroyed instance" event once the delete has completed.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Timeout`] when the VM never reaches
    /// "stopped"; resolution and transport failures propagate unchanged.
    pub async fn destroy(&self, name: &str) -> Result<(), DriverError> {
        let vm = self
            .resolve_by_name(name, &self.policies.name_lookup)
            .await?;
        self.events
            .notify("destroying instance", json!({ "name": name }));
        self.api.submit_action(&vm, VmAction::Stop).await?;
        self.wait_for_status(&vm, "stopped", &self.policies.stop)
            .await?;
        self.api.delete_vm(&vm).await?;
        self.events
            .notify("destroyed instance", json!({ "name": name }));
        Ok(())
    }

    /// Applies a configuration update to the VM.
    ///
    /// The keys and values are passed through to the cluster unchanged; the
    /// cluster's own schema decides what is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotFound`] when the name cannot be resolved
    /// and [`DriverError::Transport`] when the update request fails.
    pub async fn reconfigure(
        &self,
        name: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<(), DriverError> {
        let vm = self
            .resolve_by_name(name, &self.policies.name_lookup)
            .await?;
        self.api.update_vm_config(&vm, params).await
    }

    /// Fetches the details of one VM by name.
    ///
    /// A single inventory fetch, no retry: inspection reports what the
    /// cluster knows right now.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotFound`] when no VM with the given name
    /// exists.
    pub async fn show_instance(&self, name: &str) -> Result<InstanceDetails, DriverError> {
        let resources = self.api.list_vms().await?;
        let resource = resources
            .into_iter()
            .find(|resource| resource.name.as_deref() == Some(name))
            .ok_or_else(|| DriverError::NotFound {
                resource: format!("VM named '{name}'"),
            })?;
        let vm = resource.to_ref();
        let config = self.api.vm_config(&vm).await?;
        Ok(InstanceDetails { resource, config })
    }

    /// Lists the cluster's usable locations: its online nodes, keyed by
    /// node name.
    ///
    /// Nodes that do not report "online" are skipped with a log line; a
    /// node that is down cannot host anything the caller could act on.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Transport`] when the node listing fails.
    pub async fn list_locations(&self) -> Result<BTreeMap<String, NodeEntry>, DriverError> {
        let nodes = self.api.list_nodes().await?;
        let mut locations = BTreeMap::new();
        for node in nodes {
            if node.is_online() {
                locations.insert(node.node.clone(), node);
            } else {
                tracing::warn!(node = %node.node, "ignoring node that is not online");
            }
        }
        Ok(locations)
    }

    /// Lists the images available on the named storage, per online node.
    ///
    /// Each online node's storage content is fetched and keyed by volume
    /// id. The listing is not filtered by content class; templates, ISOs,
    /// and disk images all appear.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Transport`] when a node or storage listing
    /// fails.
    pub async fn list_images(
        &self,
        storage: &str,
    ) -> Result<BTreeMap<String, BTreeMap<String, StorageItem>>, DriverError> {
        let mut images = BTreeMap::new();
        for node in self.list_locations().await?.into_keys() {
            let items = self.api.storage_content(&node, storage).await?;
            let volumes = items
                .into_iter()
                .map(|item| (item.volid.clone(), item))
                .collect();
            images.insert(node, volumes);
        }
        Ok(images)
    }

    /// Lists all VMs the cluster manages, keyed by name.
    ///
    /// Entries without a display name are skipped with a log line. Each
    /// VM's configuration is fetched to classify its addresses.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Transport`] when an inventory or
    /// configuration fetch fails.
    pub async fn list_instances(
        &self,
    ) -> Result<BTreeMap<String, InstanceSummary>, DriverError> {
        let resources = self.api.list_vms().await?;
        let mut instances = BTreeMap::new();
        for resource in resources {
            let Some(name) = resource.name.clone().filter(|name| !name.is_empty()) else {
                tracing::debug!(vmid = resource.vmid, "skipping unnamed inventory entry");
                continue;
            };
            let vm = resource.to_ref();
            let config = self.api.vm_config(&vm).await?;
            let addresses = net::parse_ip_configs(&config, vm.kind);
            instances.insert(
                name,
                InstanceSummary {
                    vmid: resource.vmid,
                    status: resource.status.unwrap_or_default(),
                    private_ips: addresses.private,
                    public_ips: addresses.public,
                },
            );
        }
        Ok(instances)
    }
}
