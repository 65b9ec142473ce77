//! Cluster API seam: the trait the driver polls against and its wire types.

mod http;
mod types;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::DriverError;

pub use http::ProxmoxApi;
pub use types::{
    AddressType, AgentAddress, AgentProbe, CloneOptions, CloneRequest, ClusterResource,
    NetworkInterface, NodeEntry, StorageItem, VmAction, VmKind, VmRef, VmStatus,
};

/// Future returned by cluster API operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DriverError>> + Send + 'a>>;

/// Operations the driver performs against the cluster management API.
///
/// The driver is generic over this trait so the orchestration state machine
/// can be exercised without a live cluster. Every method maps to exactly one
/// REST call; retries and timeouts live above this seam.
pub trait ClusterApi: Send + Sync {
    /// Fetches the full VM and container inventory.
    fn list_vms(&self) -> ApiFuture<'_, Vec<ClusterResource>>;

    /// Asks the cluster for a hint at the next free VM identifier.
    fn next_vmid(&self) -> ApiFuture<'_, u32>;

    /// Fetches the cluster's node listing.
    fn list_nodes(&self) -> ApiFuture<'_, Vec<NodeEntry>>;

    /// Fetches the content listing of one storage on one node.
    fn storage_content<'a>(
        &'a self,
        node: &'a str,
        storage: &'a str,
    ) -> ApiFuture<'a, Vec<StorageItem>>;

    /// Fetches the configuration key/value map for a VM.
    fn vm_config<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, BTreeMap<String, String>>;

    /// Applies a configuration update to a VM.
    fn update_vm_config<'a>(
        &'a self,
        vm: &'a VmRef,
        params: &'a BTreeMap<String, String>,
    ) -> ApiFuture<'a, ()>;

    /// Fetches the current status token for a VM.
    ///
    /// Implementations must perform a fresh remote fetch on every call:
    /// status is mutated both by this driver's in-flight operation and by
    /// independent external actors, so caching is never permitted.
    fn current_status<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, VmStatus>;

    /// Submits a power-state action for a VM.
    fn submit_action<'a>(&'a self, vm: &'a VmRef, action: VmAction) -> ApiFuture<'a, ()>;

    /// Submits a clone request against the given source VM.
    fn clone_vm<'a>(&'a self, source: &'a VmRef, request: &'a CloneRequest) -> ApiFuture<'a, ()>;

    /// Deletes a VM. Callers must have confirmed the VM is stopped.
    fn delete_vm<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, ()>;

    /// Probes the guest agent for the VM's network interfaces.
    fn agent_interfaces<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, AgentProbe>;
}
