//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here are scripted rather than mocked: a test seeds the
//! replies it wants, runs the driver, and then inspects the recorded
//! invocations. Scripted reply queues repeat their final entry, so a
//! single seeded status models a VM that stays in that state forever.
//! Transport failures queue the same way, modelling a flaky network link
//! that recovers on a later attempt.

use std::collections::{BTreeMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use crate::api::{
    AgentProbe, ApiFuture, CloneRequest, ClusterApi, ClusterResource, NodeEntry, StorageItem,
    VmAction, VmKind, VmRef, VmStatus,
};
use crate::bootstrap::{Bootstrap, BootstrapError, BootstrapFuture};
use crate::driver::VmOptions;
use crate::events::EventSink;

/// Builds an inventory entry for tests.
#[must_use]
pub fn resource(vmid: u32, node: &str, kind: VmKind, name: &str, status: &str) -> ClusterResource {
    ClusterResource {
        vmid,
        node: node.to_owned(),
        kind,
        name: (!name.is_empty()).then(|| name.to_owned()),
        status: Some(status.to_owned()),
    }
}

/// One recorded invocation against [`ScriptedCluster`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApiCall {
    /// The inventory was listed.
    ListVms,
    /// The next-id hint was requested.
    NextVmid,
    /// The node listing was fetched.
    ListNodes,
    /// A storage content listing was fetched.
    StorageContent {
        /// Node the storage belongs to.
        node: String,
        /// Storage name.
        storage: String,
    },
    /// A VM's configuration was fetched.
    VmConfig(u32),
    /// A VM's configuration was updated.
    UpdateConfig(u32),
    /// A VM's current status was fetched.
    CurrentStatus(u32),
    /// A power-state action was submitted.
    Action {
        /// Target VM id.
        vmid: u32,
        /// Submitted action.
        action: VmAction,
    },
    /// A clone was submitted.
    Clone {
        /// Source VM id.
        source_vmid: u32,
        /// The full clone request.
        request: CloneRequest,
    },
    /// A VM was deleted.
    Delete(u32),
    /// The guest agent was probed for interfaces.
    AgentInterfaces(u32),
}

/// Scripted reply: a seeded value or a transport failure message.
type Scripted<T> = Result<T, String>;

fn deliver<T>(reply: Scripted<T>) -> Result<T, crate::error::DriverError> {
    reply.map_err(|message| crate::error::DriverError::Transport { message })
}

#[derive(Debug, Default)]
struct ClusterScript {
    inventories: VecDeque<Scripted<Vec<ClusterResource>>>,
    statuses: VecDeque<Scripted<String>>,
    agent_probes: VecDeque<Scripted<AgentProbe>>,
    next_vmid: u32,
    configs: BTreeMap<u32, BTreeMap<String, String>>,
    nodes: Vec<NodeEntry>,
    storage: BTreeMap<(String, String), Vec<StorageItem>>,
    calls: Vec<ApiCall>,
}

impl ClusterScript {
    /// Pops the next scripted reply, repeating the final entry forever.
    fn advance<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

/// Scripted in-memory cluster implementing [`ClusterApi`].
///
/// Clones share state, so a test can keep one handle for seeding and
/// assertions while the driver owns another.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCluster {
    state: Arc<Mutex<ClusterScript>>,
}

impl ScriptedCluster {
    fn lock(&self) -> MutexGuard<'_, ClusterScript> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queues one inventory reply for `list_vms`.
    pub fn push_inventory(&self, resources: Vec<ClusterResource>) {
        self.lock().inventories.push_back(Ok(resources));
    }

    /// Queues one transport failure for `list_vms`.
    pub fn push_inventory_failure(&self, message: &str) {
        self.lock().inventories.push_back(Err(message.to_owned()));
    }

    /// Queues one status reply for `current_status`.
    pub fn push_status(&self, status: &str) {
        self.lock().statuses.push_back(Ok(status.to_owned()));
    }

    /// Queues one transport failure for `current_status`.
    pub fn push_status_failure(&self, message: &str) {
        self.lock().statuses.push_back(Err(message.to_owned()));
    }

    /// Queues one guest-agent reply.
    pub fn push_agent_probe(&self, probe: AgentProbe) {
        self.lock().agent_probes.push_back(Ok(probe));
    }

    /// Queues one transport failure for the guest-agent probe.
    pub fn push_agent_failure(&self, message: &str) {
        self.lock().agent_probes.push_back(Err(message.to_owned()));
    }

    /// Sets the id hint returned by `next_vmid`.
    pub fn set_next_vmid(&self, vmid: u32) {
        self.lock().next_vmid = vmid;
    }

    /// Seeds the configuration map returned for a VM.
    pub fn set_config(&self, vmid: u32, config: BTreeMap<String, String>) {
        self.lock().configs.insert(vmid, config);
    }

    /// Seeds the node listing.
    pub fn set_nodes(&self, nodes: Vec<NodeEntry>) {
        self.lock().nodes = nodes;
    }

    /// Seeds the content listing of one storage on one node.
    pub fn set_storage_content(&self, node: &str, storage: &str, items: Vec<StorageItem>) {
        self.lock()
            .storage
            .insert((node.to_owned(), storage.to_owned()), items);
    }

    /// Returns every recorded invocation in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Returns how many status fetches were recorded.
    #[must_use]
    pub fn status_fetches(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, ApiCall::CurrentStatus(_)))
            .count()
    }

    /// Reports whether a delete was ever submitted.
    #[must_use]
    pub fn saw_delete(&self) -> bool {
        self.lock()
            .calls
            .iter()
            .any(|call| matches!(call, ApiCall::Delete(_)))
    }
}

impl ClusterApi for ScriptedCluster {
    fn list_vms(&self) -> ApiFuture<'_, Vec<ClusterResource>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ApiCall::ListVms);
            let inventory =
                ClusterScript::advance(&mut state.inventories).unwrap_or_else(|| Ok(Vec::new()));
            deliver(inventory)
        })
    }

    fn next_vmid(&self) -> ApiFuture<'_, u32> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ApiCall::NextVmid);
            Ok(state.next_vmid)
        })
    }

    fn list_nodes(&self) -> ApiFuture<'_, Vec<NodeEntry>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ApiCall::ListNodes);
            Ok(state.nodes.clone())
        })
    }

    fn storage_content<'a>(
        &'a self,
        node: &'a str,
        storage: &'a str,
    ) -> ApiFuture<'a, Vec<StorageItem>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ApiCall::StorageContent {
                node: node.to_owned(),
                storage: storage.to_owned(),
            });
            Ok(state
                .storage
                .get(&(node.to_owned(), storage.to_owned()))
                .cloned()
                .unwrap_or_default())
        })
    }

    fn vm_config<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, BTreeMap<String, String>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ApiCall::VmConfig(vm.vmid));
            Ok(state.configs.get(&vm.vmid).cloned().unwrap_or_default())
        })
    }

    fn update_vm_config<'a>(
        &'a self,
        vm: &'a VmRef,
        params: &'a BTreeMap<String, String>,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ApiCall::UpdateConfig(vm.vmid));
            state.configs.insert(vm.vmid, params.clone());
            Ok(())
        })
    }

    fn current_status<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, VmStatus> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ApiCall::CurrentStatus(vm.vmid));
            let status = ClusterScript::advance(&mut state.statuses)
                .unwrap_or_else(|| Ok(String::from("stopped")));
            deliver(status).map(VmStatus::from)
        })
    }

    fn submit_action<'a>(&'a self, vm: &'a VmRef, action: VmAction) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.lock().calls.push(ApiCall::Action {
                vmid: vm.vmid,
                action,
            });
            Ok(())
        })
    }

    fn clone_vm<'a>(&'a self, source: &'a VmRef, request: &'a CloneRequest) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.lock().calls.push(ApiCall::Clone {
                source_vmid: source.vmid,
                request: request.clone(),
            });
            Ok(())
        })
    }

    fn delete_vm<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.lock().calls.push(ApiCall::Delete(vm.vmid));
            Ok(())
        })
    }

    fn agent_interfaces<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, AgentProbe> {
        Box::pin(async move {
            let mut state = self.lock();
            state.calls.push(ApiCall::AgentInterfaces(vm.vmid));
            let probe =
                ClusterScript::advance(&mut state.agent_probes).unwrap_or(Ok(AgentProbe::NotReady));
            deliver(probe)
        })
    }
}

/// Event sink that records every notification for later assertions.
#[derive(Clone, Debug, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingEventSink {
    fn lock(&self) -> MutexGuard<'_, Vec<(String, Value)>> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns the recorded events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Value)> {
        self.lock().clone()
    }

    /// Returns only the event names, in emission order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(|(name, _)| name.clone()).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn notify(&self, event: &str, payload: Value) {
        self.lock().push((event.to_owned(), payload));
    }
}

/// Bootstrap double that records its call and returns a seeded result.
#[derive(Clone, Debug)]
pub struct ScriptedBootstrap {
    result: Result<Value, String>,
    calls: Arc<Mutex<Vec<(String, IpAddr)>>>,
}

impl Default for ScriptedBootstrap {
    fn default() -> Self {
        Self {
            result: Ok(serde_json::json!({ "bootstrapped": true })),
            calls: Arc::default(),
        }
    }
}

impl ScriptedBootstrap {
    /// Builds a double that returns the given record.
    #[must_use]
    pub fn returning(result: Value) -> Self {
        Self {
            result: Ok(result),
            ..Self::default()
        }
    }

    /// Builds a double that fails with the given message.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_owned()),
            ..Self::default()
        }
    }

    /// Returns the recorded (VM name, address) invocations.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, IpAddr)> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Bootstrap for ScriptedBootstrap {
    fn bootstrap<'a>(&'a self, options: &'a VmOptions, address: IpAddr) -> BootstrapFuture<'a> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((options.name.clone(), address));
            match &self.result {
                Ok(value) => Ok(value.clone()),
                Err(message) => Err(BootstrapError {
                    message: message.clone(),
                }),
            }
        })
    }
}
