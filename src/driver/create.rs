//! Provisioning orchestrator: clone/create a VM, converge it to running,
//! discover its address, verify reachability, and hand off to bootstrap.
//!
//! One create call walks a fixed ladder: plan assembled, clone submitted,
//! VM visible in the inventory, status "running", guest agent reporting an
//! IPv4 address, SSH port answering, bootstrap complete. Each rung has its
//! own poll policy, and any rung's timeout aborts the whole flow. A clone
//! that was already submitted is not rolled back on a later failure; the
//! partially created VM stays in place for the operator to inspect.

use std::net::IpAddr;

use serde_json::json;

use crate::api::{CloneOptions, CloneRequest, ClusterApi, ClusterResource, VmRef};
use crate::bootstrap::Bootstrap;
use crate::error::DriverError;
use crate::events::EventSink;
use crate::net;

use super::ProxmoxDriver;

/// The lowest id the cluster hands out; used when the inventory is empty.
const FIRST_VMID: u32 = 100;

/// Caller-supplied parameters for one create call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VmOptions {
    /// Display name for the new VM.
    pub name: String,
    /// Name of the template to clone from.
    pub template: String,
    /// Clone-specific parameters; their presence selects the clone path.
    pub clone: Option<CloneOptions>,
}

impl VmOptions {
    /// Checks that the options can drive a create call.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidInvocation`] when the name or template
    /// is missing.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.name.trim().is_empty() {
            return Err(DriverError::InvalidInvocation {
                operation: String::from("create"),
                reason: String::from("a VM name is required"),
            });
        }
        if self.template.trim().is_empty() {
            return Err(DriverError::InvalidInvocation {
                operation: String::from("create"),
                reason: String::from("a source template name is required"),
            });
        }
        Ok(())
    }
}

/// Result of a completed create call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateOutcome {
    /// Record returned by the bootstrap collaborator.
    pub bootstrap: serde_json::Value,
    /// Freshly fetched details of the new VM.
    pub instance: super::InstanceDetails,
}

/// Ephemeral plan assembled while provisioning one VM.
///
/// Valid only for the create call that built it: the source reference and
/// the target id both come from the inventory as it stood at planning time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(in crate::driver) struct CreationPlan {
    pub(in crate::driver) source: VmRef,
    pub(in crate::driver) target_vmid: u32,
    pub(in crate::driver) target_name: String,
    pub(in crate::driver) options: CloneOptions,
}

impl CreationPlan {
    pub(in crate::driver) fn to_request(&self) -> CloneRequest {
        CloneRequest {
            newid: self.target_vmid,
            name: self.target_name.clone(),
            options: self.options.clone(),
        }
    }
}

/// Computes the next free id as one past the highest id in use.
///
/// Best-effort only: another actor allocating concurrently can race this
/// computation, and the driver adds no locking. The cluster rejects the
/// eventual clone submission if the id was taken in the meantime.
pub(in crate::driver) fn next_free_vmid(resources: &[ClusterResource]) -> u32 {
    resources
        .iter()
        .map(|resource| resource.vmid)
        .max()
        .map_or(FIRST_VMID, |highest| highest.saturating_add(1))
}

impl<C, E, B> ProxmoxDriver<C, E, B>
where
    C: ClusterApi,
    E: EventSink,
    B: Bootstrap,
{
    /// Creates a new VM from a template and bootstraps it.
    ///
    /// Emits a "starting create" event first and a "created instance" event
    /// once the whole flow has finished. See the module docs for the phase
    /// ladder.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotFound`] when the template cannot be
    /// resolved, the clone never becomes visible, or the guest reports no
    /// usable IPv4 address; [`DriverError::Timeout`] when any wait phase
    /// expires; [`DriverError::Bootstrap`] when the collaborator fails; and
    /// [`DriverError::Transport`] when a submission fails.
    pub async fn create(&self, options: &VmOptions) -> Result<CreateOutcome, DriverError> {
        options.validate()?;
        self.events.notify(
            "starting create",
            json!({ "name": options.name, "template": options.template }),
        );

        let plan = self.plan_creation(options).await?;
        tracing::info!(
            source_vmid = plan.source.vmid,
            target_vmid = plan.target_vmid,
            name = %plan.target_name,
            "submitting clone"
        );
        self.api.clone_vm(&plan.source, &plan.to_request()).await?;

        let vm = self
            .resolve_by_name(&plan.target_name, &self.policies.name_lookup)
            .await?;
        self.api
            .submit_action(&vm, crate::api::VmAction::Start)
            .await?;
        self.wait_for_status(&vm, "running", &self.policies.create_running)
            .await?;

        let interfaces = self
            .wait_for_agent_interfaces(&vm, &self.policies.agent)
            .await?;
        let address = net::first_bootstrap_ipv4(&interfaces).ok_or_else(|| {
            DriverError::NotFound {
                resource: format!("usable IPv4 address on VM '{}'", plan.target_name),
            }
        })?;

        let address = IpAddr::V4(address);
        self.wait_for_ssh(address).await?;

        let bootstrap = self.bootstrap.bootstrap(options, address).await?;
        let instance = self.show_instance(&plan.target_name).await?;

        self.events
            .notify("created instance", json!({ "name": plan.target_name }));
        Ok(CreateOutcome {
            bootstrap,
            instance,
        })
    }

    /// Resolves the source template and computes the target id.
    ///
    /// The clone path asks the cluster for an id hint; the fresh path takes
    /// one past the highest id in the current inventory and submits a plain
    /// clone-style creation with no extra options.
    async fn plan_creation(&self, options: &VmOptions) -> Result<CreationPlan, DriverError> {
        let source = self
            .resolve_by_name(&options.template, &self.policies.name_lookup)
            .await?;

        if let Some(clone) = &options.clone {
            let target_vmid = self.api.next_vmid().await?;
            return Ok(CreationPlan {
                source,
                target_vmid,
                target_name: options.name.clone(),
                options: clone.clone(),
            });
        }

        let resources = self.api.list_vms().await?;
        Ok(CreationPlan {
            source,
            target_vmid: next_free_vmid(&resources),
            target_name: options.name.clone(),
            options: CloneOptions::default(),
        })
    }
}
