//! Wire-level types for the cluster REST surface.

use serde::{Deserialize, Serialize};

/// Whether a cluster resource is a full VM or a lightweight container.
///
/// The variant names follow the wire values (`qemu`, `lxc`) because they
/// appear verbatim in request paths.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VmKind {
    /// A full virtual machine.
    Qemu,
    /// A container.
    Lxc,
}

impl VmKind {
    /// Returns the path segment used by the cluster API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qemu => "qemu",
            Self::Lxc => "lxc",
        }
    }
}

/// Reference to a VM, freshly resolved from the cluster inventory.
///
/// Identity is `vmid`; `name` is not guaranteed unique across the cluster.
/// A reference is only ever constructed from a fresh inventory fetch and is
/// never reused across operations, because node, kind, and id can all change
/// when the cluster reshuffles.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VmRef {
    /// Cluster-wide numeric identifier.
    pub vmid: u32,
    /// Node currently hosting the VM.
    pub node: String,
    /// Resource kind, selecting the `qemu` or `lxc` API family.
    pub kind: VmKind,
    /// Display name at the time of resolution.
    pub name: String,
}

/// One entry of the `cluster/resources?type=vm` inventory.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClusterResource {
    /// Cluster-wide numeric identifier.
    pub vmid: u32,
    /// Node currently hosting the resource.
    pub node: String,
    /// Resource kind as reported on the wire.
    #[serde(rename = "type")]
    pub kind: VmKind,
    /// Display name; the inventory may omit it for half-created resources.
    #[serde(default)]
    pub name: Option<String>,
    /// Status string at the time of the listing.
    #[serde(default)]
    pub status: Option<String>,
}

impl ClusterResource {
    /// Builds a [`VmRef`] from this inventory entry.
    #[must_use]
    pub fn to_ref(&self) -> VmRef {
        VmRef {
            vmid: self.vmid,
            node: self.node.clone(),
            kind: self.kind,
            name: self.name.clone().unwrap_or_default(),
        }
    }
}

/// Status token reported by the cluster for one VM.
///
/// The driver treats the value as opaque: it is compared for equality
/// against a target and never parsed further.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VmStatus(String);

impl VmStatus {
    /// Returns the raw status token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for VmStatus {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for VmStatus {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Power-state actions accepted by the `status/{action}` endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VmAction {
    /// Power the VM on.
    Start,
    /// Hard-stop the VM.
    Stop,
    /// Ask the guest OS to shut down.
    Shutdown,
}

impl VmAction {
    /// Returns the path segment used by the cluster API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Optional clone parameters recognised by the clone endpoint.
///
/// Every field is forwarded verbatim to the remote API; the driver adds
/// nothing and removes nothing. Fields left unset are omitted from the
/// request entirely.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CloneOptions {
    /// Description for the new VM.
    pub description: Option<String>,
    /// Create a full copy of all disks rather than a linked clone.
    pub full: Option<bool>,
    /// Add the new VM to the given pool.
    pub pool: Option<String>,
    /// Clone from the named snapshot instead of the current state.
    pub snapname: Option<String>,
    /// Target storage for a full clone.
    pub storage: Option<String>,
    /// Target node; only allowed when the source is on shared storage.
    pub target: Option<String>,
    /// Target disk format for a full clone (`raw`, `qcow2`, `vmdk`).
    pub format: Option<String>,
    /// I/O bandwidth limit override in KiB/s.
    pub bwlimit: Option<u64>,
}

/// Fully assembled clone submission.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloneRequest {
    /// Identifier for the new VM.
    pub newid: u32,
    /// Display name for the new VM.
    pub name: String,
    /// Caller-supplied clone parameters, forwarded unchanged.
    pub options: CloneOptions,
}

impl CloneRequest {
    /// Serialises the request as form fields for the clone endpoint.
    #[must_use]
    pub fn to_form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("newid", self.newid.to_string()),
            ("name", self.name.clone()),
        ];
        let options = &self.options;
        if let Some(description) = &options.description {
            form.push(("description", description.clone()));
        }
        if let Some(full) = options.full {
            form.push(("full", u8::from(full).to_string()));
        }
        if let Some(pool) = &options.pool {
            form.push(("pool", pool.clone()));
        }
        if let Some(snapname) = &options.snapname {
            form.push(("snapname", snapname.clone()));
        }
        if let Some(storage) = &options.storage {
            form.push(("storage", storage.clone()));
        }
        if let Some(target) = &options.target {
            form.push(("target", target.clone()));
        }
        if let Some(format) = &options.format {
            form.push(("format", format.clone()));
        }
        if let Some(bwlimit) = options.bwlimit {
            form.push(("bwlimit", bwlimit.to_string()));
        }
        form
    }
}

/// One entry of the `nodes` listing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NodeEntry {
    /// Node name, unique within the cluster.
    pub node: String,
    /// Reported availability, `online` for usable nodes.
    #[serde(default)]
    pub status: Option<String>,
}

impl NodeEntry {
    /// Reports whether the node is usable as a location.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status.as_deref() == Some("online")
    }
}

/// One item of a node's storage content listing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageItem {
    /// Volume identifier, unique within the storage.
    pub volid: String,
    /// Content class (`images`, `vztmpl`, `iso`, ...).
    #[serde(default)]
    pub content: Option<String>,
    /// Volume format, when the storage reports one.
    #[serde(default)]
    pub format: Option<String>,
    /// Volume size in bytes.
    #[serde(default)]
    pub size: Option<u64>,
}

/// Reply from the guest-agent network-interfaces endpoint.
///
/// The endpoint answers with an error status until the in-guest agent is
/// reachable; the client maps that distinguished signal to
/// [`AgentProbe::NotReady`] so pollers can treat it as "not yet" rather
/// than a failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AgentProbe {
    /// The agent has not answered yet.
    NotReady,
    /// The agent reported its interfaces.
    Ready(Vec<NetworkInterface>),
}

/// One network interface reported by the guest agent.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct NetworkInterface {
    /// Interface name inside the guest.
    #[serde(default)]
    pub name: Option<String>,
    /// MAC address; all-zero marks a loopback or virtual interface.
    #[serde(rename = "hardware-address")]
    pub hardware_address: String,
    /// Addresses assigned to the interface, in report order.
    #[serde(rename = "ip-addresses", default)]
    pub ip_addresses: Vec<AgentAddress>,
}

/// One address entry within a guest-agent interface report.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AgentAddress {
    /// Address family as reported by the agent.
    #[serde(rename = "ip-address-type")]
    pub address_type: AddressType,
    /// Textual address value.
    #[serde(rename = "ip-address")]
    pub address: String,
    /// Prefix length, when the agent reports one.
    #[serde(default)]
    pub prefix: Option<u8>,
}

/// Address family tag used by the guest agent.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    /// An IPv4 address.
    Ipv4,
    /// An IPv6 address.
    Ipv6,
    /// Any family this driver does not recognise.
    #[serde(other)]
    Other,
}
