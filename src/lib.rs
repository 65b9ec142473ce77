//! Lifecycle driver for virtual machines on a Proxmox VE cluster.
//!
//! The crate drives a single VM through create/clone, start, stop,
//! shutdown, destroy, and inspect against the cluster's REST API. Its core
//! is the provisioning state machine: submit an asynchronous operation,
//! poll for convergence within a bounded budget, discover the guest's
//! address through the agent side channel, verify SSH reachability, and
//! hand off to an external bootstrap collaborator. Credential lookup,
//! event delivery, and the bootstrap payload itself belong to the
//! embedding orchestration tool and are reached only through the trait
//! boundaries in [`events`] and [`bootstrap`].

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod net;
pub mod poll;
pub mod test_support;

pub use api::{
    AddressType, AgentAddress, AgentProbe, CloneOptions, CloneRequest, ClusterApi, ClusterResource,
    NetworkInterface, NodeEntry, ProxmoxApi, StorageItem, VmAction, VmKind, VmRef, VmStatus,
};
pub use bootstrap::{Bootstrap, BootstrapError, BootstrapFuture};
pub use config::{ConfigError, ProxmoxConfig};
pub use driver::{
    CreateOutcome, DEFAULT_STORAGE, InstanceDetails, InstanceSummary, PollPolicies, ProxmoxDriver,
    VmOptions,
};
pub use error::DriverError;
pub use events::{EventSink, TracingEventSink};
pub use net::{IpInventory, first_bootstrap_ipv4, parse_ip_configs, parse_kv_string};
pub use poll::PollPolicy;
