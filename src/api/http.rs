//! Reqwest-backed client for the Proxmox VE REST API.
//!
//! Every call carries a fixed short timeout so a stalled network request can
//! never block a polling iteration for longer than a few seconds; the
//! overall budget of each wait phase is enforced above this layer.

use std::collections::BTreeMap;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::ProxmoxConfig;
use crate::error::DriverError;

use super::types::{
    AgentProbe, CloneRequest, ClusterResource, NetworkInterface, NodeEntry, StorageItem, VmAction,
    VmRef, VmStatus,
};
use super::{ApiFuture, ClusterApi};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("hoverla/", env!("CARGO_PKG_VERSION"));

/// The cluster API wraps every payload in a `data` envelope.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct CurrentStatus {
    status: String,
}

#[derive(Deserialize)]
struct AgentPayload {
    #[serde(default)]
    result: Option<Vec<NetworkInterface>>,
}

/// HTTP client for the Proxmox VE API.
#[derive(Clone, Debug)]
pub struct ProxmoxApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ProxmoxApi {
    /// Builds a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] when the configuration is incomplete
    /// and [`DriverError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: &ProxmoxConfig) -> Result<Self, DriverError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(DriverError::transport)?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_owned(),
            token: config.api_token(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api2/json/{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("Accept", "application/json")
            .header("Authorization", format!("PVEAPIToken={}", self.token))
    }

    async fn read_success(
        method: &'static str,
        path: &str,
        response: reqwest::Response,
    ) -> Result<Vec<u8>, DriverError> {
        let status = response.status();
        let body = response.bytes().await.map_err(DriverError::transport)?;
        if status.is_success() {
            return Ok(body.to_vec());
        }
        Err(DriverError::Transport {
            message: format!(
                "{method} {path} returned {status}: {}",
                String::from_utf8_lossy(&body)
            ),
        })
    }

    async fn get_data<T: DeserializeOwned>(&self, path: &str) -> Result<T, DriverError> {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(DriverError::transport)?;
        let body = Self::read_success("GET", path, response).await?;
        let parsed: Envelope<T> =
            serde_json::from_slice(&body).map_err(DriverError::transport)?;
        Ok(parsed.data)
    }

    async fn submit_form(
        &self,
        method: Method,
        path: &str,
        form: &[(&str, String)],
    ) -> Result<(), DriverError> {
        let label = method.as_str().to_owned();
        let mut request = self.request(method, path);
        if !form.is_empty() {
            request = request.form(&form);
        }
        let response = request.send().await.map_err(DriverError::transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.bytes().await.unwrap_or_default();
        Err(DriverError::Transport {
            message: format!(
                "{label} {path} returned {status}: {}",
                String::from_utf8_lossy(&body)
            ),
        })
    }

    fn vm_path(vm: &VmRef, suffix: &str) -> String {
        if suffix.is_empty() {
            format!("nodes/{}/{}/{}", vm.node, vm.kind.as_str(), vm.vmid)
        } else {
            format!(
                "nodes/{}/{}/{}/{}",
                vm.node,
                vm.kind.as_str(),
                vm.vmid,
                suffix
            )
        }
    }
}

impl ClusterApi for ProxmoxApi {
    fn list_vms(&self) -> ApiFuture<'_, Vec<ClusterResource>> {
        Box::pin(async move { self.get_data("cluster/resources?type=vm").await })
    }

    fn next_vmid(&self) -> ApiFuture<'_, u32> {
        Box::pin(async move {
            // The cluster reports the id hint as a JSON string.
            let raw: String = self.get_data("cluster/nextid").await?;
            raw.parse::<u32>().map_err(|err| DriverError::Transport {
                message: format!("unexpected nextid payload '{raw}': {err}"),
            })
        })
    }

    fn list_nodes(&self) -> ApiFuture<'_, Vec<NodeEntry>> {
        Box::pin(async move { self.get_data("nodes").await })
    }

    fn storage_content<'a>(
        &'a self,
        node: &'a str,
        storage: &'a str,
    ) -> ApiFuture<'a, Vec<StorageItem>> {
        Box::pin(async move {
            self.get_data(&format!("nodes/{node}/storage/{storage}/content"))
                .await
        })
    }

    fn vm_config<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, BTreeMap<String, String>> {
        Box::pin(async move {
            let raw: BTreeMap<String, serde_json::Value> =
                self.get_data(&Self::vm_path(vm, "config")).await?;
            Ok(raw
                .into_iter()
                .map(|(key, value)| {
                    let rendered = match value {
                        serde_json::Value::String(text) => text,
                        other => other.to_string(),
                    };
                    (key, rendered)
                })
                .collect())
        })
    }

    fn update_vm_config<'a>(
        &'a self,
        vm: &'a VmRef,
        params: &'a BTreeMap<String, String>,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let form: Vec<(&str, String)> = params
                .iter()
                .map(|(key, value)| (key.as_str(), value.clone()))
                .collect();
            self.submit_form(Method::PUT, &Self::vm_path(vm, "config"), &form)
                .await
        })
    }

    fn current_status<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, VmStatus> {
        Box::pin(async move {
            let current: CurrentStatus =
                self.get_data(&Self::vm_path(vm, "status/current")).await?;
            Ok(VmStatus::from(current.status))
        })
    }

    fn submit_action<'a>(&'a self, vm: &'a VmRef, action: VmAction) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let path = Self::vm_path(vm, &format!("status/{}", action.as_str()));
            self.submit_form(Method::POST, &path, &[]).await
        })
    }

    fn clone_vm<'a>(&'a self, source: &'a VmRef, request: &'a CloneRequest) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.submit_form(Method::POST, &Self::vm_path(source, "clone"), &request.to_form())
                .await
        })
    }

    fn delete_vm<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.submit_form(Method::DELETE, &Self::vm_path(vm, ""), &[])
                .await
        })
    }

    fn agent_interfaces<'a>(&'a self, vm: &'a VmRef) -> ApiFuture<'a, AgentProbe> {
        Box::pin(async move {
            let path = Self::vm_path(vm, "agent/network-get-interfaces");
            let response = self
                .request(Method::GET, &path)
                .send()
                .await
                .map_err(DriverError::transport)?;
            // The endpoint answers 500 until the in-guest agent is reachable.
            if response.status() == StatusCode::INTERNAL_SERVER_ERROR {
                return Ok(AgentProbe::NotReady);
            }
            let body = Self::read_success("GET", &path, response).await?;
            let parsed: Envelope<Option<AgentPayload>> =
                serde_json::from_slice(&body).map_err(DriverError::transport)?;
            let interfaces = parsed
                .data
                .and_then(|payload| payload.result)
                .unwrap_or_default();
            Ok(AgentProbe::Ready(interfaces))
        })
    }
}
