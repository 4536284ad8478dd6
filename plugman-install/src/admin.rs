//! JSON-RPC client for a running node's admin API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::AdminError;

/// The admin calls plugman makes after installing VMs.
pub trait AdminApi {
    /// Ask the node to load newly installed VM binaries.
    fn load_vms(&self) -> Result<(), AdminError>;

    /// Add `subnet_id` to the node's tracked subnets.
    fn whitelist_subnet(&self, subnet_id: &str) -> Result<(), AdminError>;

    /// Endpoint used in user-facing messages.
    fn endpoint(&self) -> &str;
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Admin API over HTTP, e.g. `127.0.0.1:9650/ext/admin`.
#[derive(Debug)]
pub struct AdminClient {
    endpoint: String,
    url: String,
    agent: ureq::Agent,
    next_id: AtomicU64,
}

impl AdminClient {
    /// `endpoint` may omit the scheme, in which case `http://` is assumed.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let endpoint = endpoint.into();
        let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.clone()
        } else {
            format!("http://{endpoint}")
        };
        Self {
            endpoint,
            url,
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            next_id: AtomicU64::new(1),
        }
    }

    fn call(&self, method: &str, params: Value) -> Result<(), AdminError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        tracing::debug!(method, url = %self.url, "admin api call");

        let response = match self.agent.post(&self.url).send_json(&request) {
            Ok(response) => response,
            Err(ureq::Error::Transport(transport))
                if transport.kind() == ureq::ErrorKind::ConnectionFailed =>
            {
                return Err(AdminError::Offline {
                    endpoint: self.endpoint.clone(),
                });
            }
            Err(source) => {
                return Err(AdminError::Transport {
                    endpoint: self.endpoint.clone(),
                    method: method.to_owned(),
                    source: Box::new(source),
                });
            }
        };

        let body: RpcResponse = response.into_json().map_err(|source| AdminError::Decode {
            method: method.to_owned(),
            source,
        })?;
        match body.error {
            Some(error) => Err(AdminError::Rpc {
                method: method.to_owned(),
                code: error.code,
                message: error.message,
            }),
            None => Ok(()),
        }
    }
}

impl AdminApi for AdminClient {
    fn load_vms(&self) -> Result<(), AdminError> {
        self.call("admin.loadVMs", json!({}))
    }

    fn whitelist_subnet(&self, subnet_id: &str) -> Result<(), AdminError> {
        self.call("admin.whitelistSubnet", json!({ "subnetID": subnet_id }))
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
