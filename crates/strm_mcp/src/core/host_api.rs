use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::{Url, form_urlencoded};

use crate::core::error::{HostError, HostResult};

/// Transport to the host plugin runtime
///
/// Decouples plugin operations from how the host is reached, so the
/// console and QR login flow can run against a scripted host in tests.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// Issue a GET for `path` (relative to the host API root, query included)
    async fn get(&self, path: &str) -> HostResult<Value>;

    /// Issue a POST of a JSON `body` to `path`
    async fn post(&self, path: &str, body: Value) -> HostResult<Value>;
}

/// Deserialize a host response into `T`. A `null` body becomes `T::default()`.
pub fn parse_response<T>(path: &str, value: Value) -> HostResult<T>
where
    T: DeserializeOwned + Default,
{
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(|e| HostError::Decode {
        path: path.to_string(),
        message: e.to_string(),
    })
}

/// Routes exposed by the plugin under `plugin/<plugin_id>/`
#[derive(Debug, Clone)]
pub struct PluginRoutes {
    prefix: String,
}

impl PluginRoutes {
    pub fn new(plugin_id: &str) -> Self {
        Self {
            prefix: format!("plugin/{}/", plugin_id.trim_matches('/')),
        }
    }

    fn route(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn route_with_query(&self, name: &str, params: &[(&str, &str)]) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        format!("{}{}?{}", self.prefix, name, query)
    }

    pub fn get_config(&self) -> String {
        self.route("get_config")
    }

    pub fn save_config(&self) -> String {
        self.route("save_config")
    }

    pub fn full_sync(&self) -> String {
        self.route("full_sync")
    }

    pub fn share_sync(&self) -> String {
        self.route("share_sync")
    }

    pub fn browse_dir(&self, path: &str, is_local: bool) -> String {
        self.route_with_query(
            "browse_dir",
            &[("path", path), ("is_local", if is_local { "true" } else { "false" })],
        )
    }

    pub fn get_qrcode(&self, client_type: &str) -> String {
        self.route_with_query("get_qrcode", &[("client_type", client_type)])
    }

    pub fn check_qrcode(&self, uid: &str, time: &str, sign: &str, client_type: &str) -> String {
        self.route_with_query(
            "check_qrcode",
            &[
                ("uid", uid),
                ("time", time),
                ("sign", sign),
                ("client_type", client_type),
            ],
        )
    }

    pub fn get_status(&self) -> String {
        self.route("get_status")
    }

    pub fn user_storage_status(&self) -> String {
        self.route("user_storage_status")
    }
}

/// `HostApi` over HTTP
#[derive(Debug, Clone)]
pub struct HttpHostApi {
    client: Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpHostApi {
    pub fn new(client: Client, mut base_url: Url, api_token: Option<String>) -> Self {
        // Url::join drops the last segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client,
            base_url,
            api_token,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> HostResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| HostError::Transport {
                path: path.to_string(),
                message: e.to_string(),
            })
    }

    async fn send(&self, path: &str, request: reqwest::RequestBuilder) -> HostResult<Value> {
        let request = match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| HostError::Transport {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        debug!(path = %path, status = status.as_u16(), "Host responded");
        if !status.is_success() {
            return Err(HostError::Http {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| HostError::Transport {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|e| HostError::Decode {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl HostApi for HttpHostApi {
    async fn get(&self, path: &str) -> HostResult<Value> {
        let url = self.url_for(path)?;
        self.send(path, self.client.get(url)).await
    }

    async fn post(&self, path: &str, body: Value) -> HostResult<Value> {
        let url = self.url_for(path)?;
        self.send(path, self.client.post(url).json(&body)).await
    }
}
