use std::time::Duration;

use url::Url;

use crate::core::{
    error::{StrmHelperError, StrmHelperResult},
    qr_login::QrLoginOptions,
};

/// Default plugin id of the STRM helper inside the host
pub const DEFAULT_PLUGIN_ID: &str = "P115StrmHelper";

/// Configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the host API, e.g. `http://127.0.0.1:3001/api/v1/`
    pub host_url: Url,
    /// Opaque token passed through to the host
    pub api_token: Option<String>,
    pub plugin_id: String,
    pub proxy_url: Option<String>,
    pub timeout: Duration,
    pub qr_login: QrLoginOptions,
}

impl Config {
    pub fn validate(&self) -> StrmHelperResult<()> {
        if !matches!(self.host_url.scheme(), "http" | "https") {
            return Err(StrmHelperError::InvalidConfig {
                message: format!("host URL {} must use http or https", self.host_url),
            });
        }
        if self.plugin_id.trim().is_empty() || self.plugin_id.contains(['/', '?', '#']) {
            return Err(StrmHelperError::InvalidConfig {
                message: format!("invalid plugin id `{}`", self.plugin_id),
            });
        }
        if self.timeout.is_zero() {
            return Err(StrmHelperError::InvalidConfig {
                message: "timeout must be greater than zero".to_string(),
            });
        }
        if self.qr_login.poll_interval.is_zero() {
            return Err(StrmHelperError::InvalidConfig {
                message: "QR poll interval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
