use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::config::{Config, DEFAULT_PLUGIN_ID};
use crate::core::{error::StrmHelperResult, qr_login::QrLoginOptions};

/// STRM Helper MCP Server
///
/// Manages the 115 STRM helper plugin of a media-server host through the
/// Model Context Protocol.
///
/// ## Features
/// - **Tools**: Configuration, sync triggers, directory browsing, QR login
/// - **Resources**: Server status and help documentation
///
/// ## Development
/// ```bash
/// npx @modelcontextprotocol/inspector cargo run --bin mcp-server-strm-helper -- --host-url http://127.0.0.1:3001/api/v1/
/// ```
///
/// ## Configuration
/// Add to your MCP client configuration:
/// ```json
/// {
///   "mcpServers": {
///     "strm-helper": {
///       "command": "mcp-server-strm-helper",
///       "args": ["--host-url", "http://127.0.0.1:3001/api/v1/"],
///       "env": {
///         "STRM_API_TOKEN": "<host api token>",
///         "RUST_LOG": "info"
///       }
///     }
///   }
/// }
/// ```
///
/// ## Environment Variables
/// - `RUST_LOG`: Controls logging verbosity (trace, debug, info, warn, error)
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-server-strm-helper")]
#[command(about = "An MCP server for managing the 115 STRM helper plugin")]
#[command(version)]
pub struct Cli {
    /// Root URL of the host API
    #[arg(long, env = "STRM_HOST_URL", default_value = "http://127.0.0.1:3001/api/v1/")]
    pub host_url: Url,

    /// Token passed to the host as a bearer credential
    #[arg(long, env = "STRM_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Plugin id of the STRM helper inside the host
    #[arg(long, env = "STRM_PLUGIN_ID", default_value = DEFAULT_PLUGIN_ID)]
    pub plugin_id: String,

    /// Proxy URL to use for requests (e.g., http://proxy:8080)
    #[arg(long)]
    pub proxy_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Seconds between QR login status polls
    #[arg(long, default_value_t = 3)]
    pub poll_interval_secs: u64,

    /// Seconds the QR dialog stays open after a successful login
    #[arg(long, default_value_t = 3)]
    pub close_delay_secs: u64,
}

impl Cli {
    /// Parse CLI arguments and convert to configuration
    pub fn parse_config() -> StrmHelperResult<Config> {
        Self::parse().into_config()
    }

    fn into_config(self) -> StrmHelperResult<Config> {
        let config = Config {
            host_url: self.host_url,
            api_token: self.api_token.filter(|token| !token.trim().is_empty()),
            plugin_id: self.plugin_id,
            proxy_url: self.proxy_url,
            timeout: Duration::from_secs(self.timeout_secs),
            qr_login: QrLoginOptions {
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                close_delay: Duration::from_secs(self.close_delay_secs),
            },
        };
        config.validate()?;
        Ok(config)
    }
}
