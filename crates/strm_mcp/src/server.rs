use std::path::PathBuf;
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    handler::server::{
        router::{prompt::PromptRouter, tool::ToolRouter},
        wrapper::Parameters,
    },
    model::*,
    prompt, prompt_handler, prompt_router,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::core::{
    console::PluginConsole,
    error::{McpResult, StrmHelperError, StrmHelperResult},
    host_api::{HostApi, HttpHostApi, PluginRoutes},
    models::{
        BrowseDirRequest, DecodePathListRequest, EncodePathListRequest, QrLoginRefreshRequest,
        QrLoginStartRequest, SaveConfigRequest, ShareSyncRequest,
    },
    path_list,
    qr_login::{QrLoginOptions, QrLoginSession},
    settings::{PluginSettings, Validate},
};
use crate::utils::{build_client, write_qr_image};

/// Available resource URIs for the STRM Helper MCP Server
pub const AVAILABLE_RESOURCES: &[&str] = &["strm://status", "strm://help"];

fn json_result<T: Serialize>(value: &T) -> McpResult<CallToolResult> {
    let text = serde_json::to_string_pretty(value).map_err(|e| {
        McpError::internal_error("serialization_error", Some(json!({ "message": e.to_string() })))
    })?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// STRM Helper MCP Server managing the plugin through its host
#[derive(Clone)]
pub struct StrmHelperService {
    console: PluginConsole,
    qr_login: Arc<Mutex<QrLoginSession>>,
    host_label: String,
    tool_router: ToolRouter<StrmHelperService>,
    prompt_router: PromptRouter<StrmHelperService>,
}

impl StrmHelperService {
    pub fn new(config: &Config) -> StrmHelperResult<Self> {
        let client = build_client(config.proxy_url.as_deref(), config.timeout)?;
        let api = HttpHostApi::new(client, config.host_url.clone(), config.api_token.clone());
        let host_label = api.base_url().to_string();

        Ok(Self::with_api(
            Arc::new(api),
            &config.plugin_id,
            config.qr_login,
            host_label,
        ))
    }

    pub fn with_api(
        api: Arc<dyn HostApi>,
        plugin_id: &str,
        qr_options: QrLoginOptions,
        host_label: String,
    ) -> Self {
        let routes = PluginRoutes::new(plugin_id);
        let qr_login = QrLoginSession::new(Arc::clone(&api), routes.clone(), qr_options);

        Self {
            console: PluginConsole::new(api, routes),
            qr_login: Arc::new(Mutex::new(qr_login)),
            host_label,
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    fn create_resource_text(&self, uri: &str, name: &str) -> Resource {
        RawResource::new(uri, name.to_string()).no_annotation()
    }

    async fn load_settings(&self) -> StrmHelperResult<PluginSettings> {
        Ok(self.console.load().await?.settings)
    }

    async fn generate_status_content(&self) -> String {
        let (login, polling) = {
            let session = self.qr_login.lock().await;
            (session.snapshot(), session.is_polling())
        };

        format!(
            r#"STRM Helper MCP Server Status

Server: Running
Host API: {}
Plugin Route: {}
Tools Available: 14
Resources Available: 2

QR Login:
- Status: {:?}
- Client Type: {}
- Polling: {}
- Credential Captured: {}

Capabilities:
- Load and save the plugin configuration with typed path lists
- Trigger full sync and share sync jobs
- Browse local and 115 drive directories
- Log in to 115 by QR code
- Decode and encode raw path-list strings"#,
            self.host_label,
            self.console.routes().get_config(),
            login.status,
            login.client_type.as_str(),
            polling,
            login.credential.is_some(),
        )
    }

    fn generate_help_content(&self) -> &'static str {
        r#"STRM Helper MCP Server Help

TOOLS:
- get_config: Load the plugin configuration; path lists come back as entry arrays
- save_config: Save a configuration obtained from get_config
  - settings: the full settings object (required)
- full_sync: Start a full STRM sync (requires a 115 cookie)
- share_sync: Sync a 115 share into STRM files (requires a 115 cookie)
  - share_link / share_code / receive_code / pan_path / local_path; blanks use saved values
- browse_dir: List a directory
  - path: directory (default "/")
  - is_local: true for the host filesystem, false for the 115 drive (requires a cookie)
- get_status: Plugin enabled / client / running flags
- user_storage_status: 115 account and storage usage
- qr_login_start: Open a QR login session
  - client_type: alipaymini, wechatmini, 115android, 115ios, 115ipad, web, tv, qandroid
  - image_path: optional file to write the QR code PNG to
- qr_login_status: Current QR login state
- qr_login_refresh: Request a new QR code, optionally switching client_type
- qr_login_close: Close the session and stop polling
- qr_login_apply: Store the captured cookie in the configuration and save it
- decode_path_list: Turn a raw path-list string into entries
- encode_path_list: Turn entries into a raw path-list string

PATH LISTS:
- mapping lists hold one LOCAL#REMOTE pair per line
- single lists hold one path per line
- blank lines are dropped; an empty list decodes to one empty entry

QR LOGIN STATES:
- loading -> waiting -> scanned -> success
- waiting/scanned -> expired (call qr_login_refresh)
- any -> idle on qr_login_close"#
    }
}

#[tool_router]
impl StrmHelperService {
    #[tool(description = "Load the plugin configuration with path lists decoded into entries")]
    async fn get_config(&self) -> McpResult<CallToolResult> {
        let loaded = self.console.load().await?;
        json_result(&loaded)
    }

    #[tool(description = "Validate and save the plugin configuration")]
    async fn save_config(
        &self,
        Parameters(req): Parameters<SaveConfigRequest>,
    ) -> McpResult<CallToolResult> {
        req.validate()?;
        let ack = self.console.save(req.into_settings()).await?;
        json_result(&ack)
    }

    #[tool(description = "Start a full STRM sync of the configured paths")]
    async fn full_sync(&self) -> McpResult<CallToolResult> {
        let settings = self.load_settings().await?;
        let ack = self.console.full_sync(&settings).await?;
        json_result(&ack)
    }

    #[tool(description = "Sync a 115 share link into STRM files")]
    async fn share_sync(
        &self,
        Parameters(req): Parameters<ShareSyncRequest>,
    ) -> McpResult<CallToolResult> {
        let settings = self.load_settings().await?;
        let ack = self.console.share_sync(&settings, req).await?;
        json_result(&ack)
    }

    #[tool(description = "List a directory on the host filesystem or the 115 drive")]
    async fn browse_dir(
        &self,
        Parameters(req): Parameters<BrowseDirRequest>,
    ) -> McpResult<CallToolResult> {
        req.validate()?;
        let settings = if *req.is_local() {
            PluginSettings::default()
        } else {
            self.load_settings().await?
        };
        let listing = self
            .console
            .browse(&settings, req.path(), *req.is_local())
            .await?;
        json_result(&listing)
    }

    #[tool(description = "Get the plugin's enabled, client and running status")]
    async fn get_status(&self) -> McpResult<CallToolResult> {
        let status = self.console.status().await?;
        json_result(&status)
    }

    #[tool(description = "Get 115 account information and storage usage")]
    async fn user_storage_status(&self) -> McpResult<CallToolResult> {
        let status = self.console.storage_status().await?;
        json_result(&status)
    }

    #[tool(description = "Open a 115 QR code login session and start polling its status")]
    async fn qr_login_start(
        &self,
        Parameters(req): Parameters<QrLoginStartRequest>,
    ) -> McpResult<CallToolResult> {
        let client_type = req.client_type().unwrap_or_default();
        let mut session = self.qr_login.lock().await;
        let snapshot = session.start(client_type).await;

        if let (Some(image_path), Some(challenge)) = (req.image_path(), &snapshot.challenge) {
            let written = write_qr_image(&challenge.qrcode, &PathBuf::from(image_path)).await;
            if let Err(e) = written {
                session.close();
                return Err(e.into());
            }
        }
        json_result(&snapshot)
    }

    #[tool(description = "Get the current QR code login state")]
    async fn qr_login_status(&self) -> McpResult<CallToolResult> {
        let snapshot = self.qr_login.lock().await.snapshot();
        json_result(&snapshot)
    }

    #[tool(description = "Request a new QR code, optionally for a different client type")]
    async fn qr_login_refresh(
        &self,
        Parameters(req): Parameters<QrLoginRefreshRequest>,
    ) -> McpResult<CallToolResult> {
        let mut session = self.qr_login.lock().await;
        let snapshot = match req.client_type() {
            Some(client_type) if *client_type != session.snapshot().client_type => {
                session.set_client_type(*client_type).await
            }
            _ => session.refresh().await,
        };
        json_result(&snapshot)
    }

    #[tool(description = "Close the QR code login session and stop polling")]
    async fn qr_login_close(&self) -> McpResult<CallToolResult> {
        let mut session = self.qr_login.lock().await;
        session.close();
        json_result(&session.snapshot())
    }

    #[tool(description = "Store the cookie captured by QR login in the configuration and save it")]
    async fn qr_login_apply(&self) -> McpResult<CallToolResult> {
        let mut session = self.qr_login.lock().await;
        let cookie = session.credential()?;

        let mut settings = self.load_settings().await?;
        settings.apply_credential(&cookie);
        let ack = self.console.save(settings).await?;
        session.close();

        tracing::info!("Stored QR login cookie in plugin configuration");
        json_result(&json!({ "saved": true, "host": ack }))
    }

    #[tool(description = "Decode a raw path-list string into entries")]
    async fn decode_path_list(
        &self,
        Parameters(req): Parameters<DecodePathListRequest>,
    ) -> McpResult<CallToolResult> {
        let entries = path_list::decode_entries(req.text(), *req.kind());
        json_result(&entries)
    }

    #[tool(description = "Encode path-list entries into the raw string stored by the plugin")]
    async fn encode_path_list(
        &self,
        Parameters(req): Parameters<EncodePathListRequest>,
    ) -> McpResult<CallToolResult> {
        let text = path_list::encode_entries(req.entries(), *req.kind())?;
        json_result(&json!({ "text": text }))
    }
}

#[prompt_router]
impl StrmHelperService {
    /// Explain how path lists are edited
    #[prompt(name = "path_list_guidance")]
    async fn path_list_guidance(
        &self,
        _ctx: RequestContext<rmcp::RoleServer>,
    ) -> McpResult<Vec<PromptMessage>> {
        let guidance = r#"Editing STRM Helper path lists:

1. **Mapping lists** (transfer, full sync, increment sync, life monitor and media-server paths)
   - Entries are {"local": "...", "remote": "..."}
   - local is the STRM output directory, remote the 115 drive directory
   - Stored as LOCAL#REMOTE, one pair per line

2. **Single lists** (pan transfer and scrape exclusion paths)
   - Entries are {"path": "..."}

3. **Round trips**
   - Whitespace around paths is trimmed on save
   - Entries with both sides empty are dropped on save
   - An empty list loads as one empty entry

4. **Workflow**
   - get_config, edit settings.path_lists, save_config
   - Run qr_login_start and qr_login_apply first if no cookie is configured"#;

        Ok(vec![PromptMessage {
            role: PromptMessageRole::Assistant,
            content: PromptMessageContent::text(guidance),
        }])
    }
}

#[tool_handler]
#[prompt_handler]
impl ServerHandler for StrmHelperService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_prompts()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "STRM Helper MCP Server for managing the 115 STRM helper plugin. Tools: get_config, save_config, full_sync, share_sync, browse_dir, get_status, user_storage_status, qr_login_start, qr_login_status, qr_login_refresh, qr_login_close, qr_login_apply, decode_path_list, encode_path_list.".to_string()
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<rmcp::RoleServer>,
    ) -> McpResult<ListResourcesResult> {
        Ok(ListResourcesResult {
            resources: vec![
                self.create_resource_text("strm://status", "server-status"),
                self.create_resource_text("strm://help", "help-documentation"),
            ],
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _: RequestContext<rmcp::RoleServer>,
    ) -> McpResult<ReadResourceResult> {
        match uri.as_str() {
            "strm://status" => {
                let status = self.generate_status_content().await;
                Ok(ReadResourceResult {
                    contents: vec![ResourceContents::text(status, uri)],
                })
            }
            "strm://help" => Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(self.generate_help_content(), uri)],
            }),
            _ => Err(StrmHelperError::ResourceNotFound {
                uri: uri.to_string(),
            }
            .into()),
        }
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _: RequestContext<rmcp::RoleServer>,
    ) -> McpResult<ListResourceTemplatesResult> {
        Ok(ListResourceTemplatesResult {
            next_cursor: None,
            resource_templates: Vec::new(),
        })
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> McpResult<InitializeResult> {
        tracing::info!("STRM Helper MCP Server initialized successfully");
        Ok(self.get_info())
    }
}

/// Run the STRM Helper MCP server
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    use rmcp::{ServiceExt, transport::stdio};

    tracing::info!(
        host_url = %config.host_url,
        plugin_id = %config.plugin_id,
        "Starting STRM Helper MCP server"
    );

    let service = StrmHelperService::new(&config)?
        .serve(stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("serving error: {:?}", e);
        })?;

    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        path_list::{PathEntry, PathListKind, PathPair},
        qr_login::{ClientType, QrStatus},
        testing::ScriptedHost,
    };
    use std::time::Duration;

    fn service(host: &Arc<ScriptedHost>) -> StrmHelperService {
        StrmHelperService::with_api(
            host.clone(),
            "P115StrmHelper",
            QrLoginOptions::default(),
            "http://127.0.0.1:3001/api/v1/".to_string(),
        )
    }

    fn challenge() -> serde_json::Value {
        json!({
            "code": 0,
            "uid": "uid-1",
            "time": "1700000000",
            "sign": "sign-1",
            "qrcode": "data:image/png;base64,iVBORw0KGgo=",
            "tips": "Scan with WeChat",
            "client_type": "wechatmini"
        })
    }

    #[test]
    fn test_service_creation() {
        let host = Arc::new(ScriptedHost::new());
        let info = service(&host).get_info();
        assert!(info.instructions.is_some());
        assert!(info.instructions.unwrap().contains("STRM Helper MCP Server"));
    }

    #[test]
    fn test_available_resources() {
        assert_eq!(AVAILABLE_RESOURCES.len(), 2);
        assert!(AVAILABLE_RESOURCES.contains(&"strm://status"));
        assert!(AVAILABLE_RESOURCES.contains(&"strm://help"));
    }

    #[tokio::test]
    async fn test_resource_generation() {
        let host = Arc::new(ScriptedHost::new());
        let service = service(&host);

        let status = service.generate_status_content().await;
        assert!(status.contains("STRM Helper MCP Server Status"));
        assert!(status.contains("plugin/P115StrmHelper/get_config"));

        assert!(service
            .generate_help_content()
            .contains("STRM Helper MCP Server Help"));
    }

    #[tokio::test]
    async fn test_get_config_tool() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get("get_config", json!({"enabled": true}));

        let result = service(&host).get_config().await;
        assert!(result.is_ok());
        assert_eq!(host.calls("get_config"), 1);
    }

    #[tokio::test]
    async fn test_save_config_tool_rejects_invalid_settings() {
        let host = Arc::new(ScriptedHost::new());
        let mut settings = PluginSettings::default();
        settings.scalars.moviepilot_address = "nowhere".to_string();

        let result = service(&host)
            .save_config(Parameters(SaveConfigRequest::new(settings)))
            .await;
        assert!(result.is_err());
        assert_eq!(host.calls("save_config"), 0);
    }

    #[tokio::test]
    async fn test_full_sync_tool_without_cookie() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get("get_config", json!({"cookies": ""}));

        let result = service(&host).full_sync().await;
        assert!(result.is_err());
        assert_eq!(host.calls("full_sync"), 0);
    }

    #[tokio::test]
    async fn test_share_sync_tool() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get("get_config", json!({"cookies": "UID=1"}));
        host.push_post("share_sync", json!({"code": 0}));

        let result = service(&host)
            .share_sync(Parameters(ShareSyncRequest::with_link(
                "https://115.com/s/abc",
                "/strm/share",
            )))
            .await;
        assert!(result.is_ok());
        assert_eq!(host.calls("share_sync"), 1);
    }

    #[tokio::test]
    async fn test_local_browse_skips_config() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get("browse_dir", json!({"code": 0, "items": []}));

        let result = service(&host)
            .browse_dir(Parameters(BrowseDirRequest::new("/media", true)))
            .await;
        assert!(result.is_ok());
        assert_eq!(host.calls("get_config"), 0);
    }

    #[tokio::test]
    async fn test_remote_browse_without_cookie() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get("get_config", json!({}));

        let result = service(&host)
            .browse_dir(Parameters(BrowseDirRequest::new("/", false)))
            .await;
        assert!(result.is_err());
        assert_eq!(host.calls("browse_dir"), 0);
    }

    #[tokio::test]
    async fn test_path_list_tools() {
        let host = Arc::new(ScriptedHost::new());
        let service = service(&host);

        let decoded = service
            .decode_path_list(Parameters(DecodePathListRequest::new(
                "/a#/b",
                PathListKind::Mapping,
            )))
            .await;
        assert!(decoded.is_ok());

        let encoded = service
            .encode_path_list(Parameters(EncodePathListRequest::new(
                vec![PathEntry::Pair(PathPair::new("/a", "/b"))],
                PathListKind::Single,
            )))
            .await;
        assert!(encoded.is_err());
    }

    #[tokio::test]
    async fn test_qr_login_apply_requires_success() {
        let host = Arc::new(ScriptedHost::new());
        let result = service(&host).qr_login_apply().await;
        assert!(result.is_err());
        assert_eq!(host.calls("get_config"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qr_login_start_writes_image_and_apply_saves_cookie() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get("get_qrcode", challenge());
        host.push_get(
            "check_qrcode",
            json!({"code": 0, "status": "success", "cookie": "UID=42"}),
        );
        host.push_get("get_config", json!({"enabled": true, "cookies": ""}));
        host.push_post("save_config", json!({"code": 0}));

        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("login.png");
        let service = service(&host);

        let result = service
            .qr_login_start(Parameters(QrLoginStartRequest::new(
                Some(ClientType::WechatMini),
                Some(image_path.display().to_string()),
            )))
            .await;
        assert!(result.is_ok());
        assert!(image_path.exists());

        let settled = service.qr_login.lock().await.wait_until_settled().await;
        assert_eq!(settled.status, QrStatus::Success);

        let result = service.qr_login_apply().await;
        assert!(result.is_ok());

        let bodies = host.bodies("save_config");
        assert_eq!(bodies[0]["cookies"], json!("UID=42"));
        assert_eq!(bodies[0]["enabled"], json!(true));
        assert_eq!(
            service.qr_login.lock().await.snapshot().status,
            QrStatus::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_qr_login_start_image_failure_closes_session() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get("get_qrcode", challenge());
        host.set_fallback_get("check_qrcode", json!({"code": 0, "status": "waiting"}));

        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("missing").join("login.png");
        let service = service(&host);

        let result = service
            .qr_login_start(Parameters(QrLoginStartRequest::new(
                None,
                Some(image_path.display().to_string()),
            )))
            .await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(host.calls("check_qrcode"), 0);

        let session = service.qr_login.lock().await;
        assert!(!session.is_polling());
        assert_eq!(session.snapshot().status, QrStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qr_login_close_tool_stops_polling() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get("get_qrcode", challenge());
        host.set_fallback_get("check_qrcode", json!({"code": 0, "status": "waiting"}));
        let service = service(&host);

        service
            .qr_login_start(Parameters(QrLoginStartRequest::default()))
            .await
            .unwrap();
        assert!(service.qr_login_close().await.is_ok());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(host.calls("check_qrcode"), 0);
    }
}
