use derive_getters::Getters;
use rmcp::schemars;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::core::{
    error::{StrmHelperError, StrmHelperResult},
    path_list::{PathEntry, PathListKind},
    qr_login::ClientType,
    settings::{ConfigDocument, PluginSettings, Validate, deserialize_null_default},
};

/// Helper function to deserialize and trim strings
fn deserialize_trimmed_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(s.trim().to_string())
}

/// Accept either a JSON string or number, keeping it as text
fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {other}"
        ))),
    }
}

fn default_true() -> bool {
    true
}

fn default_browse_path() -> String {
    "/".to_string()
}

// ---------------------------------------------------------------------------
// Host responses
// ---------------------------------------------------------------------------

/// A media server the host knows about, offered as a select option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct MediaServerOption {
    pub title: String,
    pub value: String,
}

/// `get_config` payload: the configuration plus known media servers
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetConfigResponse {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub mediaservers: Vec<MediaServerOption>,
    #[serde(flatten)]
    pub config: ConfigDocument,
}

/// Generic `{code, msg}` acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HostAck {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
}

impl HostAck {
    pub fn is_accepted(&self) -> bool {
        self.code == 0
    }

    /// Turn a non-zero code into a `Rejected` error
    pub fn accepted(self, operation: &str) -> StrmHelperResult<Self> {
        if self.is_accepted() {
            Ok(self)
        } else {
            Err(StrmHelperError::Rejected {
                operation: operation.to_string(),
                code: self.code,
                message: self.msg.unwrap_or_else(|| "no message".to_string()),
            })
        }
    }
}

/// One directory listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    #[serde(alias = "isDir")]
    pub is_dir: bool,
}

/// `browse_dir` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct BrowseDirResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub items: Vec<DirEntry>,
}

/// `get_qrcode` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QrChallengeResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub uid: String,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub time: String,
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    pub sign: String,
    /// Image payload, usually a `data:image/png;base64,` URL
    #[serde(default)]
    pub qrcode: String,
    #[serde(default)]
    pub tips: Option<String>,
    #[serde(default, alias = "clientType")]
    pub client_type: Option<ClientType>,
}

/// `check_qrcode` payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QrStatusResponse {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "cookies", alias = "credential")]
    pub cookie: Option<String>,
}

/// `get_status` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct PluginStatus {
    pub enabled: bool,
    #[serde(alias = "hasClient")]
    pub has_client: bool,
    pub running: bool,
}

/// `user_storage_status` payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct StorageStatus {
    pub success: bool,
    #[serde(alias = "userInfo")]
    pub user_info: Option<Value>,
    #[serde(alias = "storageInfo")]
    pub storage_info: Option<Value>,
    #[serde(alias = "errorMessage")]
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Tool requests
// ---------------------------------------------------------------------------

/// Save a full configuration
#[derive(Debug, Deserialize, schemars::JsonSchema, Getters)]
pub struct SaveConfigRequest {
    /// Settings as returned by get_config, with edits applied
    settings: PluginSettings,
}

impl SaveConfigRequest {
    #[cfg(test)]
    pub fn new(settings: PluginSettings) -> Self {
        Self { settings }
    }

    pub fn into_settings(self) -> PluginSettings {
        self.settings
    }
}

impl Validate for SaveConfigRequest {
    fn validate(&self) -> StrmHelperResult<()> {
        self.settings.validate()
    }
}

/// Transfer a share link into local STRM files
#[derive(Debug, Clone, Default, Serialize, Deserialize, schemars::JsonSchema, Getters)]
pub struct ShareSyncRequest {
    /// Full 115 share link; takes precedence over share_code
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    share_link: String,
    /// Share code when no link is given
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    share_code: String,
    /// Receive (extraction) code
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    receive_code: String,
    /// Path inside the share to sync
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    pan_path: String,
    /// Local directory receiving the STRM files
    #[serde(default, deserialize_with = "deserialize_trimmed_string")]
    local_path: String,
}

impl ShareSyncRequest {
    #[cfg(test)]
    pub fn with_link(link: &str, local_path: &str) -> Self {
        Self {
            share_link: link.to_string(),
            local_path: local_path.to_string(),
            ..Self::default()
        }
    }

    /// Fill blank fields from the saved share settings
    pub fn merged_with(mut self, settings: &PluginSettings) -> Self {
        let scalars = &settings.scalars;
        let fill = |field: &mut String, saved: &str| {
            if field.is_empty() {
                *field = saved.trim().to_string();
            }
        };
        fill(&mut self.share_link, &scalars.user_share_link);
        fill(&mut self.share_code, &scalars.user_share_code);
        fill(&mut self.receive_code, &scalars.user_receive_code);
        fill(&mut self.pan_path, &scalars.user_share_pan_path);
        fill(&mut self.local_path, &scalars.user_share_local_path);
        self
    }
}

impl Validate for ShareSyncRequest {
    fn validate(&self) -> StrmHelperResult<()> {
        if self.share_link.is_empty() && self.share_code.is_empty() {
            return Err(StrmHelperError::validation(
                "share_link",
                "a share link or share code is required",
            ));
        }
        if self.local_path.is_empty() {
            return Err(StrmHelperError::validation(
                "local_path",
                "a local path is required",
            ));
        }
        Ok(())
    }
}

/// List a directory on the host or in the 115 drive
#[derive(Debug, Deserialize, schemars::JsonSchema, Getters)]
pub struct BrowseDirRequest {
    /// Directory to list
    #[serde(
        default = "default_browse_path",
        deserialize_with = "deserialize_trimmed_string"
    )]
    path: String,
    /// true for the host filesystem, false for the 115 drive
    #[serde(default = "default_true")]
    is_local: bool,
}

impl BrowseDirRequest {
    #[cfg(test)]
    pub fn new(path: &str, is_local: bool) -> Self {
        Self {
            path: path.to_string(),
            is_local,
        }
    }
}

impl Validate for BrowseDirRequest {
    fn validate(&self) -> StrmHelperResult<()> {
        if self.path.is_empty() {
            return Err(StrmHelperError::validation("path", "path is required"));
        }
        Ok(())
    }
}

/// Open the QR login dialog
#[derive(Debug, Default, Deserialize, schemars::JsonSchema, Getters)]
pub struct QrLoginStartRequest {
    /// Which 115 client the login is issued for
    #[serde(default)]
    client_type: Option<ClientType>,
    /// Optional file to write the QR code PNG to
    #[serde(default)]
    image_path: Option<String>,
}

impl QrLoginStartRequest {
    #[cfg(test)]
    pub fn new(client_type: Option<ClientType>, image_path: Option<String>) -> Self {
        Self {
            client_type,
            image_path,
        }
    }
}

/// Refresh the QR code, optionally switching client type
#[derive(Debug, Default, Deserialize, schemars::JsonSchema, Getters)]
pub struct QrLoginRefreshRequest {
    /// New client type; keeps the current one when omitted
    #[serde(default)]
    client_type: Option<ClientType>,
}

/// Decode a raw path-list string
#[derive(Debug, Deserialize, schemars::JsonSchema, Getters)]
pub struct DecodePathListRequest {
    /// Newline-delimited text as stored by the plugin
    text: String,
    /// mapping (LOCAL#REMOTE) or single (one path per line)
    kind: PathListKind,
}

impl DecodePathListRequest {
    #[cfg(test)]
    pub fn new(text: &str, kind: PathListKind) -> Self {
        Self {
            text: text.to_string(),
            kind,
        }
    }
}

/// Encode entries into a raw path-list string
#[derive(Debug, Deserialize, schemars::JsonSchema, Getters)]
pub struct EncodePathListRequest {
    /// `{local, remote}` objects for mapping lists, `{path}` objects for single lists
    entries: Vec<PathEntry>,
    kind: PathListKind,
}

impl EncodePathListRequest {
    #[cfg(test)]
    pub fn new(entries: Vec<PathEntry>, kind: PathListKind) -> Self {
        Self { entries, kind }
    }
}
