use std::str::FromStr;

use rmcp::schemars;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::core::{
    error::{PathListError, StrmHelperError, StrmHelperResult},
    path_list::{self, ExcludePathEntry, PathListKind, PathPair},
};

pub trait Validate {
    fn validate(&self) -> StrmHelperResult<()>;
}

/// Treat an explicit `null` from the host as the field's default.
pub(crate) fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `null` and non-string values for a path-list field, treating
/// them as an empty list.
fn deserialize_path_list<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let found = match value {
        Value::String(text) => return Ok(text),
        Value::Null => return Ok(String::new()),
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    let error = PathListError::NotAString {
        field: "path list".to_string(),
        found: found.to_string(),
    };
    warn!(error = %error, "Ignoring malformed path list value");
    Ok(String::new())
}

/// The path-list keys of the plugin configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PathListField {
    TransferMonitorPaths,
    TransferMpMediaserverPaths,
    FullSyncStrmPaths,
    IncrementSyncStrmPaths,
    IncrementSyncMpMediaserverPaths,
    MonitorLifePaths,
    MonitorLifeMpMediaserverPaths,
    PanTransferPaths,
    TransferMonitorScrapeMetadataExcludePaths,
    IncrementSyncScrapeMetadataExcludePaths,
    MonitorLifeScrapeMetadataExcludePaths,
}

impl PathListField {
    pub const ALL: [PathListField; 11] = [
        Self::TransferMonitorPaths,
        Self::TransferMpMediaserverPaths,
        Self::FullSyncStrmPaths,
        Self::IncrementSyncStrmPaths,
        Self::IncrementSyncMpMediaserverPaths,
        Self::MonitorLifePaths,
        Self::MonitorLifeMpMediaserverPaths,
        Self::PanTransferPaths,
        Self::TransferMonitorScrapeMetadataExcludePaths,
        Self::IncrementSyncScrapeMetadataExcludePaths,
        Self::MonitorLifeScrapeMetadataExcludePaths,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::TransferMonitorPaths => "transfer_monitor_paths",
            Self::TransferMpMediaserverPaths => "transfer_mp_mediaserver_paths",
            Self::FullSyncStrmPaths => "full_sync_strm_paths",
            Self::IncrementSyncStrmPaths => "increment_sync_strm_paths",
            Self::IncrementSyncMpMediaserverPaths => "increment_sync_mp_mediaserver_paths",
            Self::MonitorLifePaths => "monitor_life_paths",
            Self::MonitorLifeMpMediaserverPaths => "monitor_life_mp_mediaserver_paths",
            Self::PanTransferPaths => "pan_transfer_paths",
            Self::TransferMonitorScrapeMetadataExcludePaths => {
                "transfer_monitor_scrape_metadata_exclude_paths"
            }
            Self::IncrementSyncScrapeMetadataExcludePaths => {
                "increment_sync_scrape_metadata_exclude_paths"
            }
            Self::MonitorLifeScrapeMetadataExcludePaths => {
                "monitor_life_scrape_metadata_exclude_paths"
            }
        }
    }

    pub fn kind(self) -> PathListKind {
        match self {
            Self::PanTransferPaths
            | Self::TransferMonitorScrapeMetadataExcludePaths
            | Self::IncrementSyncScrapeMetadataExcludePaths
            | Self::MonitorLifeScrapeMetadataExcludePaths => PathListKind::Single,
            _ => PathListKind::Mapping,
        }
    }
}

/// Every setting that is not a path list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct ScalarSettings {
    #[serde(deserialize_with = "deserialize_null_default")]
    pub enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub notify: bool,
    /// 115 credential captured by QR login
    #[serde(deserialize_with = "deserialize_null_default")]
    pub cookies: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub moviepilot_address: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub user_rmt_mediaext: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub user_download_mediaext: String,

    #[serde(deserialize_with = "deserialize_null_default")]
    pub transfer_monitor_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub transfer_monitor_scrape_metadata_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub transfer_monitor_mediaservers: Vec<String>,

    #[serde(deserialize_with = "deserialize_null_default")]
    pub timing_full_sync_strm: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub cron_full_sync_strm: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub full_sync_auto_download_mediainfo_enabled: bool,

    #[serde(deserialize_with = "deserialize_null_default")]
    pub increment_sync_strm_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub increment_sync_cron: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub increment_sync_auto_download_mediainfo_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub increment_sync_scrape_metadata_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub increment_sync_mediaservers: Vec<String>,

    #[serde(deserialize_with = "deserialize_null_default")]
    pub monitor_life_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub monitor_life_auth: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub monitor_life_event_modes: Vec<String>,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub monitor_life_scrape_metadata_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub monitor_life_mediaservers: Vec<String>,

    #[serde(deserialize_with = "deserialize_null_default")]
    pub pan_transfer_enabled: bool,

    #[serde(deserialize_with = "deserialize_null_default")]
    pub share_strm_auto_download_mediainfo_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub user_share_code: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub user_receive_code: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub user_share_link: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub user_share_pan_path: String,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub user_share_local_path: String,

    #[serde(deserialize_with = "deserialize_null_default")]
    pub clear_recyclebin_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub clear_receive_path_enabled: bool,
    #[serde(deserialize_with = "deserialize_null_default")]
    pub cron_clear: String,
}

/// Path-list fields in the host's delimited string form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct RawPathLists {
    #[serde(deserialize_with = "deserialize_path_list")]
    pub transfer_monitor_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub transfer_mp_mediaserver_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub full_sync_strm_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub increment_sync_strm_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub increment_sync_mp_mediaserver_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub monitor_life_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub monitor_life_mp_mediaserver_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub pan_transfer_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub transfer_monitor_scrape_metadata_exclude_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub increment_sync_scrape_metadata_exclude_paths: String,
    #[serde(deserialize_with = "deserialize_path_list")]
    pub monitor_life_scrape_metadata_exclude_paths: String,
}

/// Path-list fields as typed entries. Omitted lists hold the placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(default)]
pub struct PathLists {
    pub transfer_monitor_paths: Vec<PathPair>,
    pub transfer_mp_mediaserver_paths: Vec<PathPair>,
    pub full_sync_strm_paths: Vec<PathPair>,
    pub increment_sync_strm_paths: Vec<PathPair>,
    pub increment_sync_mp_mediaserver_paths: Vec<PathPair>,
    pub monitor_life_paths: Vec<PathPair>,
    pub monitor_life_mp_mediaserver_paths: Vec<PathPair>,
    pub pan_transfer_paths: Vec<ExcludePathEntry>,
    pub transfer_monitor_scrape_metadata_exclude_paths: Vec<ExcludePathEntry>,
    pub increment_sync_scrape_metadata_exclude_paths: Vec<ExcludePathEntry>,
    pub monitor_life_scrape_metadata_exclude_paths: Vec<ExcludePathEntry>,
}

impl Default for PathLists {
    fn default() -> Self {
        Self::decode(&RawPathLists::default())
    }
}

impl PathLists {
    fn decode(raw: &RawPathLists) -> Self {
        Self {
            transfer_monitor_paths: path_list::decode(&raw.transfer_monitor_paths),
            transfer_mp_mediaserver_paths: path_list::decode(&raw.transfer_mp_mediaserver_paths),
            full_sync_strm_paths: path_list::decode(&raw.full_sync_strm_paths),
            increment_sync_strm_paths: path_list::decode(&raw.increment_sync_strm_paths),
            increment_sync_mp_mediaserver_paths: path_list::decode(
                &raw.increment_sync_mp_mediaserver_paths,
            ),
            monitor_life_paths: path_list::decode(&raw.monitor_life_paths),
            monitor_life_mp_mediaserver_paths: path_list::decode(
                &raw.monitor_life_mp_mediaserver_paths,
            ),
            pan_transfer_paths: path_list::decode(&raw.pan_transfer_paths),
            transfer_monitor_scrape_metadata_exclude_paths: path_list::decode(
                &raw.transfer_monitor_scrape_metadata_exclude_paths,
            ),
            increment_sync_scrape_metadata_exclude_paths: path_list::decode(
                &raw.increment_sync_scrape_metadata_exclude_paths,
            ),
            monitor_life_scrape_metadata_exclude_paths: path_list::decode(
                &raw.monitor_life_scrape_metadata_exclude_paths,
            ),
        }
    }

    fn encode(&self) -> RawPathLists {
        RawPathLists {
            transfer_monitor_paths: path_list::encode(&self.transfer_monitor_paths),
            transfer_mp_mediaserver_paths: path_list::encode(&self.transfer_mp_mediaserver_paths),
            full_sync_strm_paths: path_list::encode(&self.full_sync_strm_paths),
            increment_sync_strm_paths: path_list::encode(&self.increment_sync_strm_paths),
            increment_sync_mp_mediaserver_paths: path_list::encode(
                &self.increment_sync_mp_mediaserver_paths,
            ),
            monitor_life_paths: path_list::encode(&self.monitor_life_paths),
            monitor_life_mp_mediaserver_paths: path_list::encode(
                &self.monitor_life_mp_mediaserver_paths,
            ),
            pan_transfer_paths: path_list::encode(&self.pan_transfer_paths),
            transfer_monitor_scrape_metadata_exclude_paths: path_list::encode(
                &self.transfer_monitor_scrape_metadata_exclude_paths,
            ),
            increment_sync_scrape_metadata_exclude_paths: path_list::encode(
                &self.increment_sync_scrape_metadata_exclude_paths,
            ),
            monitor_life_scrape_metadata_exclude_paths: path_list::encode(
                &self.monitor_life_scrape_metadata_exclude_paths,
            ),
        }
    }

    /// Mapping pairs stored under `field`, if it is a mapping list
    pub fn pairs(&self, field: PathListField) -> Option<&[PathPair]> {
        let pairs = match field {
            PathListField::TransferMonitorPaths => &self.transfer_monitor_paths,
            PathListField::TransferMpMediaserverPaths => &self.transfer_mp_mediaserver_paths,
            PathListField::FullSyncStrmPaths => &self.full_sync_strm_paths,
            PathListField::IncrementSyncStrmPaths => &self.increment_sync_strm_paths,
            PathListField::IncrementSyncMpMediaserverPaths => {
                &self.increment_sync_mp_mediaserver_paths
            }
            PathListField::MonitorLifePaths => &self.monitor_life_paths,
            PathListField::MonitorLifeMpMediaserverPaths => &self.monitor_life_mp_mediaserver_paths,
            _ => return None,
        };
        Some(pairs)
    }

    /// Single-path entries stored under `field`, if it is a single list
    pub fn paths(&self, field: PathListField) -> Option<&[ExcludePathEntry]> {
        let paths = match field {
            PathListField::PanTransferPaths => &self.pan_transfer_paths,
            PathListField::TransferMonitorScrapeMetadataExcludePaths => {
                &self.transfer_monitor_scrape_metadata_exclude_paths
            }
            PathListField::IncrementSyncScrapeMetadataExcludePaths => {
                &self.increment_sync_scrape_metadata_exclude_paths
            }
            PathListField::MonitorLifeScrapeMetadataExcludePaths => {
                &self.monitor_life_scrape_metadata_exclude_paths
            }
            _ => return None,
        };
        Some(paths)
    }
}

/// The configuration document exchanged with the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ConfigDocument {
    #[serde(flatten)]
    pub scalars: ScalarSettings,
    #[serde(flatten)]
    pub path_lists: RawPathLists,
    /// Keys this server does not model, passed back untouched on save
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The configuration as edited: path lists are typed entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PluginSettings {
    #[serde(flatten)]
    pub scalars: ScalarSettings,
    #[serde(default)]
    pub path_lists: PathLists,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl PluginSettings {
    pub fn from_document(document: ConfigDocument) -> Self {
        Self {
            path_lists: PathLists::decode(&document.path_lists),
            scalars: document.scalars,
            extra: document.extra,
        }
    }

    pub fn into_document(self) -> ConfigDocument {
        ConfigDocument {
            path_lists: self.path_lists.encode(),
            scalars: self.scalars,
            extra: self.extra,
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.scalars.cookies.trim().is_empty()
    }

    /// Store a credential obtained from QR login
    pub fn apply_credential(&mut self, cookie: &str) {
        self.scalars.cookies = cookie.trim().to_string();
    }

    /// Abort an action that needs a 115 credential
    pub fn require_credential(&self, action: &str) -> StrmHelperResult<()> {
        if self.has_credential() {
            Ok(())
        } else {
            Err(StrmHelperError::validation(
                "cookies",
                format!("a 115 cookie is required before {action}; log in with a QR code first"),
            ))
        }
    }
}

/// Check a crontab expression. Five-field expressions get a seconds field.
pub fn validate_cron(field: &str, expression: &str) -> StrmHelperResult<()> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(StrmHelperError::validation(field, "cron expression is required"));
    }

    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    };

    cron::Schedule::from_str(&normalized)
        .map(|_| ())
        .map_err(|e| StrmHelperError::validation(field, format!("`{expression}`: {e}")))
}

impl Validate for PluginSettings {
    fn validate(&self) -> StrmHelperResult<()> {
        let scalars = &self.scalars;

        if scalars.timing_full_sync_strm {
            validate_cron("cron_full_sync_strm", &scalars.cron_full_sync_strm)?;
        }
        if scalars.increment_sync_strm_enabled {
            validate_cron("increment_sync_cron", &scalars.increment_sync_cron)?;
        }
        if scalars.clear_recyclebin_enabled || scalars.clear_receive_path_enabled {
            validate_cron("cron_clear", &scalars.cron_clear)?;
        }

        let address = scalars.moviepilot_address.trim();
        if !address.is_empty() {
            let parsed = url::Url::parse(address).map_err(|e| {
                StrmHelperError::validation("moviepilot_address", format!("`{address}`: {e}"))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(StrmHelperError::validation(
                    "moviepilot_address",
                    format!("`{address}` must use http or https"),
                ));
            }
        }

        Ok(())
    }
}
