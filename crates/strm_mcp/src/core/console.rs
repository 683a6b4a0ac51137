use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::{
    error::{StrmHelperError, StrmHelperResult},
    host_api::{HostApi, PluginRoutes, parse_response},
    models::{
        BrowseDirResponse, DirEntry, GetConfigResponse, HostAck, MediaServerOption, PluginStatus,
        ShareSyncRequest, StorageStatus,
    },
    settings::{PathListField, PluginSettings, Validate},
};

/// Configuration as loaded from the host
#[derive(Debug, Clone, Serialize)]
pub struct LoadedConfig {
    pub settings: PluginSettings,
    pub mediaservers: Vec<MediaServerOption>,
}

/// A directory listing, directories first
#[derive(Debug, Clone, Serialize)]
pub struct DirListing {
    pub path: String,
    pub is_local: bool,
    pub items: Vec<DirEntry>,
}

/// Operations of the plugin's configuration and management pages
#[derive(Clone)]
pub struct PluginConsole {
    api: Arc<dyn HostApi>,
    routes: PluginRoutes,
}

impl PluginConsole {
    pub fn new(api: Arc<dyn HostApi>, routes: PluginRoutes) -> Self {
        Self { api, routes }
    }

    pub fn routes(&self) -> &PluginRoutes {
        &self.routes
    }

    /// Fetch the configuration and decode its path lists
    pub async fn load(&self) -> StrmHelperResult<LoadedConfig> {
        let path = self.routes.get_config();
        let value = self.api.get(&path).await?;
        let response: GetConfigResponse = parse_response(&path, value)?;

        Ok(LoadedConfig {
            settings: PluginSettings::from_document(response.config),
            mediaservers: response.mediaservers,
        })
    }

    /// Validate, encode and hand the configuration to the host.
    ///
    /// Only acceptance of the request is awaited; the host persists it.
    pub async fn save(&self, settings: PluginSettings) -> StrmHelperResult<HostAck> {
        settings.validate()?;

        let path = self.routes.save_config();
        let document = settings.into_document();
        let body = serde_json::to_value(&document).map_err(|e| StrmHelperError::ClientError {
            message: format!("failed to serialize configuration: {e}"),
        })?;

        let value = self.api.post(&path, body).await?;
        let ack = parse_response::<HostAck>(&path, value)?.accepted("save_config")?;
        info!(plugin_route = %path, "Configuration handed to host");
        Ok(ack)
    }

    /// Start a full STRM sync. `code = 0` means the job was accepted.
    pub async fn full_sync(&self, settings: &PluginSettings) -> StrmHelperResult<HostAck> {
        settings.require_credential("running a full sync")?;
        let configured = settings
            .path_lists
            .pairs(PathListField::FullSyncStrmPaths)
            .is_some_and(|pairs| pairs.iter().any(|pair| !pair.local.is_empty()));
        if !configured {
            warn!("No full sync paths configured; the host will have nothing to sync");
        }

        let path = self.routes.full_sync();
        let value = self.api.post(&path, serde_json::json!({})).await?;
        let ack = parse_response::<HostAck>(&path, value)?.accepted("full_sync")?;
        info!("Full sync accepted by host");
        Ok(ack)
    }

    /// Sync a share link into STRM files
    pub async fn share_sync(
        &self,
        settings: &PluginSettings,
        request: ShareSyncRequest,
    ) -> StrmHelperResult<HostAck> {
        settings.require_credential("running a share sync")?;
        let request = request.merged_with(settings);
        request.validate()?;

        let path = self.routes.share_sync();
        let body = serde_json::json!({
            "share_link": request.share_link(),
            "share_code": request.share_code(),
            "receive_code": request.receive_code(),
            "pan_path": request.pan_path(),
            "local_path": request.local_path(),
        });
        let value = self.api.post(&path, body).await?;
        let ack = parse_response::<HostAck>(&path, value)?.accepted("share_sync")?;
        info!(local_path = %request.local_path(), "Share sync accepted by host");
        Ok(ack)
    }

    /// List a directory. Browsing the 115 drive needs a credential.
    pub async fn browse(
        &self,
        settings: &PluginSettings,
        dir: &str,
        is_local: bool,
    ) -> StrmHelperResult<DirListing> {
        if !is_local {
            settings.require_credential("browsing the 115 drive")?;
        }

        let path = self.routes.browse_dir(dir, is_local);
        let value = self.api.get(&path).await?;
        let response: BrowseDirResponse = parse_response(&path, value)?;
        HostAck {
            code: response.code,
            msg: response.msg.clone(),
        }
        .accepted("browse_dir")
        .inspect_err(|e| warn!(dir = %dir, is_local, error = %e, "Directory listing rejected"))?;

        let mut items = response.items;
        items.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));

        Ok(DirListing {
            path: if response.path.is_empty() {
                dir.to_string()
            } else {
                response.path
            },
            is_local,
            items,
        })
    }

    /// Dashboard widget status
    pub async fn status(&self) -> StrmHelperResult<PluginStatus> {
        let path = self.routes.get_status();
        let value = self.api.get(&path).await?;
        Ok(parse_response(&path, value)?)
    }

    /// 115 account and storage usage
    pub async fn storage_status(&self) -> StrmHelperResult<StorageStatus> {
        let path = self.routes.user_storage_status();
        let value = self.api.get(&path).await?;
        Ok(parse_response(&path, value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{path_list::PathPair, testing::ScriptedHost};
    use serde_json::json;

    fn console(host: &Arc<ScriptedHost>) -> PluginConsole {
        PluginConsole::new(host.clone(), PluginRoutes::new("P115StrmHelper"))
    }

    fn logged_in() -> PluginSettings {
        let mut settings = PluginSettings::default();
        settings.apply_credential("UID=1");
        settings
    }

    #[tokio::test]
    async fn test_load_decodes_path_lists() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get(
            "get_config",
            json!({
                "enabled": true,
                "full_sync_strm_paths": "/strm/movies#/115/movies",
                "mediaservers": [{"title": "Jellyfin", "value": "jellyfin"}]
            }),
        );

        let loaded = console(&host).load().await.unwrap();
        assert!(loaded.settings.scalars.enabled);
        assert_eq!(
            loaded.settings.path_lists.full_sync_strm_paths,
            vec![PathPair::new("/strm/movies", "/115/movies")]
        );
        assert_eq!(loaded.mediaservers[0].value, "jellyfin");
    }

    #[tokio::test]
    async fn test_save_encodes_path_lists() {
        let host = Arc::new(ScriptedHost::new());
        host.push_post("save_config", json!({"code": 0}));

        let mut settings = PluginSettings::default();
        settings.path_lists.monitor_life_paths = vec![
            PathPair::new(" /strm/tv ", "/115/tv"),
            PathPair::default(),
        ];
        settings
            .extra
            .insert("unknown_flag".to_string(), json!(true));

        console(&host).save(settings).await.unwrap();

        let bodies = host.bodies("save_config");
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["monitor_life_paths"], json!("/strm/tv#/115/tv"));
        assert_eq!(bodies[0]["pan_transfer_paths"], json!(""));
        assert_eq!(bodies[0]["unknown_flag"], json!(true));
        assert!(bodies[0].get("path_lists").is_none());
    }

    #[tokio::test]
    async fn test_save_accepts_empty_response() {
        let host = Arc::new(ScriptedHost::new());
        host.push_post("save_config", serde_json::Value::Null);

        let ack = console(&host).save(PluginSettings::default()).await.unwrap();
        assert!(ack.is_accepted());
    }

    #[tokio::test]
    async fn test_save_invalid_settings_makes_no_request() {
        let host = Arc::new(ScriptedHost::new());
        let mut settings = PluginSettings::default();
        settings.scalars.increment_sync_strm_enabled = true;
        settings.scalars.increment_sync_cron = "bogus".to_string();

        let result = console(&host).save(settings).await;
        assert!(matches!(result, Err(StrmHelperError::Validation { .. })));
        assert_eq!(host.calls("save_config"), 0);
    }

    #[tokio::test]
    async fn test_full_sync_requires_cookie() {
        let host = Arc::new(ScriptedHost::new());
        let result = console(&host).full_sync(&PluginSettings::default()).await;

        assert!(matches!(result, Err(StrmHelperError::Validation { .. })));
        assert_eq!(host.calls("full_sync"), 0);
    }

    #[tokio::test]
    async fn test_full_sync_accepted_and_rejected() {
        let host = Arc::new(ScriptedHost::new());
        host.push_post("full_sync", json!({"code": 0, "msg": "started"}));
        host.push_post("full_sync", json!({"code": -1, "msg": "already running"}));
        let console = console(&host);

        let ack = console.full_sync(&logged_in()).await.unwrap();
        assert_eq!(ack.msg.as_deref(), Some("started"));

        let err = console.full_sync(&logged_in()).await.unwrap_err();
        assert!(matches!(err, StrmHelperError::Rejected { code: -1, .. }));
    }

    #[tokio::test]
    async fn test_share_sync_uses_saved_link() {
        let host = Arc::new(ScriptedHost::new());
        host.push_post("share_sync", json!({"code": 0}));

        let mut settings = logged_in();
        settings.scalars.user_share_link = "https://115.com/s/xyz".to_string();
        settings.scalars.user_share_local_path = "/strm/share".to_string();

        console(&host)
            .share_sync(&settings, ShareSyncRequest::default())
            .await
            .unwrap();

        let bodies = host.bodies("share_sync");
        assert_eq!(bodies[0]["share_link"], json!("https://115.com/s/xyz"));
        assert_eq!(bodies[0]["local_path"], json!("/strm/share"));
    }

    #[tokio::test]
    async fn test_share_sync_without_link_makes_no_request() {
        let host = Arc::new(ScriptedHost::new());
        let result = console(&host)
            .share_sync(&logged_in(), ShareSyncRequest::default())
            .await;
        assert!(matches!(result, Err(StrmHelperError::Validation { .. })));
        assert_eq!(host.calls("share_sync"), 0);
    }

    #[tokio::test]
    async fn test_remote_browse_requires_cookie() {
        let host = Arc::new(ScriptedHost::new());
        let result = console(&host)
            .browse(&PluginSettings::default(), "/", false)
            .await;

        assert!(matches!(result, Err(StrmHelperError::Validation { .. })));
        assert_eq!(host.calls("browse_dir"), 0);
    }

    #[tokio::test]
    async fn test_local_browse_sorts_directories_first() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get(
            "browse_dir",
            json!({
                "code": 0,
                "path": "/media",
                "items": [
                    {"name": "z.mkv", "path": "/media/z.mkv", "is_dir": false},
                    {"name": "tv", "path": "/media/tv", "is_dir": true},
                    {"name": "a.mkv", "path": "/media/a.mkv", "is_dir": false},
                    {"name": "movies", "path": "/media/movies", "is_dir": true}
                ]
            }),
        );

        let listing = console(&host)
            .browse(&PluginSettings::default(), "/media", true)
            .await
            .unwrap();
        let names: Vec<_> = listing.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["movies", "tv", "a.mkv", "z.mkv"]);
        assert!(host.paths("browse_dir")[0].contains("is_local=true"));
    }

    #[tokio::test]
    async fn test_browse_rejection() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get("browse_dir", json!({"code": 1, "msg": "not found"}));

        let result = console(&host).browse(&logged_in(), "/missing", false).await;
        assert!(matches!(result, Err(StrmHelperError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_status_and_storage() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get(
            "get_status",
            json!({"enabled": true, "has_client": true, "running": false}),
        );
        host.push_get(
            "user_storage_status",
            json!({"success": true, "user_info": {"name": "me"}, "storage_info": {"used": "1 TB"}}),
        );
        let console = console(&host);

        let status = console.status().await.unwrap();
        assert!(status.enabled && status.has_client && !status.running);

        let storage = console.storage_status().await.unwrap();
        assert!(storage.success);
        assert_eq!(storage.user_info.unwrap()["name"], json!("me"));
    }

    #[tokio::test]
    async fn test_host_failure_is_local_to_the_call() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get_error("get_status");
        host.push_get("get_status", json!({"enabled": true}));
        let console = console(&host);

        assert!(console.status().await.is_err());
        assert!(console.status().await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_load_tolerates_null_settings() {
        let host = Arc::new(ScriptedHost::new());
        host.push_get(
            "get_config",
            json!({
                "enabled": true,
                "cookies": null,
                "cron_full_sync_strm": null,
                "transfer_monitor_mediaservers": null,
                "monitor_life_enabled": null,
                "mediaservers": null
            }),
        );

        let loaded = console(&host).load().await.unwrap();
        let scalars = &loaded.settings.scalars;
        assert!(scalars.enabled);
        assert!(scalars.cookies.is_empty());
        assert!(scalars.cron_full_sync_strm.is_empty());
        assert!(scalars.transfer_monitor_mediaservers.is_empty());
        assert!(!scalars.monitor_life_enabled);
        assert!(loaded.mediaservers.is_empty());
        assert!(!loaded.settings.has_credential());
    }
}
