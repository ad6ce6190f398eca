//! Extension-level message routing: install hooks, statistics reset and
//! forwarding of popup requests to the blocker running in the active tab.

use crate::blocker::BlockerHandle;
use crate::config::{PartialSettings, Settings};
use crate::messages::{Request, failure};
use crate::storage::ExtensionStorage;

use anyhow::Result;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Host the blocker runs on.
pub const SITE_HOST: &str = "youtube.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallReason {
    Install,
    Update { previous_version: String },
    Other,
}

/// The focused browser tab and, if the page has one, its running blocker.
#[derive(Clone)]
pub struct Tab {
    pub url: String,
    pub blocker: Option<Arc<BlockerHandle>>,
}

impl Tab {
    fn on_site(&self) -> bool {
        self.url.contains(SITE_HOST)
    }
}

pub struct BackgroundRouter {
    storage: Arc<ExtensionStorage>,
    version: String,
    active: RwLock<Option<Tab>>,
}

impl BackgroundRouter {
    pub fn new(storage: Arc<ExtensionStorage>, version: impl Into<String>) -> Self {
        Self {
            storage,
            version: version.into(),
            active: RwLock::new(None),
        }
    }

    pub async fn focus(&self, tab: Option<Tab>) {
        *self.active.write().await = tab;
    }

    pub async fn on_installed(&self, reason: InstallReason) -> Result<()> {
        info!(?reason, "Shorts blocker installed");
        match reason {
            InstallReason::Install => {
                let defaults = Settings {
                    version: self.version.clone(),
                    ..Settings::default()
                };
                self.storage.save_settings(&PartialSettings::from(&defaults)).await?;
                self.storage.reset_all_stats().await?;
                info!("Default settings and stats initialized");
            }
            InstallReason::Update { previous_version } => {
                self.storage.migrate(&previous_version, &self.version).await?;
            }
            InstallReason::Other => {}
        }
        Ok(())
    }

    /// Blocker of the active tab, when that tab is on the site.
    async fn site_blocker(&self) -> Option<Arc<BlockerHandle>> {
        let active = self.active.read().await;
        active
            .as_ref()
            .filter(|tab| tab.on_site())
            .and_then(|tab| tab.blocker.clone())
    }

    pub async fn handle_message(&self, message: &Value) -> Value {
        debug!(%message, "message received");
        match Request::parse(message) {
            Ok(Request::GetStatus) => self.get_status().await,
            Ok(Request::UpdateSettings { settings }) => self.update_settings(settings).await,
            Ok(Request::ResetStats) => self.reset_stats().await,
            Err(e) => failure(e),
        }
    }

    async fn get_status(&self) -> Value {
        let Some(blocker) = self.site_blocker().await else {
            return json!({
                "success": true,
                "data": { "enabled": false, "blocked": 0, "message": "Not on YouTube" }
            });
        };
        let response = blocker.handle_message(&json!({ "action": "getStatus" })).await;
        if is_failure(&response) {
            warn!(%response, "Failed to get status");
            return failure("Failed to get status from content script");
        }
        json!({ "success": true, "data": response })
    }

    async fn update_settings(&self, settings: PartialSettings) -> Value {
        let Some(blocker) = self.site_blocker().await else {
            return failure("Not on YouTube page");
        };
        if let Err(e) = self.storage.save_settings(&settings).await {
            warn!(error = %e, "Failed to update settings");
            return failure("Failed to update settings");
        }
        let forward = json!({ "action": "updateSettings", "settings": settings });
        let response = blocker.handle_message(&forward).await;
        if is_failure(&response) {
            return failure("Failed to update settings");
        }
        json!({ "success": true, "data": response })
    }

    async fn reset_stats(&self) -> Value {
        match self.storage.reset_all_stats().await {
            Ok(()) => json!({ "success": true, "message": "Statistics reset successfully" }),
            Err(e) => {
                warn!(error = %e, "Failed to reset stats");
                failure("Failed to reset statistics")
            }
        }
    }
}

fn is_failure(response: &Value) -> bool {
    response.get("success").and_then(Value::as_bool) == Some(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StatsRecorder;
    use pretty_assertions::assert_eq;

    fn router() -> (BackgroundRouter, Arc<ExtensionStorage>) {
        let storage = Arc::new(ExtensionStorage::in_memory());
        (BackgroundRouter::new(storage.clone(), "1.0.4"), storage)
    }

    #[tokio::test]
    async fn test_status_off_site() {
        let (router, _) = router();
        router
            .focus(Some(Tab {
                url: "https://example.com/".into(),
                blocker: None,
            }))
            .await;
        assert_eq!(
            router.handle_message(&json!({ "action": "getStatus" })).await,
            json!({ "success": true, "data": { "enabled": false, "blocked": 0, "message": "Not on YouTube" } })
        );
    }

    #[tokio::test]
    async fn test_update_settings_requires_site_tab() {
        let (router, storage) = router();
        let response = router
            .handle_message(&json!({ "action": "updateSettings", "settings": { "enabled": false } }))
            .await;
        assert_eq!(response, json!({ "success": false, "error": "Not on YouTube page" }));
        assert!(storage.load_settings().await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let (router, storage) = router();
        storage.increment_blocked(3).await.unwrap();
        let response = router.handle_message(&json!({ "action": "resetStats" })).await;
        assert_eq!(response["success"], json!(true));
        assert_eq!(storage.stats().await.unwrap().total_blocked, 0);
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (router, _) = router();
        assert_eq!(
            router.handle_message(&json!({ "action": "selfDestruct" })).await,
            json!({ "success": false, "error": "Unknown action" })
        );
    }

    #[tokio::test]
    async fn test_install_then_update() {
        let (router, storage) = router();
        router.on_installed(InstallReason::Install).await.unwrap();
        assert_eq!(storage.load_settings().await.unwrap(), Settings::default());

        let updated = BackgroundRouter::new(storage.clone(), "1.2.0");
        updated
            .on_installed(InstallReason::Update {
                previous_version: "1.0.4".into(),
            })
            .await
            .unwrap();
        assert_eq!(storage.load_settings().await.unwrap().version, "1.2.0");
    }
}
