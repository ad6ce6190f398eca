use crate::config::{PartialSettings, Settings};
use crate::dom::{Document, Subscription};
use crate::messages::StatusResponse;
use crate::types::ScanReport;

use serde::Serialize;

/// Page-local storage key that forces debug treatments.
pub const DEBUG_STORAGE_KEY: &str = "ytb-debug";

/// State of the running blocker for one page load. Owned by the
/// change-detection loop; every settings change goes through
/// [`SessionState::apply_update`].
pub struct SessionState {
    settings: Settings,
    debug: bool,
    blocked_count: u64,
    scans: u64,
    last_report: Option<ScanReport>,
    pub(crate) watch: Option<Subscription>,
    pub(crate) last_url: String,
}

impl SessionState {
    pub fn new(settings: Settings, doc: &Document) -> Self {
        let debug = Self::debug_enabled(&settings, doc);
        Self {
            settings,
            debug,
            blocked_count: 0,
            scans: 0,
            last_report: None,
            watch: None,
            last_url: doc.location().to_string(),
        }
    }

    fn debug_enabled(settings: &Settings, doc: &Document) -> bool {
        settings.debug_mode || doc.local_storage_item(DEBUG_STORAGE_KEY) == Some("true")
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn blocked_count(&self) -> u64 {
        self.blocked_count
    }

    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    /// Replace the settings with `partial` merged over the current ones.
    pub fn apply_update(&mut self, partial: &PartialSettings, doc: &Document) {
        self.settings = self.settings.merge(partial);
        self.debug = Self::debug_enabled(&self.settings, doc);
    }

    pub(crate) fn record_blocked(&mut self, count: u64) {
        self.blocked_count += count;
    }

    pub(crate) fn record_scan(&mut self, report: ScanReport) {
        self.scans += 1;
        self.last_report = Some(report);
    }

    pub fn diagnostics(&self, active: bool) -> Diagnostics {
        Diagnostics {
            active,
            watching: self.is_watching(),
            scans: self.scans,
            blocked: self.blocked_count,
            last_report: self.last_report,
        }
    }

    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            blocked: self.blocked_count,
            enabled: self.settings.enabled,
        }
    }
}

/// Snapshot of the running loop, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub active: bool,
    pub watching: bool,
    pub scans: u64,
    pub blocked: u64,
    pub last_report: Option<ScanReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockingMode;

    #[test]
    fn test_debug_from_page_storage() {
        let mut doc = Document::loaded("https://www.youtube.com/").unwrap();
        assert!(!SessionState::new(Settings::default(), &doc).is_debug());

        doc.set_local_storage_item(DEBUG_STORAGE_KEY, "true");
        assert!(SessionState::new(Settings::default(), &doc).is_debug());
    }

    #[test]
    fn test_update_replaces_settings_and_keeps_count() {
        let doc = Document::loaded("https://www.youtube.com/").unwrap();
        let mut session = SessionState::new(Settings::default(), &doc);
        session.record_blocked(2);

        session.apply_update(
            &PartialSettings {
                blocking_mode: Some(BlockingMode::Remove),
                debug_mode: Some(true),
                ..Default::default()
            },
            &doc,
        );
        assert_eq!(session.settings().blocking_mode, BlockingMode::Remove);
        assert!(session.is_debug());
        assert_eq!(session.status(), StatusResponse { blocked: 2, enabled: true });
    }
}
