use crate::types::PageContext;

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_VERSION: &str = "1.0.4";
pub const MAX_WHITELIST_ENTRIES: usize = 1000;

/// How matched elements are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BlockingMode {
    #[default]
    #[serde(rename = "hide")]
    Suppress,
    #[serde(rename = "remove")]
    Remove,
    #[serde(rename = "redirect")]
    Redirect,
}

impl BlockingMode {
    /// Lenient parse; anything unrecognised is `Suppress`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "hide" | "suppress" => BlockingMode::Suppress,
            "remove" => BlockingMode::Remove,
            "redirect" => BlockingMode::Redirect,
            other => {
                warn!(mode = other, "unknown blocking mode, falling back to hide");
                BlockingMode::Suppress
            }
        }
    }
}

impl<'de> Deserialize<'de> for BlockingMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

/// User policy. Always fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    pub blocking_mode: BlockingMode,
    pub show_notifications: bool,
    pub block_in_home: bool,
    pub block_in_search: bool,
    pub block_in_subscriptions: bool,
    pub block_in_trending: bool,
    pub allow_whitelisted_channels: bool,
    pub whitelisted_channels: Vec<String>,
    pub debug_mode: bool,
    pub version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            blocking_mode: BlockingMode::Suppress,
            show_notifications: true,
            block_in_home: true,
            block_in_search: true,
            block_in_subscriptions: true,
            block_in_trending: false,
            allow_whitelisted_channels: true,
            whitelisted_channels: vec![],
            debug_mode: false,
            version: DEFAULT_VERSION.to_string(),
        }
    }
}

impl Settings {
    /// Overlay a stored JSON object on the defaults, field by field. A field
    /// with the wrong type keeps its default; the other fields still apply.
    pub fn from_value(value: serde_json::Value) -> Self {
        let serde_json::Value::Object(fields) = value else {
            warn!("stored settings are not an object, using defaults");
            return Self::default();
        };
        let mut settings = Self::default();
        for (key, field) in fields {
            let single = serde_json::Value::Object(serde_json::Map::from_iter([(key.clone(), field)]));
            match serde_json::from_value::<PartialSettings>(single) {
                Ok(partial) => settings = settings.merge(&partial),
                Err(e) => warn!(key = %key, error = %e, "ignoring malformed stored setting"),
            }
        }
        settings
    }

    /// Field-wise overlay of `partial` onto `self`.
    pub fn merge(&self, partial: &PartialSettings) -> Self {
        let mut merged = Self {
            enabled: partial.enabled.unwrap_or(self.enabled),
            blocking_mode: partial.blocking_mode.unwrap_or(self.blocking_mode),
            show_notifications: partial.show_notifications.unwrap_or(self.show_notifications),
            block_in_home: partial.block_in_home.unwrap_or(self.block_in_home),
            block_in_search: partial.block_in_search.unwrap_or(self.block_in_search),
            block_in_subscriptions: partial
                .block_in_subscriptions
                .unwrap_or(self.block_in_subscriptions),
            block_in_trending: partial.block_in_trending.unwrap_or(self.block_in_trending),
            allow_whitelisted_channels: partial
                .allow_whitelisted_channels
                .unwrap_or(self.allow_whitelisted_channels),
            whitelisted_channels: partial
                .whitelisted_channels
                .clone()
                .unwrap_or_else(|| self.whitelisted_channels.clone()),
            debug_mode: partial.debug_mode.unwrap_or(self.debug_mode),
            version: partial.version.clone().unwrap_or_else(|| self.version.clone()),
        };
        merged.normalize_whitelist();
        merged
    }

    /// Drop blanks and duplicates (first occurrence wins) and cap the length.
    pub fn normalize_whitelist(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.whitelisted_channels = self
            .whitelisted_channels
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && seen.insert(c.clone()))
            .take(MAX_WHITELIST_ENTRIES)
            .collect();
    }

    /// Per-context enable flag. Contexts outside the four feeds are always
    /// eligible.
    pub fn blocks_in(&self, context: PageContext) -> bool {
        match context {
            PageContext::Home => self.block_in_home,
            PageContext::Search => self.block_in_search,
            PageContext::Subscriptions => self.block_in_subscriptions,
            PageContext::Trending => self.block_in_trending,
            PageContext::Other => true,
        }
    }

    pub fn is_whitelisted(&self, channel_id: &str) -> bool {
        self.whitelisted_channels.iter().any(|c| c == channel_id)
    }
}

/// Settings update as sent over the message boundary or written to storage.
/// Unspecified fields are left untouched by [`Settings::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_mode: Option<BlockingMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_notifications: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_in_home: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_in_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_in_subscriptions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_in_trending: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_whitelisted_channels: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelisted_channels: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl From<&Settings> for PartialSettings {
    fn from(s: &Settings) -> Self {
        Self {
            enabled: Some(s.enabled),
            blocking_mode: Some(s.blocking_mode),
            show_notifications: Some(s.show_notifications),
            block_in_home: Some(s.block_in_home),
            block_in_search: Some(s.block_in_search),
            block_in_subscriptions: Some(s.block_in_subscriptions),
            block_in_trending: Some(s.block_in_trending),
            allow_whitelisted_channels: Some(s.allow_whitelisted_channels),
            whitelisted_channels: Some(s.whitelisted_channels.clone()),
            debug_mode: Some(s.debug_mode),
            version: Some(s.version.clone()),
        }
    }
}

/// Scheduling constants for the change-detection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Window that coalesces a burst of insertions into one scan.
    pub debounce: Duration,
    /// How often the location is polled for client-side navigation.
    pub navigation_poll: Duration,
    /// Wait after a navigation before re-scanning.
    pub navigation_settle: Duration,
    /// Delay between the removal animation starting and detachment.
    pub removal_delay: Duration,
    /// Retry interval while `<body>` does not exist.
    pub body_retry: Duration,
    /// Lifetime of an in-page notification.
    pub notification_duration: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            navigation_poll: Duration::from_millis(1000),
            navigation_settle: Duration::from_millis(500),
            removal_delay: Duration::from_millis(500),
            body_retry: Duration::from_millis(100),
            notification_duration: Duration::from_millis(3000),
        }
    }
}
