//! Persistent settings and statistics.
//!
//! Mirrors the extension's two storage areas: a "sync" area holding the
//! settings and a "local" area holding statistics and whitelisted channel
//! metadata. Each area is an async key-value store of JSON values.

use crate::config::{PartialSettings, Settings};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Storage keys
pub struct StorageKeys;

impl StorageKeys {
    pub const SETTINGS: &'static str = "ytb_settings";
    pub const STATS: &'static str = "ytb_stats";
    pub const CHANNEL_INFO: &'static str = "ytb_channel_info";
}

pub const DAILY_RETENTION_DAYS: i64 = 90;
pub const WEEKLY_RETENTION_WEEKS: i64 = 12;
pub const MONTHLY_RETENTION_MONTHS: u32 = 12;

#[async_trait]
pub trait StorageArea: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryArea {
    items: RwLock<HashMap<String, Value>>,
}

impl MemoryArea {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageArea for MemoryArea {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.items.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Storage area persisted as one JSON object per file.
pub struct JsonFileArea {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileArea {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Map<String, Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Map::new()),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("corrupt storage file {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e).with_context(|| format!("reading {}", self.path.display())),
        }
    }
}

#[async_trait]
impl StorageArea for JsonFileArea {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut items = self.read_all().await?;
        items.insert(key.to_string(), value);

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&items)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Blocked-element counters with day/week/month buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Statistics {
    pub total_blocked: u64,
    pub session_blocked: u64,
    pub last_reset_date: String,
    pub daily_stats: BTreeMap<String, u64>,
    pub weekly_stats: BTreeMap<String, u64>,
    pub monthly_stats: BTreeMap<String, u64>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            total_blocked: 0,
            session_blocked: 0,
            last_reset_date: Utc::now().to_rfc3339(),
            daily_stats: BTreeMap::new(),
            weekly_stats: BTreeMap::new(),
            monthly_stats: BTreeMap::new(),
        }
    }
}

impl Statistics {
    pub fn day_key(at: DateTime<Utc>) -> String {
        at.format("%Y-%m-%d").to_string()
    }

    /// ISO week, e.g. `2026-W07`.
    pub fn week_key(at: DateTime<Utc>) -> String {
        let week = at.iso_week();
        format!("{}-W{:02}", week.year(), week.week())
    }

    pub fn month_key(at: DateTime<Utc>) -> String {
        at.format("%Y-%m").to_string()
    }

    pub fn record(&mut self, count: u64, at: DateTime<Utc>) {
        self.total_blocked += count;
        self.session_blocked += count;
        *self.daily_stats.entry(Self::day_key(at)).or_default() += count;
        *self.weekly_stats.entry(Self::week_key(at)).or_default() += count;
        *self.monthly_stats.entry(Self::month_key(at)).or_default() += count;
    }

    /// Drop buckets older than the retention windows.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let day_cutoff = Self::day_key(now - Duration::days(DAILY_RETENTION_DAYS));
        self.daily_stats.retain(|day, _| *day >= day_cutoff);

        let week_cutoff = Self::week_key(now - Duration::weeks(WEEKLY_RETENTION_WEEKS));
        self.weekly_stats.retain(|week, _| *week >= week_cutoff);

        let month_cutoff = now
            .checked_sub_months(Months::new(MONTHLY_RETENTION_MONTHS))
            .map(Self::month_key)
            .unwrap_or_default();
        self.monthly_stats.retain(|month, _| *month >= month_cutoff);
    }
}

/// Name and date a whitelisted channel was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub name: String,
    pub added_date: String,
}

/// Source of the settings the blocker starts with.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn load_settings(&self) -> Result<Settings>;
}

/// Sink for blocked-element counts.
#[async_trait]
pub trait StatsRecorder: Send + Sync {
    async fn increment_blocked(&self, count: u64) -> Result<()>;
}

pub struct ExtensionStorage {
    sync: Arc<dyn StorageArea>,
    local: Arc<dyn StorageArea>,
    /// Held across every statistics read-modify-write.
    stats_lock: Mutex<()>,
}

impl ExtensionStorage {
    pub fn new(sync: Arc<dyn StorageArea>, local: Arc<dyn StorageArea>) -> Self {
        Self {
            sync,
            local,
            stats_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryArea::new()), Arc::new(MemoryArea::new()))
    }

    /// `sync.json` and `local.json` under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(
            Arc::new(JsonFileArea::new(dir.join("sync.json"))),
            Arc::new(JsonFileArea::new(dir.join("local.json"))),
        )
    }

    // --- settings ---

    pub async fn load_settings(&self) -> Result<Settings> {
        Ok(match self.sync.get(StorageKeys::SETTINGS).await? {
            Some(value) => Settings::from_value(value),
            None => Settings::default(),
        })
    }

    /// Merge `partial` into the stored settings and persist the result.
    pub async fn save_settings(&self, partial: &PartialSettings) -> Result<Settings> {
        let updated = self.load_settings().await?.merge(partial);
        self.sync
            .set(StorageKeys::SETTINGS, serde_json::to_value(&updated)?)
            .await?;
        debug!(?updated, "Settings saved");
        Ok(updated)
    }

    // --- statistics ---

    pub async fn stats(&self) -> Result<Statistics> {
        match self.local.get(StorageKeys::STATS).await? {
            Some(value) => Ok(serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(error = %e, "stored statistics are malformed, starting over");
                Statistics::default()
            })),
            None => Ok(Statistics::default()),
        }
    }

    async fn write_stats(&self, stats: &Statistics) -> Result<()> {
        self.local.set(StorageKeys::STATS, serde_json::to_value(stats)?).await
    }

    /// Add `count` to every counter and prune old buckets.
    pub async fn record_blocked_at(&self, count: u64, at: DateTime<Utc>) -> Result<Statistics> {
        let _guard = self.stats_lock.lock().await;
        let mut stats = self.stats().await?;
        stats.record(count, at);
        stats.prune(at);
        self.write_stats(&stats).await?;
        Ok(stats)
    }

    pub async fn reset_session_stats(&self) -> Result<()> {
        let _guard = self.stats_lock.lock().await;
        let mut stats = self.stats().await?;
        stats.session_blocked = 0;
        self.write_stats(&stats).await
    }

    pub async fn reset_all_stats(&self) -> Result<()> {
        let _guard = self.stats_lock.lock().await;
        self.write_stats(&Statistics::default()).await
    }

    // --- whitelist ---

    pub async fn whitelist(&self) -> Result<Vec<String>> {
        Ok(self.load_settings().await?.whitelisted_channels)
    }

    pub async fn add_to_whitelist(&self, channel_id: &str, channel_name: Option<&str>) -> Result<()> {
        let mut whitelist = self.whitelist().await?;
        if whitelist.iter().any(|c| c == channel_id) {
            return Ok(());
        }
        whitelist.push(channel_id.to_string());
        self.save_settings(&PartialSettings {
            whitelisted_channels: Some(whitelist),
            ..Default::default()
        })
        .await?;

        if let Some(name) = channel_name {
            let mut channels = self.channel_records().await?;
            channels.insert(
                channel_id.to_string(),
                ChannelRecord {
                    name: name.to_string(),
                    added_date: Utc::now().to_rfc3339(),
                },
            );
            self.local
                .set(StorageKeys::CHANNEL_INFO, serde_json::to_value(&channels)?)
                .await?;
        }
        Ok(())
    }

    pub async fn remove_from_whitelist(&self, channel_id: &str) -> Result<()> {
        let mut whitelist = self.whitelist().await?;
        whitelist.retain(|c| c != channel_id);
        self.save_settings(&PartialSettings {
            whitelisted_channels: Some(whitelist),
            ..Default::default()
        })
        .await?;
        Ok(())
    }

    async fn channel_records(&self) -> Result<BTreeMap<String, ChannelRecord>> {
        Ok(match self.local.get(StorageKeys::CHANNEL_INFO).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => BTreeMap::new(),
        })
    }

    pub async fn channel_info(&self, channel_id: &str) -> Result<Option<ChannelRecord>> {
        Ok(self.channel_records().await?.remove(channel_id))
    }

    // --- export / import ---

    pub async fn export_data(&self, version: &str) -> Result<String> {
        let data = json!({
            "settings": self.load_settings().await?,
            "stats": self.stats().await?,
            "channelInfo": self.channel_records().await?,
            "exportDate": Utc::now().to_rfc3339(),
            "version": version,
        });
        Ok(serde_json::to_string_pretty(&data)?)
    }

    pub async fn import_data(&self, json_data: &str) -> Result<()> {
        let data: Value = serde_json::from_str(json_data).context("Invalid import data format")?;
        let (Some(settings), Some(stats)) = (data.get("settings"), data.get("stats")) else {
            bail!("Invalid data format");
        };

        let settings: PartialSettings =
            serde_json::from_value(settings.clone()).context("Invalid settings in import data")?;
        let stats: Statistics = serde_json::from_value(stats.clone()).context("Invalid stats in import data")?;

        self.save_settings(&settings).await?;
        {
            let _guard = self.stats_lock.lock().await;
            self.write_stats(&stats).await?;
        }
        if let Some(channels) = data.get("channelInfo") {
            self.local.set(StorageKeys::CHANNEL_INFO, channels.clone()).await?;
        }
        info!("Data imported successfully");
        Ok(())
    }

    // --- lifecycle ---

    /// First run writes the defaults. Every run resets the session counter.
    pub async fn initialize(&self, version: &str) -> Result<()> {
        let stored = self.sync.get(StorageKeys::SETTINGS).await?;
        let has_version = stored
            .as_ref()
            .and_then(|v| v.get("version"))
            .and_then(Value::as_str)
            .is_some_and(|v| !v.is_empty());
        if !has_version {
            self.save_settings(&PartialSettings {
                version: Some(version.to_string()),
                ..PartialSettings::from(&Settings::default())
            })
            .await?;
        }
        self.reset_session_stats().await?;
        info!("Storage initialized successfully");
        Ok(())
    }

    pub async fn migrate(&self, old_version: &str, new_version: &str) -> Result<()> {
        info!(old_version, new_version, "Migrating storage");
        if compare_versions(old_version, new_version) == Ordering::Less {
            self.save_settings(&PartialSettings {
                version: Some(new_version.to_string()),
                ..Default::default()
            })
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsProvider for ExtensionStorage {
    async fn load_settings(&self) -> Result<Settings> {
        ExtensionStorage::load_settings(self).await
    }
}

#[async_trait]
impl StatsRecorder for ExtensionStorage {
    async fn increment_blocked(&self, count: u64) -> Result<()> {
        self.record_blocked_at(count, Utc::now()).await.map(|_| ())
    }
}

/// Compare dotted numeric versions; missing or non-numeric parts count as 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> { v.split('.').map(|p| p.trim().parse().unwrap_or(0)).collect() };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0).cmp(&b.get(i).copied().unwrap_or(0)))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlockingMode;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_load_defaults_when_empty() {
        let storage = ExtensionStorage::in_memory();
        assert_eq!(storage.load_settings().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn test_save_merges_with_stored_settings() {
        let storage = ExtensionStorage::in_memory();
        storage
            .save_settings(&PartialSettings {
                block_in_home: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        let saved = storage
            .save_settings(&PartialSettings {
                blocking_mode: Some(BlockingMode::Remove),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(!saved.block_in_home);
        assert_eq!(saved.blocking_mode, BlockingMode::Remove);
        assert_eq!(storage.load_settings().await.unwrap(), saved);
    }

    #[tokio::test]
    async fn test_record_blocked_buckets() {
        let storage = ExtensionStorage::in_memory();
        let now = at(2026, 10, 19);
        storage.record_blocked_at(1, now).await.unwrap();
        let stats = storage.record_blocked_at(2, now).await.unwrap();

        assert_eq!(stats.total_blocked, 3);
        assert_eq!(stats.session_blocked, 3);
        assert_eq!(stats.daily_stats.get("2026-10-19"), Some(&3));
        assert_eq!(stats.weekly_stats.get("2026-W43"), Some(&3));
        assert_eq!(stats.monthly_stats.get("2026-10"), Some(&3));
    }

    #[test]
    fn test_prune_retention_windows() {
        let mut stats = Statistics::default();
        stats.record(1, at(2025, 1, 1));
        stats.record(1, at(2026, 6, 1));
        stats.record(1, at(2026, 9, 1));
        stats.record(1, at(2026, 10, 19));

        stats.prune(at(2026, 10, 19));

        assert_eq!(stats.daily_stats.keys().collect::<Vec<_>>(), vec!["2026-09-01", "2026-10-19"]);
        assert_eq!(stats.weekly_stats.len(), 2);
        assert_eq!(stats.monthly_stats.keys().collect::<Vec<_>>(), vec!["2026-06", "2026-09", "2026-10"]);
        assert_eq!(stats.total_blocked, 4);
    }

    #[tokio::test]
    async fn test_reset_session_keeps_total() {
        let storage = ExtensionStorage::in_memory();
        storage.record_blocked_at(5, Utc::now()).await.unwrap();
        storage.reset_session_stats().await.unwrap();
        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.session_blocked, 0);
        assert_eq!(stats.total_blocked, 5);

        storage.reset_all_stats().await.unwrap();
        assert_eq!(storage.stats().await.unwrap().total_blocked, 0);
    }

    #[tokio::test]
    async fn test_whitelist_add_remove_and_channel_info() {
        let storage = ExtensionStorage::in_memory();
        storage.add_to_whitelist("UC1", Some("First")).await.unwrap();
        storage.add_to_whitelist("UC2", None).await.unwrap();
        storage.add_to_whitelist("UC1", Some("Dup")).await.unwrap();

        assert_eq!(storage.whitelist().await.unwrap(), vec!["UC1".to_string(), "UC2".to_string()]);
        assert_eq!(storage.channel_info("UC1").await.unwrap().unwrap().name, "First");
        assert!(storage.channel_info("UC2").await.unwrap().is_none());

        storage.remove_from_whitelist("UC1").await.unwrap();
        assert_eq!(storage.whitelist().await.unwrap(), vec!["UC2".to_string()]);
    }

    #[tokio::test]
    async fn test_export_import_roundtrip_between_stores() {
        let source = ExtensionStorage::in_memory();
        source.add_to_whitelist("UC9", Some("Nine")).await.unwrap();
        source.record_blocked_at(4, Utc::now()).await.unwrap();
        let exported = source.export_data("1.0.4").await.unwrap();

        let target = ExtensionStorage::in_memory();
        target.import_data(&exported).await.unwrap();
        assert_eq!(target.whitelist().await.unwrap(), vec!["UC9".to_string()]);
        assert_eq!(target.stats().await.unwrap().total_blocked, 4);
        assert_eq!(target.channel_info("UC9").await.unwrap().unwrap().name, "Nine");
    }

    #[tokio::test]
    async fn test_import_rejects_incomplete_data() {
        let storage = ExtensionStorage::in_memory();
        assert!(storage.import_data(r#"{"settings":{}}"#).await.is_err());
        assert!(storage.import_data("not json").await.is_err());
    }

    #[tokio::test]
    async fn test_initialize_and_migrate() {
        let storage = ExtensionStorage::in_memory();
        storage.record_blocked_at(2, Utc::now()).await.unwrap();
        storage.initialize("1.0.0").await.unwrap();
        assert_eq!(storage.load_settings().await.unwrap().version, "1.0.0");
        assert_eq!(storage.stats().await.unwrap().session_blocked, 0);

        // an existing version is left alone
        storage.initialize("9.9.9").await.unwrap();
        assert_eq!(storage.load_settings().await.unwrap().version, "1.0.0");

        storage.migrate("1.0.0", "1.1.0").await.unwrap();
        assert_eq!(storage.load_settings().await.unwrap().version, "1.1.0");
        storage.migrate("1.1.0", "1.0.9").await.unwrap();
        assert_eq!(storage.load_settings().await.unwrap().version, "1.1.0");
    }

    #[tokio::test]
    async fn test_json_file_area_persists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = ExtensionStorage::in_dir(dir.path());
            storage
                .save_settings(&PartialSettings {
                    enabled: Some(false),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        let reopened = ExtensionStorage::in_dir(dir.path());
        assert!(!reopened.load_settings().await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sync.json"), "{ not json").unwrap();
        let storage = ExtensionStorage::in_dir(dir.path());
        assert!(storage.load_settings().await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_all_counted() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(ExtensionStorage::in_dir(dir.path()));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..20 {
            let storage = storage.clone();
            tasks.spawn(async move { storage.increment_blocked(1).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.total_blocked, 20);
        assert_eq!(stats.session_blocked, 20);
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.0.4", "1.0.10"), Ordering::Less);
        assert_eq!(compare_versions("1.1", "1.0.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
    }
}
