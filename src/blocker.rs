use crate::classifier::Classifier;
use crate::config::{EngineConfig, PartialSettings, Settings};
use crate::dom::Page;
use crate::error::MessageError;
use crate::messages::{Request, StatusResponse, failure, success};
use crate::notify::Notifier;
use crate::policy;
use crate::session::{Diagnostics, SessionState};
use crate::storage::{ExtensionStorage, SettingsProvider, StatsRecorder};
use crate::treatment::{Outcome, TreatmentApplier};
use crate::types::{Candidate, ScanReport};
use crate::watcher::{ChangeLoop, Command};

use anyhow::Result;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// External services the blocker depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub settings: Arc<dyn SettingsProvider>,
    pub stats: Arc<dyn StatsRecorder>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Settings and statistics both backed by `storage`.
    pub fn from_storage(storage: Arc<ExtensionStorage>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            settings: storage.clone(),
            stats: storage,
            notifier,
        }
    }
}

/// Scan-and-act engine. One pass finds every candidate on the page,
/// decides an action for each and applies it.
pub struct ShortsBlocker {
    classifier: Classifier,
    applier: TreatmentApplier,
    stats: Arc<dyn StatsRecorder>,
    notifier: Arc<dyn Notifier>,
    removal_delay: Duration,
    pending_removals: Vec<JoinHandle<()>>,
}

impl ShortsBlocker {
    pub fn new(stats: Arc<dyn StatsRecorder>, notifier: Arc<dyn Notifier>, config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            classifier: Classifier::new()?,
            applier: TreatmentApplier::default(),
            stats,
            notifier,
            removal_delay: config.removal_delay,
            pending_removals: Vec::new(),
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run one pass. Does nothing while blocking is disabled.
    ///
    /// Must be called from within a tokio runtime: deferred removals and
    /// statistics updates are spawned.
    pub fn scan(&mut self, page: &Page, session: &mut SessionState) -> ScanReport {
        let settings = session.settings().clone();
        if !settings.enabled {
            return ScanReport::default();
        }
        let debug = session.is_debug();
        self.pending_removals.retain(|h| !h.is_finished());

        let (report, removals) = {
            let mut doc = page.lock();
            let context = self.classifier.classify_page(&doc);
            let candidates = self.classifier.find_candidates(&doc, context);
            let mut report = ScanReport {
                context: Some(context),
                candidates: candidates.len(),
                ..Default::default()
            };
            let mut removals = Vec::new();

            for node in candidates {
                let marked = self.applier.is_marked(&doc, node);
                let action = policy::decide(
                    marked,
                    || self.classifier.extract_channel_info(&doc, node),
                    &settings,
                    context,
                );
                match self.applier.apply(&mut doc, &self.classifier, node, action, debug) {
                    Outcome::NotApplied => report.skipped += 1,
                    Outcome::Applied => report.treated += 1,
                    Outcome::RemovalScheduled => {
                        report.treated += 1;
                        removals.push(node);
                    }
                }
            }
            (report, removals)
        };

        for node in removals {
            let removal = self.applier.finish_removal(page, node, self.removal_delay);
            self.pending_removals.push(tokio::spawn(removal));
        }

        if report.treated > 0 {
            session.record_blocked(report.treated as u64);
            self.record_stats(report.treated);
            for _ in 0..report.treated {
                self.notifier.notify(&settings);
            }
            info!(
                treated = report.treated,
                total = session.blocked_count(),
                context = ?report.context,
                "Blocked shorts"
            );
        }
        session.record_scan(report);
        debug!(?report, "scan finished");
        report
    }

    fn record_stats(&self, treated: usize) {
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            for _ in 0..treated {
                if let Err(e) = stats.increment_blocked(1).await {
                    warn!(error = %e, "Failed to update statistics");
                }
            }
        });
    }

    /// Cancel pending removals and restore every marked element.
    pub fn teardown(&mut self, page: &Page) -> usize {
        for handle in self.pending_removals.drain(..) {
            handle.abort();
        }
        let mut doc = page.lock();
        self.applier.unmark_all(&mut doc)
    }

    /// Candidates on the page right now, with their identifiers.
    pub fn inspect(&self, page: &Page) -> Vec<Candidate> {
        let doc = page.lock();
        let context = self.classifier.classify_page(&doc);
        self.classifier
            .find_candidates(&doc, context)
            .into_iter()
            .map(|node| self.classifier.describe(&doc, node))
            .collect()
    }

    pub fn marked_count(&self, page: &Page) -> usize {
        self.applier.marked(&page.lock()).len()
    }
}

/// Handle on a running blocker. The change-detection loop owns the session
/// state; the handle talks to it over a command channel. Dropping the handle
/// closes the channel, which tears the blocker down like
/// [`BlockerHandle::shutdown`].
pub struct BlockerHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl BlockerHandle {
    /// Load settings, run the initial pass and start watching `page`.
    ///
    /// The initial pass has completed when this returns.
    pub async fn start(page: Page, collaborators: Collaborators, config: EngineConfig) -> Result<Self> {
        let settings = match collaborators.settings.load_settings().await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            }
        };
        info!(enabled = settings.enabled, mode = ?settings.blocking_mode, "Starting shorts blocker");

        let blocker = ShortsBlocker::new(collaborators.stats, collaborators.notifier, &config)?;
        let session = SessionState::new(settings, &page.lock());
        let (tx, rx) = mpsc::channel(32);

        let mut change_loop = ChangeLoop::new(blocker, session, page, config, rx);
        change_loop.initialize();
        let task = tokio::spawn(change_loop.run());

        Ok(Self { commands: tx, task })
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, MessageError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| MessageError::NotInitialized)?;
        rx.await.map_err(|_| MessageError::NotInitialized)
    }

    pub async fn status(&self) -> Result<StatusResponse, MessageError> {
        self.request(Command::Status).await
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics, MessageError> {
        self.request(Command::Diagnostics).await
    }

    pub async fn update_settings(&self, settings: PartialSettings) -> Result<(), MessageError> {
        self.request(|reply| Command::UpdateSettings(settings, reply)).await
    }

    /// Answer a popup/background message.
    pub async fn handle_message(&self, message: &Value) -> Value {
        let result = match Request::parse(message) {
            Ok(Request::GetStatus) => self
                .status()
                .await
                .map(|s| json!({ "blocked": s.blocked, "enabled": s.enabled })),
            Ok(Request::UpdateSettings { settings }) => self.update_settings(settings).await.map(|()| success()),
            Ok(Request::ResetStats) => Err(MessageError::UnknownAction),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            debug!(error = %e, "message rejected");
            failure(e)
        })
    }

    /// Tear down and stop the loop. Later requests fail with
    /// [`MessageError::NotInitialized`].
    pub async fn shutdown(&self) -> Result<(), MessageError> {
        self.request(Command::Shutdown).await
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
