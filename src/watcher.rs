//! Change detection: DOM insertions, client-side navigation and settings
//! updates all funnel into one loop that owns the session state.

use crate::blocker::ShortsBlocker;
use crate::config::{EngineConfig, PartialSettings};
use crate::dom::{DomEvent, Page, Subscription};
use crate::messages::StatusResponse;
use crate::session::{Diagnostics, SessionState};

use std::future::pending;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep_until};
use tracing::{debug, info, trace};

pub(crate) enum Command {
    Status(oneshot::Sender<StatusResponse>),
    Diagnostics(oneshot::Sender<Diagnostics>),
    UpdateSettings(PartialSettings, oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// Collapses a burst of notifications into a single deadline. The first
/// poke opens a window; pokes inside the window do not extend it.
#[derive(Debug, Clone, Copy)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, deadline: None }
    }

    /// Returns true when this poke opened a new window.
    pub fn poke(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.window);
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }
}

pub(crate) struct ChangeLoop {
    blocker: ShortsBlocker,
    session: SessionState,
    page: Page,
    config: EngineConfig,
    commands: mpsc::Receiver<Command>,
    history: Option<Subscription>,
    debouncer: Debouncer,
    settle: Option<Instant>,
    active: bool,
}

impl ChangeLoop {
    pub(crate) fn new(
        blocker: ShortsBlocker,
        session: SessionState,
        page: Page,
        config: EngineConfig,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            blocker,
            session,
            page,
            debouncer: Debouncer::new(config.debounce),
            config,
            commands,
            history: None,
            settle: None,
            active: false,
        }
    }

    /// Cold start. Scans immediately when enabled.
    pub(crate) fn initialize(&mut self) {
        if self.session.settings().enabled {
            self.activate();
        } else {
            info!("Shorts blocker is disabled");
        }
    }

    fn activate(&mut self) {
        self.active = true;
        {
            let mut doc = self.page.lock();
            self.session.last_url = doc.location().to_string();
            self.history = Some(doc.listen_history());
        }
        self.scan("initial");
        self.install_watch();
    }

    /// Subscribe to body insertions. False while the body is missing.
    fn install_watch(&mut self) -> bool {
        if self.session.watch.is_some() {
            return true;
        }
        let watch = self.page.lock().observe_body();
        match watch {
            Some(watch) => {
                self.session.watch = Some(watch);
                debug!("mutation watch installed");
                true
            }
            None => {
                trace!("body not ready, will retry");
                false
            }
        }
    }

    fn deactivate(&mut self) {
        self.active = false;
        self.session.watch = None;
        self.history = None;
        self.debouncer.clear();
        self.settle = None;
        let restored = self.blocker.teardown(&self.page);
        info!(restored, "Shorts blocker stopped");
    }

    fn scan(&mut self, trigger: &'static str) {
        let report = self.blocker.scan(&self.page, &mut self.session);
        trace!(trigger, treated = report.treated, "pass complete");
    }

    fn check_navigation(&mut self) {
        let current = self.page.lock().location().to_string();
        if current != self.session.last_url {
            debug!(from = %self.session.last_url, to = %current, "navigation detected");
            self.session.last_url = current;
            self.settle = Some(Instant::now() + self.config.navigation_settle);
        }
    }

    fn update_settings(&mut self, partial: &PartialSettings) {
        {
            let doc = self.page.lock();
            self.session.apply_update(partial, &doc);
        }
        match (self.active, self.session.settings().enabled) {
            (false, true) => self.activate(),
            (true, false) => self.deactivate(),
            (true, true) => self.scan("settings"),
            (false, false) => {}
        }
    }

    /// Returns false once the loop should stop.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Status(reply) => {
                let _ = reply.send(self.session.status());
            }
            Command::Diagnostics(reply) => {
                let _ = reply.send(self.session.diagnostics(self.active));
            }
            Command::UpdateSettings(partial, reply) => {
                self.update_settings(&partial);
                let _ = reply.send(());
            }
            Command::Shutdown(reply) => {
                if self.active {
                    self.deactivate();
                }
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    pub(crate) async fn run(mut self) {
        let mut navigation = interval(self.config.navigation_poll);
        navigation.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut body_retry = interval(self.config.body_retry);
        body_retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let debounce_at = self.debouncer.deadline();
            let settle_at = self.settle;
            let waiting_for_body = self.active && self.session.watch.is_none();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    None => {
                        if self.active {
                            self.deactivate();
                        }
                        break;
                    }
                },
                Some(event) = next_event(self.session.watch.as_mut()) => {
                    trace!(?event, "mutation");
                    self.debouncer.poke(Instant::now());
                }
                Some(event) = next_event(self.history.as_mut()) => {
                    trace!(?event, "history");
                    self.check_navigation();
                }
                _ = sleep_until_some(debounce_at), if debounce_at.is_some() => {
                    self.debouncer.clear();
                    self.scan("mutation");
                }
                _ = navigation.tick(), if self.active => self.check_navigation(),
                _ = sleep_until_some(settle_at), if settle_at.is_some() => {
                    self.settle = None;
                    self.scan("navigation");
                }
                _ = body_retry.tick(), if waiting_for_body => {
                    // content may have arrived with the body
                    if self.install_watch() {
                        self.scan("watch-installed");
                    }
                }
            }
        }
        debug!("change loop exited");
    }
}

async fn next_event(subscription: Option<&mut Subscription>) -> Option<DomEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => pending().await,
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_window_is_not_extended() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let start = Instant::now();
        assert!(debouncer.poke(start));
        assert!(!debouncer.poke(start + Duration::from_millis(60)));
        assert_eq!(debouncer.deadline(), Some(start + Duration::from_millis(100)));

        debouncer.clear();
        assert!(debouncer.deadline().is_none());
        assert!(debouncer.poke(start + Duration::from_millis(150)));
    }
}
