use crate::config::Settings;
use crate::dom::{ElementSpec, Page};

use std::time::Duration;
use tracing::{debug, info};

pub const NOTIFICATION_CLASS: &str = "ytb-notification";
pub const NOTIFICATION_TEXT: &str = "🚫 Short blocked successfully!";

/// Told once per treated element.
pub trait Notifier: Send + Sync {
    fn notify(&self, settings: &Settings);
}

/// Shows a transient toast in the page body.
pub struct PageNotifier {
    page: Page,
    duration: Duration,
}

impl PageNotifier {
    pub fn new(page: Page, duration: Duration) -> Self {
        Self { page, duration }
    }
}

impl Notifier for PageNotifier {
    fn notify(&self, settings: &Settings) {
        if !settings.show_notifications {
            return;
        }

        let node = {
            let mut doc = self.page.lock();
            let Some(body) = doc.body() else {
                return;
            };
            doc.insert(
                body,
                &ElementSpec::new("div")
                    .attr("class", format!("{NOTIFICATION_CLASS} success"))
                    .text(NOTIFICATION_TEXT),
            )
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime, notification will not expire");
            return;
        };
        let page = self.page.clone();
        let duration = self.duration;
        runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            page.lock().detach(node);
        });
    }
}

/// Logs instead of touching the page.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, settings: &Settings) {
        if settings.show_notifications {
            info!("{NOTIFICATION_TEXT}");
        }
    }
}
