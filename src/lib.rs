//! Shorts Blocker Library
//!
//! Finds short-form video elements on a video-sharing site's pages and
//! hides, removes or redirects them, following the user's settings.
//! The page is modelled as an in-memory [`dom::Document`]; a background
//! task watches it for insertions and client-side navigation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use shorts_blocker::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let page = Page::new(Document::loaded("https://www.youtube.com/results?search_query=cats")?);
//!     let storage = Arc::new(ExtensionStorage::in_memory());
//!     let collaborators = Collaborators::from_storage(storage, Arc::new(LogNotifier));
//!
//!     let blocker = BlockerHandle::start(page, collaborators, EngineConfig::default()).await?;
//!     println!("{:?}", blocker.status().await?);
//!
//!     Ok(())
//! }
//! ```

pub mod background;
pub mod blocker;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod dom;
pub mod error;
pub mod messages;
pub mod notify;
pub mod policy;
pub mod selector;
pub mod session;
pub mod storage;
pub mod treatment;
pub mod types;
pub mod watcher;

pub use background::{BackgroundRouter, InstallReason, Tab};
pub use blocker::{BlockerHandle, Collaborators, ShortsBlocker};
pub use config::{BlockingMode, EngineConfig, PartialSettings, Settings};
pub use dom::{Document, ElementSpec, NodeId, Page};
pub use error::{MessageError, SelectorError};
pub use notify::{LogNotifier, Notifier, PageNotifier};
pub use session::{Diagnostics, SessionState};
pub use storage::{ExtensionStorage, SettingsProvider, StatsRecorder};
pub use types::{Action, Candidate, ChannelInfo, PageContext, ScanReport};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        BlockerHandle, BlockingMode, Collaborators, Document, ElementSpec, EngineConfig, ExtensionStorage, LogNotifier,
        Page, PageNotifier, PartialSettings, Settings,
    };
}
