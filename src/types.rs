use crate::dom::NodeId;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Page category derived from the location path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageContext {
    Home,
    Search,
    Subscriptions,
    Trending,
    Other,
}

impl PageContext {
    pub const ALL: [PageContext; 5] = [
        PageContext::Home,
        PageContext::Search,
        PageContext::Subscriptions,
        PageContext::Trending,
        PageContext::Other,
    ];

    /// Exact-match routing on the URL path.
    pub fn from_path(path: &str) -> Self {
        match path {
            "/" => PageContext::Home,
            "/results" => PageContext::Search,
            "/feed/subscriptions" => PageContext::Subscriptions,
            "/feed/trending" => PageContext::Trending,
            _ => PageContext::Other,
        }
    }
}

impl fmt::Display for PageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageContext::Home => "home",
            PageContext::Search => "search",
            PageContext::Subscriptions => "subscriptions",
            PageContext::Trending => "trending",
            PageContext::Other => "other",
        };
        f.write_str(name)
    }
}

/// What the policy wants done with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Skip,
    Suppress,
    Remove,
    Redirect,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: Option<String>,
    pub id: Option<String>,
    pub handle: Option<String>,
}

/// An element matched by the catalog during one scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub node: NodeId,
    pub video_id: Option<String>,
    pub channel: Option<ChannelInfo>,
}

/// Outcome of one scan pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub context: Option<PageContext>,
    pub candidates: usize,
    pub skipped: usize,
    pub treated: usize,
}
