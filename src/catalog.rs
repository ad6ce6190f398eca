use crate::error::SelectorError;
use crate::selector::SelectorList;
use crate::types::PageContext;

use anyhow::Result;
use regex::Regex;

/// Selector sources for short-form content, per page context.
pub struct ShortsSelectors;

impl ShortsSelectors {
    /// Direct short-view page and player containers. Always scanned.
    pub const CONTAINER: &'static [&'static str] = &[
        "ytd-shorts",
        "ytd-reel-video-renderer",
        "[is-shorts]",
        "ytd-shorts-player",
    ];

    pub const HOME: &'static [&'static str] = &[
        // Shorts shelf
        "ytd-rich-shelf-renderer[is-shorts]",
        "ytd-reel-shelf-renderer",
        // Individual shorts in grid
        "ytd-video-renderer[is-shorts]",
        "ytd-grid-video-renderer[is-shorts]",
        "ytd-rich-grid-renderer ytd-video-renderer[is-shorts]",
        // Newer layout
        r#"div[data-content-type="shorts"]"#,
        "ytd-reel-video-renderer",
        "ytd-reel-item-renderer",
        r#"a[href*="/shorts/"]"#,
        r#"[aria-label*="Shorts"]"#,
        r#"[title*="Shorts"]"#,
    ];

    pub const SEARCH: &'static [&'static str] = &[
        "ytd-video-renderer[is-shorts]",
        "ytd-reel-video-renderer",
        r#"a[href*="/shorts/"]"#,
        r#"[data-content-type="shorts"]"#,
        ".ytd-search ytd-video-renderer[is-shorts]",
    ];

    pub const SUBSCRIPTIONS: &'static [&'static str] = &[
        "ytd-video-renderer[is-shorts]",
        "ytd-grid-video-renderer[is-shorts]",
        "ytd-reel-video-renderer",
        r#"a[href*="/shorts/"]"#,
        r#".ytd-browse[page-subtype="subscriptions"] ytd-video-renderer[is-shorts]"#,
    ];

    pub const TRENDING: &'static [&'static str] = &[
        "ytd-video-renderer[is-shorts]",
        "ytd-expanded-shelf-contents-renderer ytd-video-renderer[is-shorts]",
        r#"a[href*="/shorts/"]"#,
    ];

    pub const CHANNEL: &'static [&'static str] = &[
        "ytd-grid-video-renderer[is-shorts]",
        "ytd-reel-video-renderer",
        r#"a[href*="/shorts/"]"#,
        r#"[data-content-type="shorts"]"#,
    ];

    pub const RELATED: &'static [&'static str] = &[
        "ytd-compact-video-renderer[is-shorts]",
        "ytd-video-renderer[is-shorts]",
        r#"#related a[href*="/shorts/"]"#,
    ];

    pub const MOBILE: &'static [&'static str] = &[
        ".shorts-video-cell",
        ".reel-video-in-sequence",
        r#"a[href*="/shorts/"]"#,
    ];

    /// Links the classifier reads ids from.
    pub const SHORTS_LINK: &'static str = r#"a[href*="/shorts/"]"#;
    pub const CHANNEL_LINK: &'static str = r#"a[href*="/channel/"], a[href*="/@"]"#;
}

/// Compiled selector sets, one per page context.
#[derive(Debug, Clone)]
pub struct SelectorCatalog {
    container: SelectorList,
    home: SelectorList,
    search: SelectorList,
    subscriptions: SelectorList,
    trending: SelectorList,
    other: SelectorList,
    shorts_link: SelectorList,
    channel_link: SelectorList,
}

impl SelectorCatalog {
    pub fn new() -> Result<Self, SelectorError> {
        let container = SelectorList::parse_all(ShortsSelectors::CONTAINER.iter().copied())?;
        let home = SelectorList::parse_all(ShortsSelectors::HOME.iter().copied())?;
        let search = SelectorList::parse_all(ShortsSelectors::SEARCH.iter().copied())?;
        let subscriptions = SelectorList::parse_all(ShortsSelectors::SUBSCRIPTIONS.iter().copied())?;
        let trending = SelectorList::parse_all(ShortsSelectors::TRENDING.iter().copied())?;

        // Pages outside the four feeds (channel pages, watch pages, mobile
        // layouts) get every non-feed set.
        let other = container
            .union(&SelectorList::parse_all(ShortsSelectors::CHANNEL.iter().copied())?)
            .union(&SelectorList::parse_all(ShortsSelectors::RELATED.iter().copied())?)
            .union(&SelectorList::parse_all(ShortsSelectors::MOBILE.iter().copied())?);

        Ok(Self {
            shorts_link: ShortsSelectors::SHORTS_LINK.parse()?,
            channel_link: ShortsSelectors::CHANNEL_LINK.parse()?,
            container,
            home,
            search,
            subscriptions,
            trending,
            other,
        })
    }

    /// Selectors for `context`. Never empty.
    pub fn for_context(&self, context: PageContext) -> &SelectorList {
        match context {
            PageContext::Home => &self.home,
            PageContext::Search => &self.search,
            PageContext::Subscriptions => &self.subscriptions,
            PageContext::Trending => &self.trending,
            PageContext::Other => &self.other,
        }
    }

    /// Universal short-form container set, unioned into every scan.
    pub fn container(&self) -> &SelectorList {
        &self.container
    }

    pub fn shorts_link(&self) -> &SelectorList {
        &self.shorts_link
    }

    pub fn channel_link(&self) -> &SelectorList {
        &self.channel_link
    }
}

/// URL patterns used to pull identifiers out of link targets.
#[derive(Debug, Clone)]
pub struct UrlPatterns {
    pub shorts: Regex,
    pub channel_id: Regex,
    pub channel_handle: Regex,
}

impl UrlPatterns {
    pub fn new() -> Result<Self> {
        let compile = |p: &str| Regex::new(p).map_err(|e| anyhow::anyhow!("Failed to compile regex: {}", e));
        Ok(Self {
            shorts: compile(r"/shorts/([a-zA-Z0-9_-]+)")?,
            channel_id: compile(r"/channel/([a-zA-Z0-9_-]+)")?,
            channel_handle: compile(r"/@([a-zA-Z0-9_.-]+)")?,
        })
    }

    fn capture(pattern: &Regex, haystack: &str) -> Option<String> {
        pattern
            .captures(haystack)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    pub fn shorts_id(&self, url: &str) -> Option<String> {
        Self::capture(&self.shorts, url)
    }

    pub fn channel_id(&self, url: &str) -> Option<String> {
        Self::capture(&self.channel_id, url)
    }

    pub fn channel_handle(&self, url: &str) -> Option<String> {
        Self::capture(&self.channel_handle, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_context_has_selectors() {
        let catalog = SelectorCatalog::new().unwrap();
        for context in PageContext::ALL {
            assert!(!catalog.for_context(context).is_empty(), "{:?} has no selectors", context);
        }
        assert!(!catalog.container().is_empty());
        assert!(catalog.for_context(PageContext::Other).len() > catalog.container().len());
    }

    #[test]
    fn test_url_patterns() {
        let patterns = UrlPatterns::new().unwrap();
        assert_eq!(patterns.shorts_id("https://www.youtube.com/shorts/abc_12-3?feature=share").as_deref(), Some("abc_12-3"));
        assert_eq!(patterns.shorts_id("https://www.youtube.com/watch?v=abc"), None);
        assert_eq!(patterns.channel_id("/channel/UC123abc/videos").as_deref(), Some("UC123abc"));
        assert_eq!(patterns.channel_handle("https://www.youtube.com/@some.creator-1").as_deref(), Some("some.creator-1"));
    }
}
