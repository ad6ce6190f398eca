use crate::config::{BlockingMode, Settings};
use crate::types::{Action, ChannelInfo, PageContext};

use tracing::trace;

/// Decide what to do with one candidate. First match wins:
///
/// 1. already marked → `Skip`
/// 2. whitelisting on and the channel id is whitelisted → `Skip`
/// 3. blocking disabled for the (known) page context → `Skip`
/// 4. the configured blocking mode
///
/// `channel` is only called when the whitelist has to be consulted.
pub fn decide<F>(marked: bool, channel: F, settings: &Settings, context: PageContext) -> Action
where
    F: FnOnce() -> Option<ChannelInfo>,
{
    if marked {
        return Action::Skip;
    }

    if settings.allow_whitelisted_channels && !settings.whitelisted_channels.is_empty() {
        let channel_id = channel().and_then(|c| c.id);
        if let Some(id) = channel_id.as_deref() {
            if settings.is_whitelisted(id) {
                trace!(channel = id, "skipping whitelisted channel");
                return Action::Skip;
            }
        }
    }

    if !settings.blocks_in(context) {
        return Action::Skip;
    }

    match settings.blocking_mode {
        BlockingMode::Suppress => Action::Suppress,
        BlockingMode::Remove => Action::Remove,
        BlockingMode::Redirect => Action::Redirect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str) -> impl FnOnce() -> Option<ChannelInfo> {
        let id = id.to_string();
        move || {
            Some(ChannelInfo {
                id: Some(id),
                ..Default::default()
            })
        }
    }

    fn no_channel() -> Option<ChannelInfo> {
        None
    }

    #[test]
    fn test_marked_is_always_skipped() {
        let settings = Settings::default();
        for context in PageContext::ALL {
            assert_eq!(decide(true, no_channel, &settings, context), Action::Skip);
        }
    }

    #[test]
    fn test_whitelist_wins_over_every_mode() {
        for mode in [BlockingMode::Suppress, BlockingMode::Remove, BlockingMode::Redirect] {
            let settings = Settings {
                blocking_mode: mode,
                whitelisted_channels: vec!["UCfriend".into()],
                ..Settings::default()
            };
            assert_eq!(decide(false, channel("UCfriend"), &settings, PageContext::Search), Action::Skip);
            assert_ne!(decide(false, channel("UCother"), &settings, PageContext::Search), Action::Skip);
        }
    }

    #[test]
    fn test_whitelist_ignored_when_disallowed() {
        let settings = Settings {
            allow_whitelisted_channels: false,
            whitelisted_channels: vec!["UCfriend".into()],
            ..Settings::default()
        };
        assert_eq!(decide(false, channel("UCfriend"), &settings, PageContext::Search), Action::Suppress);
    }

    #[test]
    fn test_missing_channel_is_not_whitelisted() {
        let settings = Settings {
            whitelisted_channels: vec!["UCfriend".into()],
            ..Settings::default()
        };
        assert_eq!(decide(false, no_channel, &settings, PageContext::Search), Action::Suppress);
    }

    #[test]
    fn test_context_gating() {
        let settings = Settings {
            block_in_home: false,
            blocking_mode: BlockingMode::Remove,
            ..Settings::default()
        };
        assert_eq!(decide(false, no_channel, &settings, PageContext::Home), Action::Skip);
        assert_eq!(decide(false, no_channel, &settings, PageContext::Search), Action::Remove);

        // trending is off by default; other pages are always eligible
        let defaults = Settings::default();
        assert_eq!(decide(false, no_channel, &defaults, PageContext::Trending), Action::Skip);
        assert_eq!(decide(false, no_channel, &defaults, PageContext::Other), Action::Suppress);
    }

    #[test]
    fn test_mode_mapping() {
        let cases = [
            (BlockingMode::Suppress, Action::Suppress),
            (BlockingMode::Remove, Action::Remove),
            (BlockingMode::Redirect, Action::Redirect),
        ];
        for (mode, expected) in cases {
            let settings = Settings {
                blocking_mode: mode,
                ..Settings::default()
            };
            assert_eq!(decide(false, no_channel, &settings, PageContext::Search), expected);
        }
    }
}
