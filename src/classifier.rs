//! Element classification: page context, candidate discovery and
//! identifier extraction.

use crate::catalog::{SelectorCatalog, UrlPatterns};
use crate::dom::{Document, NodeId};
use crate::types::{Candidate, ChannelInfo, PageContext};

use anyhow::Result;
use std::collections::HashSet;
use tracing::trace;

pub struct Classifier {
    catalog: SelectorCatalog,
    patterns: UrlPatterns,
}

impl Classifier {
    pub fn new() -> Result<Self> {
        Ok(Self {
            catalog: SelectorCatalog::new()?,
            patterns: UrlPatterns::new()?,
        })
    }

    pub fn catalog(&self) -> &SelectorCatalog {
        &self.catalog
    }

    pub fn classify_page(&self, doc: &Document) -> PageContext {
        PageContext::from_path(doc.location().path())
    }

    /// Elements matching the context's selectors or the universal container
    /// set. Each node appears once, in document order. A match nested inside
    /// another match is left to its outermost candidate, so one item is
    /// decided, treated and counted once.
    pub fn find_candidates(&self, doc: &Document, context: PageContext) -> Vec<NodeId> {
        let sets = [self.catalog.for_context(context), self.catalog.container()];
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for set in sets {
            for node in doc.query_all(set) {
                if seen.insert(node) {
                    found.push(node);
                }
            }
        }

        let order: std::collections::HashMap<NodeId, usize> = doc
            .document_order()
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n, i))
            .collect();
        found.sort_by_key(|n| order.get(n).copied().unwrap_or(usize::MAX));
        found.retain(|n| !doc.ancestors(*n).any(|a| seen.contains(&a)));

        trace!(%context, count = found.len(), "candidates found");
        found
    }

    /// Id of the short-form video the element points at: from a short-form
    /// link on the element or below it, else from `data-video-id` /
    /// `data-context-item-id`.
    pub fn extract_video_id(&self, doc: &Document, node: NodeId) -> Option<String> {
        if let Some(link) = doc.query_within(node, self.catalog.shorts_link()) {
            return self.link_video_id(doc, link);
        }
        doc.attribute(node, "data-video-id")
            .or_else(|| doc.attribute(node, "data-context-item-id"))
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// Id encoded in one short-form link's target.
    pub fn link_video_id(&self, doc: &Document, link: NodeId) -> Option<String> {
        let href = doc.attribute(link, "href")?;
        let absolute = doc.resolve(href).map(|u| u.to_string());
        self.patterns.shorts_id(absolute.as_deref().unwrap_or(href))
    }

    /// Channel of the first channel/handle link on or below the element.
    /// `None` when there is no such link; fields are independently optional.
    pub fn extract_channel_info(&self, doc: &Document, node: NodeId) -> Option<ChannelInfo> {
        let link = doc.query_within(node, self.catalog.channel_link())?;
        let href = doc.attribute(link, "href").unwrap_or_default();
        let href = doc.resolve(href).map(|u| u.to_string()).unwrap_or_else(|| href.to_string());

        let name = doc.text_content(link).trim().to_string();
        Some(ChannelInfo {
            name: (!name.is_empty()).then_some(name),
            id: self.patterns.channel_id(&href),
            handle: self.patterns.channel_handle(&href),
        })
    }

    pub fn describe(&self, doc: &Document, node: NodeId) -> Candidate {
        Candidate {
            node,
            video_id: self.extract_video_id(doc, node),
            channel: self.extract_channel_info(doc, node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ElementSpec;
    use pretty_assertions::assert_eq;

    fn reel(video: &str) -> ElementSpec {
        ElementSpec::new("ytd-reel-item-renderer")
            .child(ElementSpec::new("a").attr("href", format!("/shorts/{}", video)))
            .child(
                ElementSpec::new("a")
                    .attr("href", "/channel/UCabc123")
                    .text("  Creator  "),
            )
    }

    #[test]
    fn test_classify_page_uses_path_only() {
        let classifier = Classifier::new().unwrap();
        let doc = Document::loaded("https://www.youtube.com/results?search_query=cats").unwrap();
        assert_eq!(classifier.classify_page(&doc), PageContext::Search);
        let doc = Document::loaded("https://www.youtube.com/feed/subscriptions").unwrap();
        assert_eq!(classifier.classify_page(&doc), PageContext::Subscriptions);
    }

    #[test]
    fn test_overlapping_selectors_yield_one_candidate() {
        let classifier = Classifier::new().unwrap();
        let mut doc = Document::loaded("https://www.youtube.com/results").unwrap();
        let body = doc.body().unwrap();
        // matches `ytd-reel-video-renderer`, `[is-shorts]` and the container set
        let el = doc.insert(body, &ElementSpec::new("ytd-reel-video-renderer").attr("is-shorts", ""));

        let found = classifier.find_candidates(&doc, PageContext::Search);
        assert_eq!(found, vec![el]);
    }

    #[test]
    fn test_nested_match_folds_into_outer_candidate() {
        let classifier = Classifier::new().unwrap();
        let mut doc = Document::loaded("https://www.youtube.com/results").unwrap();
        let body = doc.body().unwrap();
        let renderer = doc.insert(
            body,
            &ElementSpec::new("ytd-video-renderer")
                .attr("is-shorts", "")
                .child(ElementSpec::new("a").attr("href", "/shorts/xyz")),
        );
        let loose = doc.insert(body, &ElementSpec::new("a").attr("href", "/shorts/abc"));

        assert_eq!(classifier.find_candidates(&doc, PageContext::Search), vec![renderer, loose]);
    }

    #[test]
    fn test_candidates_in_document_order() {
        let classifier = Classifier::new().unwrap();
        let mut doc = Document::loaded("https://www.youtube.com/").unwrap();
        let body = doc.body().unwrap();
        // container-set match first, context-set match second
        let first = doc.insert(body, &ElementSpec::new("ytd-shorts"));
        let second = doc.insert(body, &ElementSpec::new("ytd-reel-shelf-renderer"));
        let regular = doc.insert(body, &ElementSpec::new("ytd-video-renderer"));

        let found = classifier.find_candidates(&doc, PageContext::Home);
        assert_eq!(found, vec![first, second]);
        assert!(!found.contains(&regular));
    }

    #[test]
    fn test_extract_ids_from_descendants() {
        let classifier = Classifier::new().unwrap();
        let mut doc = Document::loaded("https://www.youtube.com/").unwrap();
        let body = doc.body().unwrap();
        let el = doc.insert(body, &reel("abc123"));

        assert_eq!(classifier.extract_video_id(&doc, el).as_deref(), Some("abc123"));
        let channel = classifier.extract_channel_info(&doc, el).unwrap();
        assert_eq!(
            channel,
            ChannelInfo {
                name: Some("Creator".into()),
                id: Some("UCabc123".into()),
                handle: None,
            }
        );
    }

    #[test]
    fn test_extract_from_self_link_and_handle() {
        let classifier = Classifier::new().unwrap();
        let mut doc = Document::loaded("https://www.youtube.com/").unwrap();
        let body = doc.body().unwrap();
        let link = doc.insert(body, &ElementSpec::new("a").attr("href", "https://www.youtube.com/shorts/xyz"));
        let by_handle = doc.insert(body, &ElementSpec::new("a").attr("href", "/@creator.one"));

        assert_eq!(classifier.extract_video_id(&doc, link).as_deref(), Some("xyz"));
        let channel = classifier.extract_channel_info(&doc, by_handle).unwrap();
        assert_eq!(channel.handle.as_deref(), Some("creator.one"));
        assert_eq!(channel.id, None);
        assert_eq!(channel.name, None);
    }

    #[test]
    fn test_extraction_misses_are_none() {
        let classifier = Classifier::new().unwrap();
        let mut doc = Document::loaded("https://www.youtube.com/").unwrap();
        let body = doc.body().unwrap();
        let bare = doc.insert(body, &ElementSpec::new("ytd-shorts"));
        let with_data = doc.insert(body, &ElementSpec::new("ytd-shorts").attr("data-video-id", "dv1"));

        assert_eq!(classifier.extract_video_id(&doc, bare), None);
        assert_eq!(classifier.extract_channel_info(&doc, bare), None);
        assert_eq!(classifier.extract_video_id(&doc, with_data).as_deref(), Some("dv1"));
    }
}
