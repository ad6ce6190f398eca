//! Treatments applied to matched elements and their reversal.

use crate::classifier::Classifier;
use crate::dom::{Document, NodeId, Page};
use crate::types::Action;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const BLOCKED_ATTR: &str = "data-ytb-blocked";
const PREV_TITLE_ATTR: &str = "data-ytb-prev-title";
const ORIGINAL_HREF_ATTR: &str = "data-ytb-original-href";
const DEBUG_TITLE: &str = "YTB: Blocked Short (Debug Mode)";
pub const WATCH_URL: &str = "https://www.youtube.com/watch";

/// Class names the treatments add.
pub struct TreatmentClasses;

impl TreatmentClasses {
    pub const DEBUG: &'static str = "ytb-debug-mode";
    pub const FADE: &'static str = "ytb-animate-fade";
    pub const SLIDE: &'static str = "ytb-animate-slide";
    pub const REDIRECT: &'static str = "ytb-mode-redirect";

    pub const ALL: [&'static str; 4] = [Self::DEBUG, Self::FADE, Self::SLIDE, Self::REDIRECT];
}

/// Where "this element has been handled" is recorded.
pub trait MarkerStore: Send + Sync {
    fn is_marked(&self, doc: &Document, node: NodeId) -> bool;
    fn mark(&self, doc: &mut Document, node: NodeId);
    fn clear(&self, doc: &mut Document, node: NodeId);
    /// Marked nodes still attached to the document, in document order.
    fn marked(&self, doc: &Document) -> Vec<NodeId>;
}

/// Records the mark as a `data-ytb-blocked="true"` attribute on the node.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeMarker;

impl MarkerStore for AttributeMarker {
    fn is_marked(&self, doc: &Document, node: NodeId) -> bool {
        doc.has_attribute(node, BLOCKED_ATTR)
    }

    fn mark(&self, doc: &mut Document, node: NodeId) {
        doc.set_attribute(node, BLOCKED_ATTR, "true");
    }

    fn clear(&self, doc: &mut Document, node: NodeId) {
        doc.remove_attribute(node, BLOCKED_ATTR);
    }

    fn marked(&self, doc: &Document) -> Vec<NodeId> {
        doc.document_order()
            .into_iter()
            .filter(|n| doc.has_attribute(*n, BLOCKED_ATTR))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Treated and marked.
    Applied,
    /// Marked; the node must be detached once the removal delay elapses.
    RemovalScheduled,
    /// Nothing changed.
    NotApplied,
}

impl Outcome {
    pub fn is_treated(self) -> bool {
        !matches!(self, Outcome::NotApplied)
    }
}

pub struct TreatmentApplier {
    markers: Arc<dyn MarkerStore>,
}

impl Default for TreatmentApplier {
    fn default() -> Self {
        Self::new(Arc::new(AttributeMarker))
    }
}

impl TreatmentApplier {
    pub fn new(markers: Arc<dyn MarkerStore>) -> Self {
        Self { markers }
    }

    pub fn is_marked(&self, doc: &Document, node: NodeId) -> bool {
        self.markers.is_marked(doc, node)
    }

    pub fn marked(&self, doc: &Document) -> Vec<NodeId> {
        self.markers.marked(doc)
    }

    pub fn apply(&self, doc: &mut Document, classifier: &Classifier, node: NodeId, action: Action, debug: bool) -> Outcome {
        match action {
            Action::Skip => Outcome::NotApplied,
            Action::Suppress => self.suppress(doc, node, debug),
            Action::Remove => self.remove(doc, node, debug),
            Action::Redirect => self.redirect(doc, classifier, node),
        }
    }

    /// Hide the element in place. In debug mode highlight and label it instead.
    pub fn suppress(&self, doc: &mut Document, node: NodeId, debug: bool) -> Outcome {
        if debug {
            if let Some(title) = doc.attribute(node, "title").map(str::to_string) {
                doc.set_attribute(node, PREV_TITLE_ATTR, title);
            }
            doc.add_class(node, TreatmentClasses::DEBUG);
            doc.set_attribute(node, "title", DEBUG_TITLE);
        } else {
            doc.add_class(node, TreatmentClasses::FADE);
        }
        self.markers.mark(doc, node);
        Outcome::Applied
    }

    /// Start the exit animation. The caller detaches the node after the
    /// removal delay. In debug mode this is a highlighted suppress.
    pub fn remove(&self, doc: &mut Document, node: NodeId, debug: bool) -> Outcome {
        if debug {
            return self.suppress(doc, node, true);
        }
        doc.add_class(node, TreatmentClasses::SLIDE);
        self.markers.mark(doc, node);
        Outcome::RemovalScheduled
    }

    /// Point every short-form link inside the element at the regular watch
    /// page. No-op when no link yields a video id.
    pub fn redirect(&self, doc: &mut Document, classifier: &Classifier, node: NodeId) -> Outcome {
        let links = doc.query_all_within(node, classifier.catalog().shorts_link());
        let mut rewritten = 0;
        for link in links {
            let Some(video_id) = classifier.link_video_id(doc, link) else {
                continue;
            };
            let Ok(target) = Url::parse_with_params(WATCH_URL, &[("v", video_id.as_str())]) else {
                continue;
            };
            if !doc.has_attribute(link, ORIGINAL_HREF_ATTR) {
                let original = doc.attribute(link, "href").unwrap_or_default().to_string();
                doc.set_attribute(link, ORIGINAL_HREF_ATTR, original);
            }
            doc.set_attribute(link, "href", target.to_string());
            rewritten += 1;
        }
        if rewritten == 0 {
            return Outcome::NotApplied;
        }
        doc.add_class(node, TreatmentClasses::REDIRECT);
        self.markers.mark(doc, node);
        Outcome::Applied
    }

    /// Deferred half of [`TreatmentApplier::remove`]. Detaches `node` after
    /// `delay` unless it was unmarked in the meantime.
    pub fn finish_removal(&self, page: &Page, node: NodeId, delay: Duration) -> impl Future<Output = ()> + Send + use<> {
        let page = page.clone();
        let markers = Arc::clone(&self.markers);
        async move {
            tokio::time::sleep(delay).await;
            let mut doc = page.lock();
            if markers.is_marked(&doc, node) {
                doc.detach(node);
            }
        }
    }

    /// Undo every treatment on `node`.
    pub fn unmark(&self, doc: &mut Document, node: NodeId) {
        match doc.attribute(node, PREV_TITLE_ATTR).map(str::to_string) {
            Some(title) => {
                doc.set_attribute(node, "title", title);
                doc.remove_attribute(node, PREV_TITLE_ATTR);
            }
            None if doc.has_class(node, TreatmentClasses::DEBUG) => doc.remove_attribute(node, "title"),
            None => {}
        }
        for class in TreatmentClasses::ALL {
            doc.remove_class(node, class);
        }
        for n in doc.subtree(node) {
            if let Some(href) = doc.attribute(n, ORIGINAL_HREF_ATTR).map(str::to_string) {
                doc.set_attribute(n, "href", href);
                doc.remove_attribute(n, ORIGINAL_HREF_ATTR);
            }
        }
        self.markers.clear(doc, node);
    }

    /// Undo every marked node still in the document. Returns how many.
    pub fn unmark_all(&self, doc: &mut Document) -> usize {
        let marked = self.markers.marked(doc);
        for node in &marked {
            self.unmark(doc, *node);
        }
        marked.len()
    }
}
