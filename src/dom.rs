//! In-memory host page model.
//!
//! The blocker never talks to a concrete browser API. It sees the page
//! through [`Document`], an arena of element nodes addressed by [`NodeId`],
//! plus two change feeds: subtree insertions below `<body>` and history
//! (`popstate`) navigations. Both feeds are handed out as [`Subscription`]s;
//! dropping or cancelling a subscription releases it.

use crate::selector::SelectorList;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use url::Url;

/// Stable identity of an element for the lifetime of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomEvent {
    /// One or more nodes were inserted somewhere below `<body>`.
    ChildList { parent: NodeId, added: usize },
    /// The history stack moved (back/forward) to `url`.
    PopState { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Feed {
    Mutations,
    History,
}

struct Listener {
    feed: Feed,
    tx: mpsc::UnboundedSender<DomEvent>,
}

/// Cancellable handle on one of the document's change feeds.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<DomEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<DomEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DomEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop receiving. Equivalent to dropping the handle.
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

/// Declarative element tree used to populate a document.
#[derive(Debug, Clone, Default)]
pub struct ElementSpec {
    tag: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    head: NodeId,
    body: Option<NodeId>,
    location: Url,
    local_storage: HashMap<String, String>,
    listeners: Vec<Listener>,
}

impl Document {
    /// A document at `location` whose `<body>` has not been parsed yet.
    pub fn new(location: Url) -> Self {
        let mut doc = Self {
            nodes: vec![Node::new("html")],
            root: NodeId(0),
            head: NodeId(0),
            body: None,
            location,
            local_storage: HashMap::new(),
            listeners: Vec::new(),
        };
        let head = doc.create_element("head");
        doc.link(doc.root, head);
        doc.head = head;
        doc
    }

    /// A document at `location` with an empty `<body>` already in place.
    pub fn loaded(location: &str) -> Result<Self, url::ParseError> {
        let mut doc = Self::new(Url::parse(location)?);
        doc.ensure_body();
        Ok(doc)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> Option<NodeId> {
        self.body
    }

    pub fn ensure_body(&mut self) -> NodeId {
        if let Some(body) = self.body {
            return body;
        }
        let body = self.create_element("body");
        self.link(self.root, body);
        self.body = Some(body);
        body
    }

    // --- location & history ---

    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Client-side route change (`history.pushState`). Fires no event.
    pub fn navigate(&mut self, location: &str) -> Result<(), url::ParseError> {
        self.location = self.location.join(location)?;
        Ok(())
    }

    /// Back/forward navigation. Notifies history subscribers.
    pub fn pop_state(&mut self, location: &str) -> Result<(), url::ParseError> {
        self.location = self.location.join(location)?;
        let url = self.location.to_string();
        self.emit(Feed::History, DomEvent::PopState { url });
        Ok(())
    }

    /// Resolve a possibly relative link target against the page location.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        self.location.join(href).ok()
    }

    pub fn local_storage_item(&self, key: &str) -> Option<&str> {
        self.local_storage.get(key).map(String::as_str)
    }

    pub fn set_local_storage_item(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.local_storage.insert(key.into(), value.into());
    }

    // --- tree construction ---

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Node::new(tag));
        NodeId(self.nodes.len() - 1)
    }

    /// Build `spec` as a detached subtree and return its root.
    pub fn build(&mut self, spec: &ElementSpec) -> NodeId {
        let id = self.create_element(&spec.tag);
        self.nodes[id.0].attributes = spec.attributes.clone();
        self.nodes[id.0].text = spec.text.clone();
        for child in &spec.children {
            let child_id = self.build(child);
            self.link(id, child_id);
        }
        id
    }

    /// Build `spec` and append it under `parent` as a single insertion.
    pub fn insert(&mut self, parent: NodeId, spec: &ElementSpec) -> NodeId {
        let id = self.build(spec);
        self.append_child(parent, id);
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.link(parent, child);
        if self.in_body(parent) {
            self.emit(Feed::Mutations, DomEvent::ChildList { parent, added: 1 });
        }
    }

    /// Remove `node` (and its subtree) from its parent.
    pub fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    // --- node accessors ---

    pub fn tag(&self, node: NodeId) -> &str {
        &self.nodes[node.0].tag
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), move |n| self.parent(*n))
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        node == self.root || self.ancestors(node).any(|a| a == self.root)
    }

    fn in_body(&self, node: NodeId) -> bool {
        match self.body {
            Some(body) => node == body || self.ancestors(node).any(|a| a == body),
            None => false,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes[node.0]
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: impl Into<String>) {
        let value = value.into();
        let attributes = &mut self.nodes[node.0].attributes;
        match attributes.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => attributes.push((name.to_string(), value)),
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        self.nodes[node.0].attributes.retain(|(n, _)| n != name);
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|list| list.split_whitespace().any(|c| c == class))
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let list = match self.attribute(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attribute(node, "class", list);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        let Some(existing) = self.attribute(node, "class") else {
            return;
        };
        let remaining: Vec<&str> = existing.split_whitespace().filter(|c| *c != class).collect();
        if remaining.is_empty() {
            self.remove_attribute(node, "class");
        } else {
            let joined = remaining.join(" ");
            self.set_attribute(node, "class", joined);
        }
    }

    /// Own text followed by every descendant's text, in document order.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = self.nodes[node.0].text.clone();
        for child in &self.nodes[node.0].children {
            out.push_str(&self.text_content(*child));
        }
        out
    }

    // --- traversal & queries ---

    /// `node` followed by its descendants, pre-order.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current.0].children.iter().rev());
        }
        out
    }

    /// Every connected element in document order.
    pub fn document_order(&self) -> Vec<NodeId> {
        self.subtree(self.root)
    }

    pub fn query_all(&self, selectors: &SelectorList) -> Vec<NodeId> {
        self.document_order()
            .into_iter()
            .filter(|n| selectors.matches(self, *n))
            .collect()
    }

    /// First node in `root`'s subtree (`root` included) matching `selectors`.
    pub fn query_within(&self, root: NodeId, selectors: &SelectorList) -> Option<NodeId> {
        self.subtree(root)
            .into_iter()
            .find(|n| selectors.matches(self, *n))
    }

    /// Every node in `root`'s subtree (`root` included) matching `selectors`.
    pub fn query_all_within(&self, root: NodeId, selectors: &SelectorList) -> Vec<NodeId> {
        self.subtree(root)
            .into_iter()
            .filter(|n| selectors.matches(self, *n))
            .collect()
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let n = &self.nodes[node.0];
        let mut out = format!("<{}", n.tag);
        for (name, value) in &n.attributes {
            out.push_str(&format!(" {}=\"{}\"", name, value.replace('"', "&quot;")));
        }
        out.push('>');
        out.push_str(&n.text);
        for child in &n.children {
            out.push_str(&self.outer_html(*child));
        }
        out.push_str(&format!("</{}>", n.tag));
        out
    }

    // --- change feeds ---

    /// Watch insertions anywhere below `<body>`. `None` while the body does
    /// not exist yet.
    pub fn observe_body(&mut self) -> Option<Subscription> {
        self.body?;
        Some(self.subscribe(Feed::Mutations))
    }

    /// Watch back/forward navigations.
    pub fn listen_history(&mut self) -> Subscription {
        self.subscribe(Feed::History)
    }

    /// Number of subscriptions still held by someone.
    pub fn active_subscriptions(&self) -> usize {
        self.listeners.iter().filter(|l| !l.tx.is_closed()).count()
    }

    fn subscribe(&mut self, feed: Feed) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(Listener { feed, tx });
        Subscription { rx }
    }

    fn emit(&mut self, feed: Feed, event: DomEvent) {
        self.listeners.retain(|l| !l.tx.is_closed());
        for listener in self.listeners.iter().filter(|l| l.feed == feed) {
            let _ = listener.tx.send(event.clone());
        }
    }
}

/// Shared handle on the page's document.
#[derive(Clone)]
pub struct Page {
    document: Arc<Mutex<Document>>,
}

impl Page {
    pub fn new(document: Document) -> Self {
        Self {
            document: Arc::new(Mutex::new(document)),
        }
    }

    /// Lock the document. A panic while the lock was held does not make the
    /// page unusable.
    pub fn lock(&self) -> MutexGuard<'_, Document> {
        self.document.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::loaded("https://www.youtube.com/").unwrap()
    }

    #[test]
    fn test_new_document_has_no_body() {
        let mut doc = Document::new(Url::parse("https://www.youtube.com/").unwrap());
        assert!(doc.body().is_none());
        assert!(doc.observe_body().is_none());
        let body = doc.ensure_body();
        assert_eq!(doc.ensure_body(), body);
        assert!(doc.observe_body().is_some());
    }

    #[test]
    fn test_insertion_notifies_body_observers() {
        let mut doc = doc();
        let body = doc.body().unwrap();
        let mut sub = doc.observe_body().unwrap();

        doc.insert(body, &ElementSpec::new("div"));
        assert_eq!(
            sub.try_recv(),
            Some(DomEvent::ChildList {
                parent: body,
                added: 1
            })
        );

        // head insertions are outside the watched subtree
        let head = doc.head();
        doc.insert(head, &ElementSpec::new("style"));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_dropped_subscription_is_released() {
        let mut doc = doc();
        let sub = doc.observe_body().unwrap();
        let history = doc.listen_history();
        assert_eq!(doc.active_subscriptions(), 2);

        drop(sub);
        history.cancel();
        assert_eq!(doc.active_subscriptions(), 0);
    }

    #[test]
    fn test_pop_state_and_navigate() {
        let mut doc = doc();
        let mut history = doc.listen_history();

        doc.navigate("/results?search_query=cats").unwrap();
        assert_eq!(doc.location().path(), "/results");
        assert_eq!(history.try_recv(), None);

        doc.pop_state("/").unwrap();
        assert_eq!(doc.location().path(), "/");
        assert!(matches!(history.try_recv(), Some(DomEvent::PopState { .. })));
    }

    #[test]
    fn test_classes_and_attributes() {
        let mut doc = doc();
        let body = doc.body().unwrap();
        let el = doc.insert(body, &ElementSpec::new("div").attr("class", "a b"));

        doc.add_class(el, "c");
        doc.add_class(el, "c");
        assert_eq!(doc.attribute(el, "class"), Some("a b c"));

        doc.remove_class(el, "a");
        doc.remove_class(el, "b");
        doc.remove_class(el, "c");
        assert!(!doc.has_attribute(el, "class"));

        doc.set_attribute(el, "title", "x");
        doc.set_attribute(el, "title", "y");
        assert_eq!(doc.attribute(el, "title"), Some("y"));
    }

    #[test]
    fn test_detach_disconnects_subtree() {
        let mut doc = doc();
        let body = doc.body().unwrap();
        let outer = doc.insert(
            body,
            &ElementSpec::new("div").child(ElementSpec::new("a").text("hi")),
        );
        let inner = doc.children(outer)[0];
        assert!(doc.is_connected(inner));
        assert_eq!(doc.text_content(outer), "hi");

        doc.detach(outer);
        assert!(!doc.is_connected(outer));
        assert!(!doc.is_connected(inner));
        assert!(!doc.document_order().contains(&inner));
    }

    #[test]
    fn test_outer_html() {
        let mut doc = doc();
        let body = doc.body().unwrap();
        let el = doc.insert(
            body,
            &ElementSpec::new("a").attr("href", "/shorts/x").text("t"),
        );
        assert_eq!(doc.outer_html(el), r#"<a href="/shorts/x">t</a>"#);
    }
}
