//! Virtual DOM
//!
//! Headless, in-memory `Browser` implementation. Holds an element tree with
//! per-element geometry, scroll offset, focus, inline styles and pointer
//! listeners. Used by the tests and by the scenario CLI.

mod signal;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::browser::{Browser, ElementOffset, PointerEvent, Watch};
use crate::error::AnnotationError;
use signal::Signal;

/// Handle to an element of a [`VirtualDom`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pointer-down event dispatched through the virtual DOM
#[derive(Debug, Clone)]
pub struct DomPointerEvent {
    target: NodeId,
    default_prevented: Arc<AtomicBool>,
}

impl DomPointerEvent {
    fn new(target: NodeId) -> Self {
        Self {
            target,
            default_prevented: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Element the pointer went down on
    pub fn target(&self) -> NodeId {
        self.target
    }

    fn prevent_default(&self) {
        self.default_prevented.store(true, Ordering::Release);
    }
}

impl PointerEvent for DomPointerEvent {
    fn default_prevented(&self) -> bool {
        self.default_prevented.load(Ordering::Acquire)
    }
}

struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    offset: Signal<ElementOffset>,
    scroll: Signal<ElementOffset>,
    focus: Signal<bool>,
    style: BTreeMap<String, String>,
    pointer_listeners: Vec<oneshot::Sender<DomPointerEvent>>,
}

impl Node {
    fn new(name: &str, parent: Option<NodeId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            offset: Signal::new(ElementOffset::default()),
            scroll: Signal::new(ElementOffset::default()),
            focus: Signal::new(false),
            style: BTreeMap::new(),
            pointer_listeners: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Document {
    nodes: Vec<Node>,
    focused: Option<NodeId>,
    /// Last dispatch sequence handed out
    clock: u64,
}

impl Document {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    fn descendants_named(&self, root: NodeId, name: &str) -> Option<NodeId> {
        let mut stack: Vec<NodeId> = self.node(root)?.children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            if node.name == name {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }
}

/// In-memory document shared by cloning
#[derive(Clone, Default)]
pub struct VirtualDom {
    inner: Arc<Mutex<Document>>,
}

impl VirtualDom {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Tree
    // =========================================================================

    /// Create an element, appended as the last child of `parent`
    pub fn create_element(&self, name: &str, parent: Option<NodeId>) -> NodeId {
        let mut doc = self.inner.lock();
        let id = NodeId(doc.nodes.len());
        doc.nodes.push(Node::new(name, parent));
        if let Some(node) = parent.and_then(|p| doc.node_mut(p)) {
            node.children.push(id);
        }
        id
    }

    /// Name the element was created with
    pub fn name(&self, id: NodeId) -> Option<String> {
        self.inner.lock().node(id).map(|n| n.name.clone())
    }

    /// Children of the element in document order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.inner
            .lock()
            .node(id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Move the element to a new offset
    pub fn set_offset(&self, id: NodeId, x: f64, y: f64) {
        let mut doc = self.inner.lock();
        let seq = doc.tick();
        if let Some(node) = doc.node_mut(id) {
            node.offset.set(ElementOffset::new(x, y), seq);
        }
    }

    /// Current offset of the element
    pub fn offset(&self, id: NodeId) -> Option<ElementOffset> {
        self.inner.lock().node(id).map(|n| n.offset.get())
    }

    /// Scroll the element's content to an absolute position
    pub fn scroll_to(&self, id: NodeId, x: f64, y: f64) {
        let mut doc = self.inner.lock();
        let seq = doc.tick();
        if let Some(node) = doc.node_mut(id) {
            node.scroll.set(ElementOffset::new(x, y), seq);
        }
    }

    /// Scroll the element's content by a delta
    pub fn scroll_by(&self, id: NodeId, dx: f64, dy: f64) {
        let mut doc = self.inner.lock();
        let seq = doc.tick();
        if let Some(node) = doc.node_mut(id) {
            let current = node.scroll.get();
            node.scroll
                .set(ElementOffset::new(current.x + dx, current.y + dy), seq);
        }
    }

    /// Current content offset of the element
    pub fn content_offset(&self, id: NodeId) -> Option<ElementOffset> {
        self.inner.lock().node(id).map(|n| n.scroll.get())
    }

    // =========================================================================
    // Focus
    // =========================================================================

    /// Focus the element, blurring whichever element held focus before
    pub fn focus(&self, id: NodeId) {
        let mut doc = self.inner.lock();
        if doc.focused == Some(id) || doc.node(id).is_none() {
            return;
        }
        if let Some(previous) = doc.focused.take() {
            let seq = doc.tick();
            if let Some(node) = doc.node_mut(previous) {
                node.focus.set(false, seq);
            }
        }
        let seq = doc.tick();
        if let Some(node) = doc.node_mut(id) {
            node.focus.set(true, seq);
        }
        doc.focused = Some(id);
        trace!(element = %id, "focus");
    }

    /// Remove focus from the element if it holds it
    pub fn blur(&self, id: NodeId) {
        let mut doc = self.inner.lock();
        if doc.focused != Some(id) {
            return;
        }
        doc.focused = None;
        let seq = doc.tick();
        if let Some(node) = doc.node_mut(id) {
            node.focus.set(false, seq);
        }
        trace!(element = %id, "blur");
    }

    /// Element currently holding focus
    pub fn focused(&self) -> Option<NodeId> {
        self.inner.lock().focused
    }

    // =========================================================================
    // Pointer
    // =========================================================================

    /// Dispatch a pointer-down on `target`, bubbling to the root
    ///
    /// Every listener armed on the path fires once and is removed. A live
    /// listener suppresses default handling before this returns.
    pub fn dispatch_pointer_down(&self, target: NodeId) -> DomPointerEvent {
        let event = DomPointerEvent::new(target);
        let mut doc = self.inner.lock();
        let mut current = Some(target);
        let mut delivered = 0;
        while let Some(id) = current {
            let Some(node) = doc.node_mut(id) else { break };
            for listener in std::mem::take(&mut node.pointer_listeners) {
                if listener.is_closed() {
                    continue;
                }
                event.prevent_default();
                if listener.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
            current = node.parent;
        }
        trace!(node = %target, delivered, "pointer down");
        event
    }

    /// Number of pointer listeners still armed on the element
    pub fn pointer_listeners(&self, id: NodeId) -> usize {
        let mut doc = self.inner.lock();
        doc.node_mut(id).map_or(0, |node| {
            node.pointer_listeners.retain(|tx| !tx.is_closed());
            node.pointer_listeners.len()
        })
    }

    // =========================================================================
    // Styles
    // =========================================================================

    /// Inline style property of the element
    pub fn style_property(&self, id: NodeId, name: &str) -> Option<String> {
        self.inner
            .lock()
            .node(id)
            .and_then(|n| n.style.get(name).cloned())
    }

    // =========================================================================
    // Observation and failure injection
    // =========================================================================

    /// Live subscribers to the element's offset
    pub fn offset_watchers(&self, id: NodeId) -> usize {
        self.inner
            .lock()
            .node_mut(id)
            .map_or(0, |n| n.offset.live_subscribers())
    }

    /// Live subscribers to the element's content offset
    pub fn scroll_watchers(&self, id: NodeId) -> usize {
        self.inner
            .lock()
            .node_mut(id)
            .map_or(0, |n| n.scroll.live_subscribers())
    }

    /// Live subscribers to the element's focus
    pub fn focus_watchers(&self, id: NodeId) -> usize {
        self.inner
            .lock()
            .node_mut(id)
            .map_or(0, |n| n.focus.live_subscribers())
    }

    /// Fail the element's focus source
    pub fn fail_focus(&self, id: NodeId, message: &str) {
        if let Some(node) = self.inner.lock().node_mut(id) {
            node.focus.fail(AnnotationError::Focus(message.to_string()));
        }
    }

    /// Fail the element's offset source
    pub fn fail_offset(&self, id: NodeId, message: &str) {
        if let Some(node) = self.inner.lock().node_mut(id) {
            node.offset.fail(AnnotationError::Offset(message.to_string()));
        }
    }

    /// Fail the element's scroll source
    pub fn fail_scroll(&self, id: NodeId, message: &str) {
        if let Some(node) = self.inner.lock().node_mut(id) {
            node.scroll.fail(AnnotationError::Scroll(message.to_string()));
        }
    }

    fn watch<T, F>(&self, id: NodeId, select: F) -> Watch<T>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&mut Node) -> &mut Signal<T>,
    {
        match self.inner.lock().node_mut(id) {
            Some(node) => select(node).subscribe(),
            None => futures::stream::once(future::ready(Err(AnnotationError::ElementNotFound(
                id.to_string(),
            ))))
            .boxed(),
        }
    }
}

impl Browser for VirtualDom {
    type Element = NodeId;
    type PointerEvent = DomPointerEvent;

    fn element_offset(&self, el: &NodeId) -> Watch<ElementOffset> {
        self.watch(*el, |node| &mut node.offset)
    }

    fn element_content_offset(&self, el: &NodeId) -> Watch<ElementOffset> {
        self.watch(*el, |node| &mut node.scroll)
    }

    fn element_focus(&self, el: &NodeId) -> Watch<bool> {
        self.watch(*el, |node| &mut node.focus)
    }

    fn query(&self, root: &NodeId, selector: &str) -> Option<NodeId> {
        let doc = self.inner.lock();
        let node = doc.node(*root)?;
        let selector = selector.split_whitespace().collect::<Vec<_>>().join(" ");
        match selector.as_str() {
            ":scope > :last-child" => node.children.last().copied(),
            ":scope > :first-child" => node.children.first().copied(),
            other => match other.strip_prefix('#') {
                Some(name) => doc.descendants_named(*root, name),
                None => {
                    debug!(selector = other, "Unsupported selector");
                    None
                }
            },
        }
    }

    fn pointer_down(&self, el: &NodeId) -> BoxFuture<'static, crate::Result<DomPointerEvent>> {
        let element = *el;
        let mut doc = self.inner.lock();
        let Some(node) = doc.node_mut(element) else {
            return future::ready(Err(AnnotationError::ElementNotFound(element.to_string())))
                .boxed();
        };
        let (tx, rx) = oneshot::channel();
        node.pointer_listeners.retain(|tx| !tx.is_closed());
        node.pointer_listeners.push(tx);
        async move {
            rx.await
                .map_err(|_| AnnotationError::PointerClosed(element.to_string()))
        }
        .boxed()
    }

    fn set_style_property(&self, el: &NodeId, name: &str, value: &str) {
        if let Some(node) = self.inner.lock().node_mut(*el) {
            node.style.insert(name.to_string(), value.to_string());
        }
    }

    fn remove_style_property(&self, el: &NodeId, name: &str) {
        if let Some(node) = self.inner.lock().node_mut(*el) {
            node.style.remove(name);
        }
    }

    fn blur(&self, el: &NodeId) {
        VirtualDom::blur(self, *el);
    }
}
