//! Annotation observers
//!
//! Side-effect consumers of the annotation state. All observers of a mount
//! sit behind one [`Push`] hub, which guarantees a single completion no
//! matter how the mount ends.

use tokio::sync::mpsc;
use tracing::debug;

use super::Annotation;
use crate::browser::Browser;

/// Consumer of annotation states
pub trait AnnotationObserver: Send {
    /// Called for every published state
    fn on_state(&mut self, state: &Annotation);

    /// Called once when the mount ends (completion, error or drop)
    fn on_complete(&mut self);
}

/// Writes the offset into two custom style properties of the anchor
pub struct StyleObserver<B: Browser> {
    browser: B,
    element: B::Element,
    property_x: String,
    property_y: String,
}

impl<B: Browser> StyleObserver<B> {
    pub fn new(browser: B, element: B::Element, property_x: String, property_y: String) -> Self {
        Self {
            browser,
            element,
            property_x,
            property_y,
        }
    }
}

impl<B: Browser> AnnotationObserver for StyleObserver<B> {
    fn on_state(&mut self, state: &Annotation) {
        let x = format!("{}px", state.offset.x);
        let y = format!("{}px", state.offset.y);
        self.browser
            .set_style_property(&self.element, &self.property_x, &x);
        self.browser
            .set_style_property(&self.element, &self.property_y, &y);
    }

    fn on_complete(&mut self) {
        self.browser
            .remove_style_property(&self.element, &self.property_x);
        self.browser
            .remove_style_property(&self.element, &self.property_y);
        debug!(element = ?self.element, "Removed annotation style properties");
    }
}

/// Event forwarded by a [`ChannelObserver`]
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEvent {
    State(Annotation),
    Complete,
}

/// Forwards annotation events to a channel, e.g. for a rendering task
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<AnnotationEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<AnnotationEvent>) -> Self {
        Self { tx }
    }

    /// Create an observer together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AnnotationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl AnnotationObserver for ChannelObserver {
    fn on_state(&mut self, state: &Annotation) {
        // Receiver gone means nobody is rendering anymore
        let _ = self.tx.send(AnnotationEvent::State(*state));
    }

    fn on_complete(&mut self) {
        let _ = self.tx.send(AnnotationEvent::Complete);
    }
}

/// Fan-out hub with idempotent completion
#[derive(Default)]
pub(crate) struct Push {
    observers: Vec<Box<dyn AnnotationObserver>>,
    completed: bool,
}

impl Push {
    pub(crate) fn subscribe(&mut self, observer: Box<dyn AnnotationObserver>) {
        self.observers.push(observer);
    }

    pub(crate) fn next(&mut self, state: &Annotation) {
        if self.completed {
            return;
        }
        for observer in &mut self.observers {
            observer.on_state(state);
        }
    }

    pub(crate) fn complete(&mut self) {
        if std::mem::replace(&mut self.completed, true) {
            return;
        }
        for observer in &mut self.observers {
            observer.on_complete();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ElementOffset;
    use crate::dom::VirtualDom;

    fn annotation(active: bool, x: f64, y: f64) -> Annotation {
        Annotation {
            active,
            offset: ElementOffset::new(x, y),
        }
    }

    #[test]
    fn test_style_observer_writes_and_removes() {
        let dom = VirtualDom::new();
        let anchor = dom.create_element("anchor", None);
        let mut observer =
            StyleObserver::new(dom.clone(), anchor, "--x".to_string(), "--y".to_string());

        observer.on_state(&annotation(true, 12.0, -0.5));
        assert_eq!(dom.style_property(anchor, "--x").as_deref(), Some("12px"));
        assert_eq!(dom.style_property(anchor, "--y").as_deref(), Some("-0.5px"));

        observer.on_complete();
        assert_eq!(dom.style_property(anchor, "--x"), None);
        assert_eq!(dom.style_property(anchor, "--y"), None);
    }

    #[test]
    fn test_style_cleanup_without_prior_state() {
        let dom = VirtualDom::new();
        let anchor = dom.create_element("anchor", None);
        let mut observer =
            StyleObserver::new(dom.clone(), anchor, "--x".to_string(), "--y".to_string());
        observer.on_complete();
        assert_eq!(dom.style_property(anchor, "--x"), None);
    }

    #[test]
    fn test_push_completes_once() {
        let (observer, mut rx) = ChannelObserver::channel();
        let mut push = Push::default();
        push.subscribe(Box::new(observer));

        push.next(&annotation(false, 1.0, 2.0));
        push.complete();
        push.complete();
        push.next(&annotation(true, 3.0, 4.0));

        assert_eq!(
            rx.try_recv().unwrap(),
            AnnotationEvent::State(annotation(false, 1.0, 2.0))
        );
        assert_eq!(rx.try_recv().unwrap(), AnnotationEvent::Complete);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_observer_tolerates_closed_receiver() {
        let (mut observer, rx) = ChannelObserver::channel();
        drop(rx);
        observer.on_state(&annotation(true, 0.0, 0.0));
        observer.on_complete();
    }
}
