//! Annotation mounting
//!
//! Turns the focus-gated state stream into side effects:
//! - style properties on the anchor, removed when the mount ends
//! - a one-shot outside-click dismissal, armed only while active
//! - the published `{ element, active, offset }` records

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use tracing::{debug, warn};

use super::focus::FocusGate;
use super::observer::{AnnotationObserver, Push, StyleObserver};
use super::{Annotation, Component};
use crate::browser::{Browser, PointerEvent};
use crate::config::AnnotationConfig;
use crate::error::{AnnotationError, Result};

/// Elements an annotation is mounted on
#[derive(Debug, Clone)]
pub struct AnnotationElements<E> {
    /// Focusable marker inside the code block
    pub anchor: E,
    /// Scrolling code block containing the anchor
    pub container: E,
    /// Container the dismiss target is looked up in
    pub index: E,
}

/// Mounted annotation, a stream of published records
///
/// Nothing is measured or armed until the first poll. Dropping a started
/// mount tears it down: observers complete and the arm is released.
pub struct AnnotationMount<B: Browser> {
    browser: B,
    elements: AnnotationElements<B::Element>,
    dismiss_selector: String,
    gate: Option<FocusGate<B>>,
    push: Push,
    dismiss_target: Option<B::Element>,
    arm: Option<BoxFuture<'static, Result<B::PointerEvent>>>,
    started: bool,
    terminated: bool,
}

/// Mount an annotation
pub fn mount_annotation<B: Browser>(
    browser: B,
    elements: AnnotationElements<B::Element>,
    config: AnnotationConfig,
) -> AnnotationMount<B> {
    let gate = FocusGate::new(
        browser.clone(),
        elements.anchor.clone(),
        elements.container.clone(),
    );
    let mut push = Push::default();
    push.subscribe(Box::new(StyleObserver::new(
        browser.clone(),
        elements.anchor.clone(),
        config.property_x,
        config.property_y,
    )));

    AnnotationMount {
        browser,
        elements,
        dismiss_selector: config.dismiss_selector,
        gate: Some(gate),
        push,
        dismiss_target: None,
        arm: None,
        started: false,
        terminated: false,
    }
}

impl<B: Browser> AnnotationMount<B> {
    /// Add a side-effect consumer
    pub fn with_observer(mut self, observer: impl AnnotationObserver + 'static) -> Self {
        self.push.subscribe(Box::new(observer));
        self
    }

    /// Element the annotation is anchored on
    pub fn anchor(&self) -> &B::Element {
        &self.elements.anchor
    }

    /// Whether an outside-click dismissal is currently armed
    pub fn is_armed(&self) -> bool {
        self.arm.is_some()
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        let target = self
            .browser
            .query(&self.elements.index, &self.dismiss_selector)
            .ok_or_else(|| AnnotationError::ElementNotFound(self.dismiss_selector.clone()))?;
        debug!(anchor = ?self.elements.anchor, dismiss = ?target, "Mounting annotation");
        self.dismiss_target = Some(target);
        Ok(())
    }

    /// Replace the dismiss arm for the latest state
    fn rearm(&mut self, active: bool) {
        self.arm = None;
        if !active {
            return;
        }
        if let Some(target) = &self.dismiss_target {
            debug!(anchor = ?self.elements.anchor, dismiss = ?target, "Arming dismiss");
            self.arm = Some(self.browser.pointer_down(target));
        }
    }

    fn dismiss(&mut self, event: B::PointerEvent) {
        debug!(
            anchor = ?self.elements.anchor,
            prevented = event.default_prevented(),
            "Dismissing annotation"
        );
        self.browser.blur(&self.elements.anchor);
    }

    /// Single teardown point, safe to call repeatedly
    fn finalize(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        self.arm = None;
        self.gate = None;
        self.push.complete();
        debug!(anchor = ?self.elements.anchor, "Annotation unmounted");
    }

    fn fail(
        &mut self,
        error: AnnotationError,
    ) -> Poll<Option<Result<Component<B::Element, Annotation>>>> {
        warn!(anchor = ?self.elements.anchor, error = %error, "Annotation failed");
        self.finalize();
        Poll::Ready(Some(Err(error)))
    }
}

impl<B: Browser> Stream for AnnotationMount<B> {
    type Item = Result<Component<B::Element, Annotation>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.terminated {
            return Poll::Ready(None);
        }
        if !this.started {
            if let Err(e) = this.start() {
                return this.fail(e);
            }
        }

        // Arm first, so the focus-out it causes is seen in this turn
        if let Some(arm) = this.arm.as_mut() {
            if let Poll::Ready(result) = arm.poll_unpin(cx) {
                this.arm = None;
                match result {
                    Ok(event) => this.dismiss(event),
                    Err(e) => return this.fail(e),
                }
            }
        }

        let Some(gate) = this.gate.as_mut() else {
            return Poll::Ready(None);
        };
        match gate.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(state))) => {
                this.push.next(&state);
                this.rearm(state.active);
                Poll::Ready(Some(Ok(Component {
                    element: this.elements.anchor.clone(),
                    state,
                })))
            }
            Poll::Ready(Some(Err(e))) => this.fail(e),
            Poll::Ready(None) => {
                this.finalize();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<B: Browser> Drop for AnnotationMount<B> {
    fn drop(&mut self) {
        if self.started {
            self.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationEvent, ChannelObserver};
    use crate::browser::ElementOffset;
    use crate::dom::{NodeId, VirtualDom};

    struct Fixture {
        dom: VirtualDom,
        elements: AnnotationElements<NodeId>,
        item: NodeId,
        outside: NodeId,
    }

    fn fixture() -> Fixture {
        let dom = VirtualDom::new();
        let root = dom.create_element("root", None);
        let code = dom.create_element("code", Some(root));
        let anchor = dom.create_element("anchor", Some(code));
        let outside = dom.create_element("line", Some(code));
        let index = dom.create_element("index", Some(root));
        dom.create_element("item", Some(index));
        let item = dom.create_element("item", Some(index));
        dom.set_offset(anchor, 112.0, 50.0);
        dom.scroll_to(code, 100.0, 16.0);
        Fixture {
            dom,
            elements: AnnotationElements {
                anchor,
                container: code,
                index,
            },
            item,
            outside,
        }
    }

    fn mount(f: &Fixture) -> AnnotationMount<VirtualDom> {
        mount_annotation(f.dom.clone(), f.elements.clone(), AnnotationConfig::default())
    }

    fn style(f: &Fixture) -> (Option<String>, Option<String>) {
        (
            f.dom.style_property(f.elements.anchor, "--md-tooltip-x"),
            f.dom.style_property(f.elements.anchor, "--md-tooltip-y"),
        )
    }

    fn px(x: &str, y: &str) -> (Option<String>, Option<String>) {
        (Some(x.to_string()), Some(y.to_string()))
    }

    #[tokio::test]
    async fn test_publishes_records_with_element() {
        let f = fixture();
        let mut mount = mount(&f);

        let record = mount.next().await.unwrap().unwrap();
        assert_eq!(record.element, f.elements.anchor);
        assert!(!record.state.active);
        assert_eq!(record.state.offset, ElementOffset::new(12.0, 34.0));
        assert_eq!(style(&f), px("12px", "34px"));
    }

    #[test]
    fn test_nothing_happens_before_first_poll() {
        let f = fixture();
        let mount = mount(&f);
        assert_eq!(f.dom.focus_watchers(f.elements.anchor), 0);
        assert_eq!(style(&f), (None, None));
        drop(mount);
        assert_eq!(style(&f), (None, None));
    }

    #[tokio::test]
    async fn test_styles_follow_active_tracking() {
        let f = fixture();
        let mut mount = mount(&f);
        mount.next().await;

        f.dom.focus(f.elements.anchor);
        mount.next().await;
        f.dom.scroll_by(f.elements.container, 0.0, 10.0);
        let record = mount.next().await.unwrap().unwrap();
        assert!(record.state.active);
        assert_eq!(style(&f), px("12px", "24px"));
    }

    #[tokio::test]
    async fn test_drop_while_active_removes_styles() {
        let f = fixture();
        f.dom.focus(f.elements.anchor);
        let mut mount = mount(&f);
        mount.next().await;
        assert_eq!(style(&f), px("12px", "34px"));
        assert!(mount.is_armed());

        drop(mount);
        assert_eq!(style(&f), (None, None));
        assert_eq!(f.dom.pointer_listeners(f.item), 0);
        assert_eq!(f.dom.offset_watchers(f.elements.anchor), 0);
    }

    #[tokio::test]
    async fn test_drop_while_inactive_removes_styles() {
        let f = fixture();
        let mut mount = mount(&f);
        mount.next().await;
        drop(mount);
        assert_eq!(style(&f), (None, None));
    }

    #[tokio::test]
    async fn test_pointer_down_while_active_dismisses() {
        let f = fixture();
        f.dom.focus(f.elements.anchor);
        let mut mount = mount(&f);
        assert!(mount.next().await.unwrap().unwrap().state.active);

        let event = f.dom.dispatch_pointer_down(f.item);
        // Suppressed during dispatch, before the mount runs again
        assert!(event.default_prevented());
        assert_eq!(f.dom.focused(), Some(f.elements.anchor));

        let record = mount.next().await.unwrap().unwrap();
        assert!(!record.state.active);
        assert_eq!(f.dom.focused(), None);
        assert!(!mount.is_armed());

        // Arm is gone while inactive
        let stray = f.dom.dispatch_pointer_down(f.item);
        assert!(!stray.default_prevented());
        assert!(mount.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_pointer_down_while_inactive_is_ignored() {
        let f = fixture();
        let mut mount = mount(&f);
        mount.next().await;
        assert!(!mount.is_armed());

        let event = f.dom.dispatch_pointer_down(f.item);
        assert!(!event.default_prevented());
        assert!(mount.next().now_or_never().is_none());
        assert_eq!(style(&f), px("12px", "34px"));
    }

    #[tokio::test]
    async fn test_pointer_down_outside_target_is_ignored() {
        let f = fixture();
        f.dom.focus(f.elements.anchor);
        let mut mount = mount(&f);
        mount.next().await;

        let event = f.dom.dispatch_pointer_down(f.outside);
        assert!(!event.default_prevented());
        assert!(mount.next().now_or_never().is_none());
        assert_eq!(f.dom.focused(), Some(f.elements.anchor));
    }

    #[tokio::test]
    async fn test_single_arm_while_tracking() {
        let f = fixture();
        f.dom.focus(f.elements.anchor);
        let mut mount = mount(&f);
        mount.next().await;
        for _ in 0..3 {
            f.dom.scroll_by(f.elements.container, 1.0, 0.0);
            mount.next().await;
        }
        assert_eq!(f.dom.pointer_listeners(f.item), 1);
    }

    #[tokio::test]
    async fn test_missing_dismiss_target_fails_mount() {
        let f = fixture();
        let config = AnnotationConfig {
            dismiss_selector: "#nowhere".to_string(),
            ..AnnotationConfig::default()
        };
        let mut mount = mount_annotation(f.dom.clone(), f.elements.clone(), config);

        assert_eq!(
            mount.next().await.unwrap().unwrap_err(),
            AnnotationError::ElementNotFound("#nowhere".into())
        );
        assert!(mount.next().await.is_none());
        assert_eq!(style(&f), (None, None));
    }

    #[tokio::test]
    async fn test_upstream_failure_cleans_up_once() {
        let f = fixture();
        let (observer, mut rx) = ChannelObserver::channel();
        f.dom.focus(f.elements.anchor);
        let mut mount = mount(&f).with_observer(observer);
        mount.next().await;

        f.dom.fail_offset(f.elements.anchor, "gone");
        assert_eq!(
            mount.next().await.unwrap().unwrap_err(),
            AnnotationError::Offset("gone".into())
        );
        assert_eq!(style(&f), (None, None));
        assert!(mount.next().await.is_none());
        assert_eq!(f.dom.pointer_listeners(f.item), 0);
        drop(mount);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                AnnotationEvent::State(Annotation {
                    active: true,
                    offset: ElementOffset::new(12.0, 34.0),
                }),
                AnnotationEvent::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_custom_property_names() {
        let f = fixture();
        let config = AnnotationConfig {
            property_x: "--note-x".to_string(),
            property_y: "--note-y".to_string(),
            ..AnnotationConfig::default()
        };
        let mut mount = mount_annotation(f.dom.clone(), f.elements.clone(), config);
        mount.next().await;

        assert_eq!(
            f.dom.style_property(f.elements.anchor, "--note-x").as_deref(),
            Some("12px")
        );
        assert_eq!(style(&f), (None, None));
    }
}
