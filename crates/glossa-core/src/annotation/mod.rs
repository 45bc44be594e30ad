//! Code annotations
//!
//! An annotation marker (the anchor) sits inside a scrolling code block.
//! While it holds focus its offset relative to the code block is tracked
//! continuously; when it loses focus a single final state is produced.
//!
//! - [`watch_annotation`] yields the raw focus-gated state
//! - [`mount_annotation`] adds style side effects, outside-click dismissal
//!   and teardown

mod focus;
mod mount;
mod observer;
mod offset;

use serde::{Deserialize, Serialize};

use crate::browser::{Browser, ElementOffset};

pub use focus::FocusGate;
pub use mount::{mount_annotation, AnnotationElements, AnnotationMount};
pub use observer::{AnnotationEvent, AnnotationObserver, ChannelObserver, StyleObserver};
pub use offset::{OffsetStream, OffsetTracker};

/// Code annotation state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation is open (anchor holds focus)
    pub active: bool,
    /// Anchor offset relative to the container's scroll position
    pub offset: ElementOffset,
}

/// Published state together with the element it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Component<E, T> {
    pub element: E,
    pub state: T,
}

/// Watch an annotation anchored in `container`
pub fn watch_annotation<B: Browser>(
    browser: B,
    anchor: B::Element,
    container: B::Element,
) -> FocusGate<B> {
    FocusGate::new(browser, anchor, container)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::PointerEvent;
    use crate::config::AnnotationConfig;
    use crate::dom::VirtualDom;
    use futures::{FutureExt, StreamExt};

    fn annotation(active: bool, x: f64, y: f64) -> Annotation {
        Annotation {
            active,
            offset: ElementOffset::new(x, y),
        }
    }

    #[test]
    fn test_annotation_serializes() {
        let value = toml::to_string(&annotation(true, 12.0, 34.0)).unwrap();
        assert!(value.contains("active = true"));
        let parsed: Annotation = toml::from_str(&value).unwrap();
        assert_eq!(parsed, annotation(true, 12.0, 34.0));
    }

    #[tokio::test]
    async fn test_watch_annotation_follows_focus() {
        let dom = VirtualDom::new();
        let code = dom.create_element("code", None);
        let anchor = dom.create_element("anchor", Some(code));
        dom.set_offset(anchor, 30.0, 40.0);

        let mut states = watch_annotation(dom.clone(), anchor, code);
        assert_eq!(states.next().await, Some(Ok(annotation(false, 30.0, 40.0))));
        dom.focus(anchor);
        assert_eq!(states.next().await, Some(Ok(annotation(true, 30.0, 40.0))));
    }

    /// Focus, scroll, blur, stray click, refocus
    #[tokio::test]
    async fn test_full_annotation_lifecycle() {
        let dom = VirtualDom::new();
        let root = dom.create_element("root", None);
        let code = dom.create_element("code", Some(root));
        let anchor = dom.create_element("anchor", Some(code));
        let index = dom.create_element("index", Some(root));
        let item = dom.create_element("item", Some(index));
        dom.set_offset(anchor, 112.0, 50.0);
        dom.scroll_to(code, 100.0, 16.0);

        let elements = AnnotationElements {
            anchor,
            container: code,
            index,
        };
        let mut mount = mount_annotation(dom.clone(), elements, AnnotationConfig::default());
        let state = |record: Option<crate::Result<Component<_, Annotation>>>| {
            record.map(|r| r.map(|c| c.state))
        };

        // Mounted while unfocused
        assert_eq!(state(mount.next().await), Some(Ok(annotation(false, 12.0, 34.0))));

        // t0: focus
        dom.focus(anchor);
        assert_eq!(state(mount.next().await), Some(Ok(annotation(true, 12.0, 34.0))));

        // t1: container scrolls
        dom.scroll_by(code, 0.0, 10.0);
        assert_eq!(state(mount.next().await), Some(Ok(annotation(true, 12.0, 24.0))));
        assert_eq!(dom.style_property(anchor, "--md-tooltip-y").as_deref(), Some("24px"));

        // t2: focus lost, exactly one snapshot
        dom.blur(anchor);
        assert_eq!(state(mount.next().await), Some(Ok(annotation(false, 12.0, 24.0))));
        dom.scroll_by(code, 0.0, 10.0);
        assert!(mount.next().now_or_never().is_none());

        // t3: pointer-down while inactive
        let event = dom.dispatch_pointer_down(item);
        assert!(!event.default_prevented());
        assert!(mount.next().now_or_never().is_none());

        // t4: focus regained, tracking resumes from current geometry
        dom.focus(anchor);
        assert_eq!(state(mount.next().await), Some(Ok(annotation(true, 12.0, 14.0))));
        dom.set_offset(anchor, 112.0, 60.0);
        assert_eq!(state(mount.next().await), Some(Ok(annotation(true, 12.0, 24.0))));

        // Outside click closes it
        let event = dom.dispatch_pointer_down(item);
        assert!(event.default_prevented());
        assert_eq!(state(mount.next().await), Some(Ok(annotation(false, 12.0, 24.0))));

        // Teardown
        drop(mount);
        assert_eq!(dom.style_property(anchor, "--md-tooltip-x"), None);
        assert_eq!(dom.style_property(anchor, "--md-tooltip-y"), None);
    }
}
