//! Browser seam
//!
//! The annotation core never measures anything itself. Geometry, scroll
//! offset, focus and pointer input come from a `Browser` implementation,
//! which is also the target of the style and blur side effects.

use std::fmt;
use std::ops::Sub;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Live value stream from the host
///
/// Yields the current value on subscription, then one item per change.
/// Every value carries the dispatch that produced it.
pub type Watch<T> = BoxStream<'static, Result<Dispatched<T>>>;

/// Value stamped with its position in the host's dispatch order
///
/// Sequence numbers increase across every source of one host, so items
/// from different watches can be merged back into the order the host
/// dispatched them. The current value handed out on subscription keeps the
/// stamp of the dispatch that last changed it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatched<T> {
    pub seq: u64,
    pub value: T,
}

impl<T> Dispatched<T> {
    pub fn new(seq: u64, value: T) -> Self {
        Self { seq, value }
    }
}

/// Element position or scroll offset in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementOffset {
    pub x: f64,
    pub y: f64,
}

impl ElementOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Sub for ElementOffset {
    type Output = ElementOffset;

    fn sub(self, rhs: ElementOffset) -> ElementOffset {
        ElementOffset {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl fmt::Display for ElementOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Pointer event delivered to an armed dismiss detector
pub trait PointerEvent: Send + 'static {
    /// Whether default handling was suppressed during dispatch
    fn default_prevented(&self) -> bool;
}

/// Host environment the annotation runs against
pub trait Browser: Clone + Send + Sync + Unpin + 'static {
    /// Element handle
    type Element: Clone + fmt::Debug + Send + Sync + Unpin + 'static;
    /// Pointer-down event type
    type PointerEvent: PointerEvent;

    /// Watch the element's offset
    fn element_offset(&self, el: &Self::Element) -> Watch<ElementOffset>;

    /// Watch the element's content (scroll) offset
    fn element_content_offset(&self, el: &Self::Element) -> Watch<ElementOffset>;

    /// Watch whether the element holds focus
    fn element_focus(&self, el: &Self::Element) -> Watch<bool>;

    /// Locate a descendant of `root` matching `selector`
    fn query(&self, root: &Self::Element, selector: &str) -> Option<Self::Element>;

    /// Resolve on the next pointer-down on (or inside) the element
    ///
    /// The listener is registered by this call, not by the first poll.
    /// When it fires it suppresses the event's default handling while the
    /// host is still dispatching, then the future resolves with the event.
    /// Dropping the future removes it.
    fn pointer_down(&self, el: &Self::Element) -> BoxFuture<'static, Result<Self::PointerEvent>>;

    /// Set an inline style property
    fn set_style_property(&self, el: &Self::Element, name: &str, value: &str);

    /// Remove an inline style property; a no-op when absent
    fn remove_style_property(&self, el: &Self::Element, name: &str);

    /// Remove focus from the element
    fn blur(&self, el: &Self::Element);
}
