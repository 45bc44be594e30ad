//! Offset tracking
//!
//! Derives the anchor's offset relative to its scrolling container:
//! `anchor_offset - container_scroll_offset`, recomputed once per change of
//! either source.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tracing::trace;

use crate::browser::{Browser, Dispatched, ElementOffset, Watch};
use crate::error::{AnnotationError, Result};

/// Factory for relative offset streams
///
/// Construction is cheap and subscribes to nothing; geometry is only read
/// once [`OffsetTracker::start`] is called. Every start re-reads current
/// geometry.
pub struct OffsetTracker<B: Browser> {
    browser: B,
    anchor: B::Element,
    container: B::Element,
}

impl<B: Browser> OffsetTracker<B> {
    pub fn new(browser: B, anchor: B::Element, container: B::Element) -> Self {
        Self {
            browser,
            anchor,
            container,
        }
    }

    /// Open both geometry sources and combine them
    pub fn start(&self) -> OffsetStream {
        trace!(anchor = ?self.anchor, container = ?self.container, "Starting offset tracking");
        OffsetStream::new(
            self.browser.element_offset(&self.anchor),
            self.browser.element_content_offset(&self.container),
        )
    }
}

/// One side of the combination
struct Source {
    watch: Watch<ElementOffset>,
    /// Received but not yet applied
    next: Option<Dispatched<ElementOffset>>,
    latest: Option<ElementOffset>,
    done: bool,
}

impl Source {
    fn new(watch: Watch<ElementOffset>) -> Self {
        Self {
            watch,
            next: None,
            latest: None,
            done: false,
        }
    }

    /// Sequence of the next unapplied item, fetching one if needed
    fn poll_peek(&mut self, cx: &mut Context<'_>) -> Result<Option<u64>> {
        if self.next.is_none() && !self.done {
            match self.watch.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(item))) => self.next = Some(item),
                Poll::Ready(Some(Err(e))) => return Err(e),
                Poll::Ready(None) => self.done = true,
                Poll::Pending => {}
            }
        }
        Ok(self.next.as_ref().map(|item| item.seq))
    }

    fn apply(&mut self) -> Option<u64> {
        let item = self.next.take()?;
        self.latest = Some(item.value);
        Some(item.seq)
    }

    fn drained(&self) -> bool {
        self.done && self.next.is_none()
    }

    /// Ended without ever reporting, so nothing can be combined anymore
    fn exhausted(&self) -> bool {
        self.drained() && self.latest.is_none()
    }
}

/// Relative offset of the anchor, one item per geometry change
///
/// Changes from both sources are applied in dispatch order, and each item
/// carries the sequence of the change that produced it. Emits nothing until
/// both sources have reported. Completes when both sources complete, or
/// when one completes without having reported. The first source error is
/// yielded and ends the stream.
pub struct OffsetStream {
    anchor: Source,
    scroll: Source,
    terminated: bool,
}

impl OffsetStream {
    pub fn new(anchor: Watch<ElementOffset>, scroll: Watch<ElementOffset>) -> Self {
        Self {
            anchor: Source::new(anchor),
            scroll: Source::new(scroll),
            terminated: false,
        }
    }

    fn relative(&self) -> Option<ElementOffset> {
        Some(self.anchor.latest? - self.scroll.latest?)
    }

    fn complete(&self) -> bool {
        (self.anchor.drained() && self.scroll.drained())
            || self.anchor.exhausted()
            || self.scroll.exhausted()
    }

    fn fail(
        &mut self,
        error: AnnotationError,
    ) -> Poll<Option<Result<Dispatched<ElementOffset>>>> {
        self.terminated = true;
        Poll::Ready(Some(Err(error)))
    }
}

impl Stream for OffsetStream {
    type Item = Result<Dispatched<ElementOffset>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.terminated {
            return Poll::Ready(None);
        }

        loop {
            let anchor = match this.anchor.poll_peek(cx) {
                Ok(seq) => seq,
                Err(e) => return this.fail(e),
            };
            let scroll = match this.scroll.poll_peek(cx) {
                Ok(seq) => seq,
                Err(e) => return this.fail(e),
            };
            if this.complete() {
                this.terminated = true;
                return Poll::Ready(None);
            }

            // Earliest dispatch first, anchor wins ties
            let applied = match (anchor, scroll) {
                (Some(a), Some(s)) if s < a => this.scroll.apply(),
                (Some(_), _) => this.anchor.apply(),
                (None, Some(_)) => this.scroll.apply(),
                (None, None) => return Poll::Pending,
            };

            if let (Some(seq), Some(offset)) = (applied, this.relative()) {
                trace!(seq, x = offset.x, y = offset.y, "Offset changed");
                return Poll::Ready(Some(Ok(Dispatched::new(seq, offset))));
            }
        }
    }
}
