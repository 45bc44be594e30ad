//! Focus gate
//!
//! Two-state machine driven by the anchor's focus:
//! - INACTIVE: one snapshot of the current offset, then idle
//! - ACTIVE: a fresh annotation state on every geometry change
//!
//! Each focus transition drops the running derivation before starting the
//! next one, so at most one geometry subscription is ever live.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tracing::{debug, trace, warn};

use super::offset::{OffsetStream, OffsetTracker};
use super::Annotation;
use crate::browser::{Browser, Dispatched, ElementOffset, Watch};
use crate::error::{AnnotationError, Result};

/// Current derivation, the single replaceable subscription handle
enum Activity {
    /// Snapshot pending, or idle once it has been taken
    Inactive { snapshot: Option<OffsetStream> },
    /// Continuous tracking
    Active { tracking: OffsetStream },
}

impl Activity {
    fn is_idle(&self) -> bool {
        matches!(self, Activity::Inactive { snapshot: None })
    }
}

/// Annotation state stream gated by focus
///
/// Nothing is subscribed until the first poll. Focus transitions and
/// geometry changes are consumed in dispatch order. The first state of a
/// fresh derivation belongs to the transition that started it, so it is
/// delivered before any later focus change.
pub struct FocusGate<B: Browser> {
    browser: B,
    anchor: B::Element,
    tracker: OffsetTracker<B>,
    focus: Option<Watch<bool>>,
    /// Focus change received but not yet applied
    next_focus: Option<Dispatched<bool>>,
    /// Derivation output received but not yet emitted
    next_offset: Option<Dispatched<ElementOffset>>,
    /// No state emitted since the last transition
    fresh: bool,
    activity: Activity,
    focus_done: bool,
    terminated: bool,
}

impl<B: Browser> FocusGate<B> {
    pub fn new(browser: B, anchor: B::Element, container: B::Element) -> Self {
        let tracker = OffsetTracker::new(browser.clone(), anchor.clone(), container);
        Self {
            browser,
            anchor,
            tracker,
            focus: None,
            next_focus: None,
            next_offset: None,
            fresh: false,
            activity: Activity::Inactive { snapshot: None },
            focus_done: false,
            terminated: false,
        }
    }

    /// Whether the gate is currently tracking continuously
    pub fn is_active(&self) -> bool {
        matches!(self.activity, Activity::Active { .. })
    }

    /// Replace the running derivation for a new focus value
    fn transition(&mut self, active: bool) {
        // Cancel before starting the next one
        self.activity = Activity::Inactive { snapshot: None };
        self.next_offset = None;
        self.fresh = true;
        let offsets = self.tracker.start();
        self.activity = if active {
            debug!(anchor = ?self.anchor, "Annotation activated");
            Activity::Active { tracking: offsets }
        } else {
            debug!(anchor = ?self.anchor, "Annotation deactivated");
            Activity::Inactive {
                snapshot: Some(offsets),
            }
        };
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.focus = None;
        self.next_focus = None;
        self.next_offset = None;
        self.activity = Activity::Inactive { snapshot: None };
    }

    fn fail(
        &mut self,
        error: AnnotationError,
        source: &'static str,
    ) -> Poll<Option<Result<Annotation>>> {
        warn!(anchor = ?self.anchor, error = %error, source, "Annotation source failed");
        self.terminate();
        Poll::Ready(Some(Err(error)))
    }

    /// Fetch the next focus change unless one is already waiting
    fn poll_focus(&mut self, cx: &mut Context<'_>) -> Result<()> {
        if self.next_focus.is_some() {
            return Ok(());
        }
        let Some(focus) = self.focus.as_mut() else {
            return Ok(());
        };
        match focus.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(change))) => self.next_focus = Some(change),
            Poll::Ready(Some(Err(e))) => return Err(e),
            Poll::Ready(None) => {
                self.focus = None;
                self.focus_done = true;
            }
            Poll::Pending => {}
        }
        Ok(())
    }

    /// Fetch the next output of the running derivation
    ///
    /// A derivation that ends leaves the gate idle.
    fn poll_activity(&mut self, cx: &mut Context<'_>) -> Result<()> {
        if self.next_offset.is_some() {
            return Ok(());
        }
        let offsets = match &mut self.activity {
            Activity::Inactive { snapshot: None } => return Ok(()),
            Activity::Inactive {
                snapshot: Some(offsets),
            } => offsets,
            Activity::Active { tracking } => tracking,
        };
        match offsets.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(offset))) => self.next_offset = Some(offset),
            Poll::Ready(Some(Err(e))) => return Err(e),
            Poll::Ready(None) => self.activity = Activity::Inactive { snapshot: None },
            Poll::Pending => {}
        }
        Ok(())
    }

    /// Whether the waiting derivation output goes out before the waiting
    /// focus change
    fn offset_first(&self) -> bool {
        match (&self.next_offset, &self.next_focus) {
            (Some(_), None) => true,
            (Some(offset), Some(focus)) => self.fresh || offset.seq < focus.seq,
            (None, _) => false,
        }
    }

    fn emit(&mut self) -> Option<Annotation> {
        let offset = self.next_offset.take()?.value;
        let active = self.is_active();
        if !active {
            // Snapshot taken, nothing more while inactive
            self.activity = Activity::Inactive { snapshot: None };
        }
        self.fresh = false;
        trace!(active, x = offset.x, y = offset.y, "Annotation state");
        Some(Annotation { active, offset })
    }
}

impl<B: Browser> Stream for FocusGate<B> {
    type Item = Result<Annotation>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.terminated {
            return Poll::Ready(None);
        }
        if this.focus.is_none() && !this.focus_done {
            this.focus = Some(this.browser.element_focus(&this.anchor));
        }

        loop {
            if let Err(e) = this.poll_focus(cx) {
                return this.fail(e, "focus");
            }
            if let Err(e) = this.poll_activity(cx) {
                return this.fail(e, "geometry");
            }

            if this.offset_first() {
                if let Some(state) = this.emit() {
                    return Poll::Ready(Some(Ok(state)));
                }
            }
            if let Some(change) = this.next_focus.take() {
                this.transition(change.value);
                continue;
            }

            if this.focus_done && this.activity.is_idle() {
                debug!(anchor = ?this.anchor, "Focus source completed");
                this.terminate();
                return Poll::Ready(None);
            }
            return Poll::Pending;
        }
    }
}
