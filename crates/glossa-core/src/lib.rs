//! Glossa Core - Focus and position tracking for inline code annotations
//!
//! This crate provides the reactive core behind code annotation markers:
//! - Offset tracking of an anchor relative to its scrolling container
//! - Focus gating (continuous tracking while open, one snapshot when closed)
//! - Mounting with style side effects, outside-click dismissal and cleanup
//! - A headless virtual DOM implementing the browser seam

pub mod annotation;
pub mod browser;
pub mod config;
pub mod constants;
pub mod dom;
pub mod error;

// Re-exports for convenience
pub use annotation::{
    mount_annotation, watch_annotation, Annotation, AnnotationElements, AnnotationEvent,
    AnnotationMount, AnnotationObserver, ChannelObserver, Component, FocusGate, OffsetTracker,
};
pub use browser::{Browser, Dispatched, ElementOffset, PointerEvent, Watch};
pub use config::AnnotationConfig;
pub use dom::{NodeId, VirtualDom};
pub use error::{AnnotationError, Result};
