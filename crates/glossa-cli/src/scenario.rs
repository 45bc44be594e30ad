//! Scenario replay
//!
//! A scenario describes the initial geometry of a code block and a list of
//! user events. Replaying it builds a virtual DOM, mounts the annotation and
//! prints every published record as one JSON line.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use futures::{FutureExt, StreamExt};
use glossa_core::{
    mount_annotation, Annotation, AnnotationConfig, AnnotationElements, AnnotationEvent,
    AnnotationMount, Browser, ChannelObserver, ElementOffset, NodeId, VirtualDom,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Initial anchor position
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AnchorSetup {
    pub x: f64,
    pub y: f64,
}

/// Initial container scroll offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ContainerSetup {
    pub scroll_x: f64,
    pub scroll_y: f64,
}

/// Where a pointer goes down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerTarget {
    /// Dismiss target inside the index (falls back to outside when absent)
    #[default]
    Index,
    /// Somewhere in the code block, away from the index
    Outside,
}

/// Single user event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Focus,
    Blur,
    Scroll { dx: f64, dy: f64 },
    ScrollTo { x: f64, y: f64 },
    Move { x: f64, y: f64 },
    PointerDown {
        #[serde(default)]
        target: PointerTarget,
    },
    Unmount,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Focus => "focus",
            Step::Blur => "blur",
            Step::Scroll { .. } => "scroll",
            Step::ScrollTo { .. } => "scroll_to",
            Step::Move { .. } => "move",
            Step::PointerDown { .. } => "pointer_down",
            Step::Unmount => "unmount",
        }
    }
}

fn default_index_items() -> usize {
    3
}

/// Replayable scenario
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scenario {
    pub anchor: AnchorSetup,
    #[serde(default)]
    pub container: ContainerSetup,
    /// Number of children in the index container
    #[serde(default = "default_index_items")]
    pub index_items: usize,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse a scenario from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse scenario")
    }

    /// Load a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid scenario {}", path.display()))
    }

    /// Focus, scroll, blur, stray click, refocus
    pub fn demo() -> Self {
        Self {
            anchor: AnchorSetup { x: 112.0, y: 50.0 },
            container: ContainerSetup {
                scroll_x: 100.0,
                scroll_y: 16.0,
            },
            index_items: default_index_items(),
            steps: vec![
                Step::Focus,
                Step::Scroll { dx: 0.0, dy: 10.0 },
                Step::Blur,
                Step::PointerDown {
                    target: PointerTarget::Index,
                },
                Step::Focus,
                Step::Move { x: 120.0, y: 50.0 },
                Step::PointerDown {
                    target: PointerTarget::Index,
                },
                Step::Unmount,
            ],
        }
    }
}

/// Style properties of the anchor at the time of a record
#[derive(Debug, Serialize)]
struct StyleSnapshot {
    x: Option<String>,
    y: Option<String>,
}

/// One line of replay output
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Output {
    State {
        step: usize,
        action: &'static str,
        element: String,
        active: bool,
        offset: ElementOffset,
        style: StyleSnapshot,
    },
    Error {
        step: usize,
        action: &'static str,
        message: String,
    },
    Unmounted {
        step: usize,
        style: StyleSnapshot,
    },
}

/// Counters reported after a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Steps applied
    pub steps: usize,
    /// Records published by the mount
    pub records: usize,
    /// States seen by the render task
    pub rendered: usize,
}

/// Virtual document the scenario runs in
struct Stage {
    dom: VirtualDom,
    anchor: NodeId,
    container: NodeId,
    index: NodeId,
    dismiss: Option<NodeId>,
    outside: NodeId,
    config: AnnotationConfig,
}

impl Stage {
    /// `root > [code > [anchor, line], index > item*]`
    fn build(scenario: &Scenario, config: AnnotationConfig) -> Self {
        let dom = VirtualDom::new();
        let root = dom.create_element("root", None);
        let container = dom.create_element("code", Some(root));
        let anchor = dom.create_element("anchor", Some(container));
        let outside = dom.create_element("line", Some(container));
        let index = dom.create_element("index", Some(root));
        for _ in 0..scenario.index_items {
            dom.create_element("item", Some(index));
        }
        dom.set_offset(anchor, scenario.anchor.x, scenario.anchor.y);
        dom.scroll_to(
            container,
            scenario.container.scroll_x,
            scenario.container.scroll_y,
        );
        Self {
            dismiss: dom.query(&index, &config.dismiss_selector),
            dom,
            anchor,
            container,
            index,
            outside,
            config,
        }
    }

    fn elements(&self) -> AnnotationElements<NodeId> {
        AnnotationElements {
            anchor: self.anchor,
            container: self.container,
            index: self.index,
        }
    }

    fn style(&self) -> StyleSnapshot {
        StyleSnapshot {
            x: self.dom.style_property(self.anchor, &self.config.property_x),
            y: self.dom.style_property(self.anchor, &self.config.property_y),
        }
    }

    fn apply(&self, step: &Step) {
        match *step {
            Step::Focus => self.dom.focus(self.anchor),
            Step::Blur => self.dom.blur(self.anchor),
            Step::Scroll { dx, dy } => self.dom.scroll_by(self.container, dx, dy),
            Step::ScrollTo { x, y } => self.dom.scroll_to(self.container, x, y),
            Step::Move { x, y } => self.dom.set_offset(self.anchor, x, y),
            Step::PointerDown { target } => {
                let node = match target {
                    PointerTarget::Index => self.dismiss.unwrap_or(self.outside),
                    PointerTarget::Outside => self.outside,
                };
                self.dom.dispatch_pointer_down(node);
                debug!(element = %node, "Pointer down");
            }
            Step::Unmount => {}
        }
    }
}

/// Emit every record the mount has ready; returns false once it has ended
fn drain<W: Write>(
    mount: &mut AnnotationMount<VirtualDom>,
    stage: &Stage,
    step: usize,
    action: &'static str,
    out: &mut W,
    records: &mut usize,
) -> Result<bool> {
    loop {
        let output = match mount.next().now_or_never() {
            None => return Ok(true),
            Some(None) => return Ok(false),
            Some(Some(Ok(record))) => {
                *records += 1;
                Output::State {
                    step,
                    action,
                    element: record.element.to_string(),
                    active: record.state.active,
                    offset: record.state.offset,
                    style: stage.style(),
                }
            }
            Some(Some(Err(e))) => Output::Error {
                step,
                action,
                message: e.to_string(),
            },
        };
        serde_json::to_writer(&mut *out, &output)?;
        writeln!(out)?;
    }
}

/// Replay a scenario, writing JSON lines to `out`
pub async fn replay<W: Write>(
    scenario: &Scenario,
    config: AnnotationConfig,
    out: &mut W,
) -> Result<ReplaySummary> {
    let stage = Stage::build(scenario, config.clone());

    let (observer, mut rx) = ChannelObserver::channel();
    let renderer = tokio::spawn(async move {
        let mut rendered = 0;
        while let Some(event) = rx.recv().await {
            match event {
                AnnotationEvent::State(Annotation { active, offset }) => {
                    rendered += 1;
                    debug!(active, offset = %offset, "Render annotation");
                }
                AnnotationEvent::Complete => {
                    debug!("Render complete");
                    break;
                }
            }
        }
        rendered
    });

    let mut summary = ReplaySummary::default();
    let mut mount = Some(
        mount_annotation(stage.dom.clone(), stage.elements(), config).with_observer(observer),
    );
    if let Some(m) = mount.as_mut() {
        if !drain(m, &stage, 0, "mount", out, &mut summary.records)? {
            mount = None;
        }
    }

    for (i, step) in scenario.steps.iter().enumerate() {
        let number = i + 1;
        summary.steps += 1;
        stage.apply(step);

        if *step == Step::Unmount {
            if mount.take().is_none() {
                warn!(step = number, "Annotation already unmounted");
            }
            serde_json::to_writer(
                &mut *out,
                &Output::Unmounted {
                    step: number,
                    style: stage.style(),
                },
            )?;
            writeln!(out)?;
            continue;
        }

        match mount.as_mut() {
            Some(m) => {
                if !drain(m, &stage, number, step.name(), out, &mut summary.records)? {
                    info!(step = number, "Annotation ended");
                    mount = None;
                }
            }
            None => warn!(step = number, action = step.name(), "Step after unmount"),
        }
        // Let the render task catch up
        tokio::task::yield_now().await;
    }

    drop(mount);
    summary.rendered = renderer.await.context("Render task failed")?;
    Ok(summary)
}
