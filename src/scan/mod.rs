//! Block discovery and affordance injection.
//!
//! [`ScanPipeline::scan_once`] walks the document for `<pre>` blocks, marks
//! each new one in the [`BlockRegistry`] and only then wraps it and attaches
//! an action button. [`ScanPipeline::start`] keeps doing that for every
//! batch of mutations the document reports until the handle is stopped.
pub mod registry;
pub mod watcher;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::ActionKind;
use crate::config::SurfaceConfig;
use crate::detection::context::block_text;
use crate::detection::language::classify_block;
use crate::detection::shell::is_executable;
use crate::detection::ContentTag;
use crate::document::{Document, DocumentError, NodeId};

pub use registry::BlockRegistry;
pub use watcher::DocumentWatcher;

/// The action control attached to one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Affordance {
    pub block: NodeId,
    pub wrapper: NodeId,
    pub button: NodeId,
    pub content_tag: ContentTag,
    pub action: ActionKind,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// `<pre>` elements seen.
    pub candidates: usize,
    /// Newly processed blocks.
    pub attached: usize,
    pub already_processed: usize,
    /// Blocks inside (or forming part of) the confirmation surface.
    pub excluded: usize,
}

pub struct ScanPipeline {
    surface: SurfaceConfig,
    registry: BlockRegistry,
    affordances: Vec<Affordance>,
    listener: Option<mpsc::UnboundedSender<Affordance>>,
}

impl ScanPipeline {
    pub fn new(surface: SurfaceConfig) -> Self {
        Self {
            surface,
            registry: BlockRegistry::new(),
            affordances: Vec::new(),
            listener: None,
        }
    }

    /// Receive every affordance as it is attached.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Affordance> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listener = Some(tx);
        rx
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// All affordances attached so far, in discovery order.
    pub fn affordances(&self) -> &[Affordance] {
        &self.affordances
    }

    pub fn affordance_for(&self, block: NodeId) -> Option<&Affordance> {
        self.affordances.iter().find(|a| a.block == block)
    }

    fn is_excluded(&self, doc: &Document, block: NodeId) -> bool {
        doc.has_class(block, &self.surface.preview_class)
            || doc
                .closest(block, |el| el.has_class(&self.surface.overlay_class))
                .is_some()
    }

    /// One pass over the document. Blocks are marked before anything is
    /// attached, so the mutations this pass causes never re-select them.
    pub fn scan_once(&mut self, doc: &mut Document) -> ScanReport {
        let mut report = ScanReport::default();

        for block in doc.elements_by_tag("pre") {
            report.candidates += 1;
            if self.is_excluded(doc, block) {
                report.excluded += 1;
                continue;
            }
            if !self.registry.mark(block) {
                report.already_processed += 1;
                continue;
            }
            match self.attach(doc, block) {
                Ok(affordance) => {
                    report.attached += 1;
                    self.affordances.push(affordance);
                    if let Some(tx) = &self.listener {
                        if tx.send(affordance).is_err() {
                            debug!("affordance listener dropped");
                            self.listener = None;
                        }
                    }
                }
                Err(e) => warn!("Failed to attach action to block {block}: {e}"),
            }
        }

        if report.attached > 0 {
            info!(
                "Attached {} new block(s), {} already processed, {} excluded",
                report.attached, report.already_processed, report.excluded
            );
        }
        report
    }

    fn attach(&self, doc: &mut Document, block: NodeId) -> Result<Affordance, DocumentError> {
        let content_tag = classify_block(doc, block);
        let action = if is_executable(&block_text(doc, block), content_tag) {
            ActionKind::Execute
        } else {
            ActionKind::Save
        };

        let wrapper = doc.wrap(block, "div")?;
        doc.set_attr(wrapper, "class", &self.surface.wrapper_class)?;
        // icon only, the label lives in `title`
        let button = doc.append_element(
            wrapper,
            "button",
            &[
                ("class", self.surface.button_class.as_str()),
                ("data-action", action.as_str()),
                ("data-tag", content_tag.extension()),
                ("title", action.label()),
            ],
        )?;

        Ok(Affordance {
            block,
            wrapper,
            button,
            content_tag,
            action,
        })
    }

    /// Scan immediately, then re-scan on every batch of mutations until
    /// stopped. The document must not already have an observer.
    pub async fn start(
        mut self,
        document: Arc<TokioMutex<Document>>,
    ) -> Result<ScanHandle, DocumentError> {
        let mut events = {
            let mut doc = document.lock().await;
            let events = doc.observe()?;
            self.scan_once(&mut doc);
            events
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    event = events.recv() => {
                        let Some(event) = event else { break };
                        let mut batched = 1;
                        while events.try_recv().is_ok() {
                            batched += 1;
                        }
                        debug!("{batched} mutation(s), first on {}", event.target);
                        let mut doc = document.lock().await;
                        self.scan_once(&mut doc);
                    }
                }
            }
            debug!("Scan loop stopped");
            self
        });

        Ok(ScanHandle { token, task })
    }
}

/// Running scan loop; stopping it hands the pipeline back.
pub struct ScanHandle {
    token: CancellationToken,
    task: JoinHandle<ScanPipeline>,
}

impl ScanHandle {
    pub async fn stop(self) -> anyhow::Result<ScanPipeline> {
        self.token.cancel();
        Ok(self.task.await?)
    }
}
