//! From an attached affordance to exactly one external request.
//!
//! The [`Activator`] reads the block and its context out of the document,
//! runs filename inference, hands the guess to a [`ConfirmationSurface`] and,
//! only on an explicit matching acceptance, calls the [`ActionBackend`].
pub mod terminal;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ContextConfig, ExecuteConfig};
use crate::detection::context::block_text;
use crate::detection::{BlockContext, ContentTag, DetectionResult, FilenameInference};
use crate::document::{Document, NodeId};
use crate::host::protocol::{ExecuteResponse, SaveResponse};
use crate::scan::{Affordance, ScanPipeline};

pub use terminal::TerminalSurface;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("No action is attached to block {0}")]
    UnknownBlock(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Save,
    Execute,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Save => "save",
            ActionKind::Execute => "execute",
        }
    }

    /// Human-facing label of the affordance button.
    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Save => "Save to project",
            ActionKind::Execute => "Run script",
        }
    }
}

/// Everything the confirmation step gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRequest {
    pub block: NodeId,
    pub kind: ActionKind,
    pub content: String,
    pub content_tag: ContentTag,
    pub detection: DetectionResult,
}

/// What the human accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Absolute destination path.
    Save { path: String },
    Execute {
        command: String,
        working_dir: String,
        timeout_secs: u64,
    },
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Cancelled,
    Saved(SaveResponse),
    Executed(ExecuteResponse),
}

pub trait ConfirmationSurface {
    fn confirm(&self, request: &ActionRequest) -> impl Future<Output = Decision> + Send;
}

/// The process that writes files and runs commands. Exactly one response per
/// call; failures come back inside the response.
pub trait ActionBackend {
    fn save(&self, path: &str, content: &str) -> impl Future<Output = SaveResponse> + Send;

    fn execute(
        &self,
        command: &str,
        working_dir: &str,
        timeout_secs: u64,
    ) -> impl Future<Output = ExecuteResponse> + Send;
}

/// `root` without trailing slashes joined to `relative` without leading ones.
pub fn join_root(root: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        root.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// Build the request for an attached affordance. Inference happens here, on
/// activation, not when the block was discovered.
pub fn prepare_request(
    doc: &Document,
    affordance: &Affordance,
    inference: &FilenameInference,
    limits: &ContextConfig,
) -> ActionRequest {
    let content = block_text(doc, affordance.block);
    let context = BlockContext::collect(doc, affordance.block, limits);
    let detection = inference.infer(&content, &context, affordance.content_tag);
    ActionRequest {
        block: affordance.block,
        kind: affordance.action,
        content,
        content_tag: affordance.content_tag,
        detection,
    }
}

pub struct Activator<C, B> {
    surface: C,
    backend: B,
    inference: FilenameInference,
    context: ContextConfig,
    execute: ExecuteConfig,
}

impl<C, B> Activator<C, B>
where
    C: ConfirmationSurface,
    B: ActionBackend,
{
    pub fn new(surface: C, backend: B) -> Self {
        Self {
            surface,
            backend,
            inference: FilenameInference::default(),
            context: ContextConfig::default(),
            execute: ExecuteConfig::default(),
        }
    }

    pub fn with_inference(mut self, inference: FilenameInference) -> Self {
        self.inference = inference;
        self
    }

    pub fn with_limits(mut self, context: ContextConfig, execute: ExecuteConfig) -> Self {
        self.context = context;
        self.execute = execute;
        self
    }

    pub fn prepare(&self, doc: &Document, affordance: &Affordance) -> ActionRequest {
        prepare_request(doc, affordance, &self.inference, &self.context)
    }

    /// Like [`Activator::prepare`], looking the affordance up by block id.
    pub fn prepare_block(
        &self,
        doc: &Document,
        pipeline: &ScanPipeline,
        block: NodeId,
    ) -> Result<ActionRequest, ActionError> {
        let affordance = pipeline
            .affordance_for(block)
            .ok_or(ActionError::UnknownBlock(block))?;
        Ok(self.prepare(doc, affordance))
    }

    /// Confirm, then issue at most one request. A decision for the other
    /// kind of action counts as a cancellation.
    pub async fn dispatch(&self, request: &ActionRequest) -> ActionOutcome {
        let decision = self.surface.confirm(request).await;
        match (request.kind, decision) {
            (ActionKind::Save, Decision::Save { path }) => {
                info!("Saving block {} to {path}", request.block);
                ActionOutcome::Saved(self.backend.save(&path, &request.content).await)
            }
            (
                ActionKind::Execute,
                Decision::Execute {
                    command,
                    working_dir,
                    timeout_secs,
                },
            ) => {
                let timeout_secs = self.execute.clamp_timeout(timeout_secs);
                info!("Running block {} in {working_dir} ({timeout_secs}s)", request.block);
                ActionOutcome::Executed(
                    self.backend
                        .execute(&command, &working_dir, timeout_secs)
                        .await,
                )
            }
            (_, Decision::Cancel) => ActionOutcome::Cancelled,
            (kind, other) => {
                debug!("Ignoring {other:?} for a {} action", kind.as_str());
                ActionOutcome::Cancelled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurfaceConfig;
    use crate::detection::DetectionSource;
    use std::sync::Mutex;

    struct Scripted(Decision);

    impl ConfirmationSurface for Scripted {
        async fn confirm(&self, _request: &ActionRequest) -> Decision {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl ActionBackend for &Recorder {
        async fn save(&self, path: &str, content: &str) -> SaveResponse {
            self.calls.lock().unwrap().push(format!("save {path} {content}"));
            SaveResponse::saved(path)
        }

        async fn execute(&self, command: &str, working_dir: &str, timeout_secs: u64) -> ExecuteResponse {
            self.calls
                .lock()
                .unwrap()
                .push(format!("execute {command} {working_dir} {timeout_secs}"));
            ExecuteResponse::failed("not really")
        }
    }

    const TRANSCRIPT: &str = r#"
        <p>Save this as <code>notes/todo.md</code></p>
        <pre><code class="language-md">- [ ] milk</code></pre>
        <pre><code class="language-sh">echo hi</code></pre>
    "#;

    fn scanned() -> (Document, ScanPipeline) {
        let mut doc = Document::parse_html(TRANSCRIPT);
        let mut pipeline = ScanPipeline::new(SurfaceConfig::default());
        pipeline.scan_once(&mut doc);
        (doc, pipeline)
    }

    #[test]
    fn test_join_root() {
        assert_eq!(join_root("/home/me/proj/", "/src/main.rs"), "/home/me/proj/src/main.rs");
        assert_eq!(join_root("/home/me/proj", "notes/todo.md"), "/home/me/proj/notes/todo.md");
    }

    #[test]
    fn test_prepare_runs_inference_on_activation() {
        let (doc, pipeline) = scanned();
        let recorder = Recorder::default();
        let activator = Activator::new(Scripted(Decision::Cancel), &recorder);
        let save = pipeline.affordances()[0];
        let request = activator.prepare_block(&doc, &pipeline, save.block).unwrap();

        assert_eq!(request.kind, ActionKind::Save);
        assert_eq!(request.content, "- [ ] milk");
        assert_eq!(request.detection.filename, "notes/todo.md");
        assert_eq!(request.detection.source, DetectionSource::Context);
    }

    #[test]
    fn test_prepare_unknown_block() {
        let (doc, pipeline) = scanned();
        let recorder = Recorder::default();
        let activator = Activator::new(Scripted(Decision::Cancel), &recorder);
        assert_eq!(
            activator.prepare_block(&doc, &pipeline, doc.body()),
            Err(ActionError::UnknownBlock(doc.body()))
        );
    }

    #[tokio::test]
    async fn test_accepted_save_issues_one_request() {
        let (doc, pipeline) = scanned();
        let recorder = Recorder::default();
        let activator = Activator::new(
            Scripted(Decision::Save {
                path: "/p/notes/todo.md".into(),
            }),
            &recorder,
        );
        let request = activator.prepare(&doc, &pipeline.affordances()[0]);

        let outcome = activator.dispatch(&request).await;
        assert_eq!(outcome, ActionOutcome::Saved(SaveResponse::saved("/p/notes/todo.md")));
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["save /p/notes/todo.md - [ ] milk"]);
    }

    #[tokio::test]
    async fn test_cancel_and_mismatch_do_nothing() {
        let (doc, pipeline) = scanned();
        let recorder = Recorder::default();
        let save_request = {
            let activator = Activator::new(Scripted(Decision::Cancel), &recorder);
            let request = activator.prepare(&doc, &pipeline.affordances()[0]);
            assert_eq!(activator.dispatch(&request).await, ActionOutcome::Cancelled);
            request
        };

        let mismatched = Activator::new(
            Scripted(Decision::Execute {
                command: "rm -rf /".into(),
                working_dir: "/".into(),
                timeout_secs: 30,
            }),
            &recorder,
        );
        assert_eq!(mismatched.dispatch(&save_request).await, ActionOutcome::Cancelled);
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_timeout_is_clamped() {
        let (doc, pipeline) = scanned();
        let recorder = Recorder::default();
        let activator = Activator::new(
            Scripted(Decision::Execute {
                command: "echo hi".into(),
                working_dir: "/tmp".into(),
                timeout_secs: 9_999,
            }),
            &recorder,
        );
        let run = pipeline.affordances()[1];
        assert_eq!(run.action, ActionKind::Execute);
        let request = activator.prepare(&doc, &run);

        let outcome = activator.dispatch(&request).await;
        assert!(matches!(outcome, ActionOutcome::Executed(_)));
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["execute echo hi /tmp 300"]);
    }
}
