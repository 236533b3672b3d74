//! Confirmation on the controlling terminal.
//!
//! The guess is shown on stderr together with a preview of the block; the
//! reply is read from stdin. For saves the reply may also be a corrected
//! path, relative to the project root.
use std::path::Path;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use super::{ActionKind, ActionRequest, ConfirmationSurface, Decision, join_root};

const PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct TerminalSurface {
    root: String,
    working_dir: String,
    timeout_secs: u64,
    path_override: Option<String>,
    assume_yes: bool,
}

impl TerminalSurface {
    pub fn new(root: &Path) -> Self {
        let root = root.to_string_lossy().into_owned();
        Self {
            working_dir: root.clone(),
            root,
            timeout_secs: 30,
            path_override: None,
            assume_yes: false,
        }
    }

    pub fn working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = dir.to_string_lossy().into_owned();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Use this relative path instead of the inferred filename.
    pub fn path_override(mut self, path: Option<String>) -> Self {
        self.path_override = path;
        self
    }

    /// Accept the proposal without prompting.
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    /// What gets proposed before the human has said anything.
    pub fn proposal(&self, request: &ActionRequest) -> Decision {
        match request.kind {
            ActionKind::Save => {
                let relative = self
                    .path_override
                    .as_deref()
                    .unwrap_or(&request.detection.filename);
                Decision::Save {
                    path: join_root(&self.root, relative),
                }
            }
            ActionKind::Execute => Decision::Execute {
                command: request.content.clone(),
                working_dir: self.working_dir.clone(),
                timeout_secs: self.timeout_secs,
            },
        }
    }

    /// Map a typed reply onto a decision. Empty or `y` accepts the proposal;
    /// for saves, any other non-`n` reply is a replacement relative path.
    pub fn interpret_reply(&self, reply: &str, proposal: Decision) -> Decision {
        let reply = reply.trim();
        match reply.to_ascii_lowercase().as_str() {
            "" | "y" | "yes" => proposal,
            "n" | "no" => Decision::Cancel,
            _ => match proposal {
                Decision::Save { .. } => Decision::Save {
                    path: join_root(&self.root, reply),
                },
                _ => Decision::Cancel,
            },
        }
    }

    fn describe(request: &ActionRequest, proposal: &Decision) -> String {
        let preview: String = request.content.chars().take(PREVIEW_CHARS).collect();
        let mut text = format!(
            "\n--- block {} [{}], {} line(s) ---\n{preview}\n---\n",
            request.block,
            request.content_tag,
            request.content.lines().count()
        );
        match proposal {
            Decision::Save { path } => text.push_str(&format!(
                "Detected {} ({}, {} confidence)\nSave to {path}? [Y/n/other path] ",
                request.detection.filename, request.detection.source, request.detection.confidence
            )),
            Decision::Execute {
                working_dir,
                timeout_secs,
                ..
            } => text.push_str(&format!(
                "Run in {working_dir} with a {timeout_secs}s timeout? [y/N] "
            )),
            Decision::Cancel => {}
        }
        text
    }
}

impl ConfirmationSurface for TerminalSurface {
    async fn confirm(&self, request: &ActionRequest) -> Decision {
        let proposal = self.proposal(request);
        if self.assume_yes {
            return proposal;
        }

        let mut stderr = tokio::io::stderr();
        let prompt = Self::describe(request, &proposal);
        if let Err(e) = stderr.write_all(prompt.as_bytes()).await {
            warn!("Failed to write prompt: {e}");
            return Decision::Cancel;
        }
        let _ = stderr.flush().await;

        let mut reply = String::new();
        match BufReader::new(tokio::io::stdin()).read_line(&mut reply).await {
            Ok(0) | Err(_) => Decision::Cancel,
            // executing needs an explicit yes
            Ok(_) if request.kind == ActionKind::Execute && reply.trim().is_empty() => {
                Decision::Cancel
            }
            Ok(_) => self.interpret_reply(&reply, proposal),
        }
    }
}
