//! Keeps a live [`Document`] in step with a transcript file on disk.
//!
//! Every change to the file re-parses it and grafts the changed tail onto the
//! live document, which in turn notifies the scan loop.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::Mutex as TokioMutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::document::{Document, DocumentFormat};

/// Read and parse a transcript, choosing the parser from its extension.
pub async fn load_document(path: &Path) -> Result<Document> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    Ok(Document::parse(&source, DocumentFormat::from_path(path)))
}

pub struct DocumentWatcher {
    path: PathBuf,
    debounce: Duration,
}

impl DocumentWatcher {
    pub fn new(path: impl Into<PathBuf>, config: &WatchConfig) -> Self {
        Self {
            path: path.into(),
            debounce: Duration::from_millis(config.debounce_ms),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file and graft what changed at its end since the last read.
    pub async fn refresh(&self, document: &TokioMutex<Document>) -> Result<usize> {
        let snapshot = load_document(&self.path).await?;
        let grafted = document.lock().await.graft_snapshot(&snapshot);
        if grafted > 0 {
            info!("Grafted {grafted} node(s) from {}", self.path.display());
        }
        Ok(grafted)
    }

    fn is_relevant(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.path.file_name())
    }

    /// Watch until cancelled. The parent directory is watched rather than the
    /// file so editors that replace the file on save are still followed.
    pub async fn run(
        self,
        document: Arc<TokioMutex<Document>>,
        token: CancellationToken,
    ) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            NotifyConfig::default(),
        )
        .context("Failed to initialise file watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        info!("Watching {}", self.path.display());

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                res = rx.recv() => {
                    let Some(res) = res else { break };
                    match res {
                        Ok(event) if self.is_relevant(&event) => {}
                        Ok(_) => continue,
                        Err(e) => {
                            warn!("File watcher error: {e}");
                            continue;
                        }
                    }
                    // let a burst of writes settle before re-reading
                    tokio::time::sleep(self.debounce).await;
                    while rx.try_recv().is_ok() {}
                    debug!("{} changed", self.path.display());
                    if let Err(e) = self.refresh(&document).await {
                        warn!("Failed to refresh document: {e:#}");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SurfaceConfig;
    use crate::detection::context::block_text;
    use crate::scan::ScanPipeline;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_document_picks_parser_by_extension() {
        let dir = tempdir().unwrap();
        let md = dir.path().join("chat.md");
        fs::write(&md, "# hi\n\n```rust\nfn main() {}\n```\n").unwrap();
        let doc = load_document(&md).await.unwrap();
        assert_eq!(doc.elements_by_tag("pre").len(), 1);

        assert!(load_document(&dir.path().join("missing.html")).await.is_err());
    }

    #[tokio::test]
    async fn test_refresh_grafts_appended_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chat.html");
        fs::write(&path, "<p>one</p><pre>a</pre>").unwrap();

        let document = TokioMutex::new(load_document(&path).await.unwrap());
        let watcher = DocumentWatcher::new(&path, &WatchConfig::default());
        assert_eq!(watcher.refresh(&document).await.unwrap(), 0);

        fs::write(&path, "<p>one</p><pre>a</pre><p>two</p><pre>b</pre>").unwrap();
        assert_eq!(watcher.refresh(&document).await.unwrap(), 2);
        assert_eq!(document.lock().await.elements_by_tag("pre").len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_a_block_still_being_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chat.md");
        fs::write(&path, "Intro\n\n```rust\nfn main() {\n").unwrap();

        let document = TokioMutex::new(load_document(&path).await.unwrap());
        let mut pipeline = ScanPipeline::new(SurfaceConfig::default());
        pipeline.scan_once(&mut *document.lock().await);
        let partial = pipeline.affordances()[0].block;

        fs::write(&path, "Intro\n\n```rust\nfn main() {\n}\n```\n").unwrap();
        let watcher = DocumentWatcher::new(&path, &WatchConfig::default());
        assert!(watcher.refresh(&document).await.unwrap() > 0);

        let mut doc = document.lock().await;
        let blocks = doc.elements_by_tag("pre");
        assert_eq!(blocks.len(), 1);
        assert_ne!(blocks[0], partial);
        assert_eq!(block_text(&doc, blocks[0]), "fn main() {\n}\n");

        let report = pipeline.scan_once(&mut doc);
        assert_eq!(report.attached, 1);
        assert_eq!(doc.elements_by_tag("button").len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chat.html");
        fs::write(&path, "<pre>a</pre>").unwrap();

        let document = Arc::new(TokioMutex::new(load_document(&path).await.unwrap()));
        let token = CancellationToken::new();
        let watcher = DocumentWatcher::new(&path, &WatchConfig::default());
        let task = tokio::spawn(watcher.run(document, token.clone()));
        token.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_fails_fast_when_directory_is_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone/chat.html");

        let document = Arc::new(TokioMutex::new(Document::new()));
        let watcher = DocumentWatcher::new(&path, &WatchConfig::default());
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            watcher.run(document, CancellationToken::new()),
        )
        .await
        .expect("run should return without being cancelled");
        assert!(result.is_err());
    }
}
