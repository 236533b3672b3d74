/// End-to-end integration tests for the blocksaver pipeline.
///
/// Tests the complete flow:
///   Transcript → Document → Scan → Inference → Confirmation → Save / Execute
use blocksaver::action::{
    ActionKind, ActionOutcome, ActionRequest, Activator, ConfirmationSurface, Decision,
    TerminalSurface,
};
use blocksaver::config::{Config, SurfaceConfig};
use blocksaver::detection::{BlockContext, Confidence, ContentTag, DetectionSource, FilenameInference};
use blocksaver::document::{Document, DocumentFormat};
use blocksaver::host::LocalBackend;
use blocksaver::scan::ScanPipeline;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const TRANSCRIPT: &str = r#"# Setting up

Create a tiny Rust project. Save this as `src/main.rs`:

```rust
fn main() {
    println!("hello");
}
```

### Cargo.toml

```toml
[package]
name = "hello"
version = "0.1.0"
```

Then build it:

```bash
#!/usr/bin/env bash
cargo build --release
```

```
just some words
```
"#;

fn fixed_clock() -> i64 {
    42
}

/// Transcript → scan → per-block inference
#[test]
fn test_markdown_transcript_detection() {
    let mut doc = Document::parse(TRANSCRIPT, DocumentFormat::Markdown);
    let mut pipeline = ScanPipeline::new(SurfaceConfig::default());
    let report = pipeline.scan_once(&mut doc);
    assert_eq!(report.attached, 4, "Should attach one action per fenced block");

    let activator = Activator::new(Never, LocalBackend::default())
        .with_inference(FilenameInference::with_clock(fixed_clock));
    let requests: Vec<ActionRequest> = pipeline
        .affordances()
        .iter()
        .map(|a| activator.prepare(&doc, a))
        .collect();

    assert_eq!(requests[0].detection.filename, "src/main.rs");
    assert_eq!(requests[0].detection.source, DetectionSource::Context);
    assert_eq!(requests[0].content_tag, ContentTag::Rust);

    assert_eq!(requests[1].detection.filename, "Cargo.toml");
    assert_eq!(requests[1].detection.source, DetectionSource::Header);

    assert_eq!(requests[2].kind, ActionKind::Execute);
    assert_eq!(requests[2].content_tag, ContentTag::Shell);

    assert_eq!(requests[3].content_tag, ContentTag::Text);
    assert_eq!(requests[3].kind, ActionKind::Save);

    // Rescanning the same document must not attach anything new
    let again = pipeline.scan_once(&mut doc);
    assert_eq!(again.attached, 0);
    assert_eq!(again.already_processed, 4);
}

/// A surface that always cancels.
struct Never;

impl ConfirmationSurface for Never {
    async fn confirm(&self, _request: &ActionRequest) -> Decision {
        Decision::Cancel
    }
}

/// Transcript → confirmation → file on disk
#[tokio::test]
async fn test_save_flow_writes_file() {
    let temp_dir = tempdir().unwrap();
    let mut doc = Document::parse(TRANSCRIPT, DocumentFormat::Markdown);
    let mut pipeline = ScanPipeline::new(SurfaceConfig::default());
    pipeline.scan_once(&mut doc);

    let surface = TerminalSurface::new(temp_dir.path()).assume_yes(true);
    let activator = Activator::new(surface, LocalBackend::default());
    let request = activator.prepare(&doc, &pipeline.affordances()[0]);

    let outcome = activator.dispatch(&request).await;
    let ActionOutcome::Saved(response) = outcome else {
        panic!("expected a save, got {outcome:?}");
    };
    assert!(response.success, "{response:?}");

    let written = temp_dir.path().join("src/main.rs");
    assert_eq!(response.full_path.as_deref(), written.to_str());
    assert_eq!(
        fs::read_to_string(&written).unwrap(),
        "fn main() {\n    println!(\"hello\");\n}\n"
    );
}

/// Transcript → confirmation → shell execution
#[tokio::test]
async fn test_execute_flow_runs_script() {
    let temp_dir = tempdir().unwrap();
    let html = r#"<p>Run this:</p><pre><code class="language-sh">echo from-block &gt; marker.txt; echo done</code></pre>"#;
    let mut doc = Document::parse(html, DocumentFormat::Html);
    let mut pipeline = ScanPipeline::new(SurfaceConfig::default());
    pipeline.scan_once(&mut doc);

    let surface = TerminalSurface::new(temp_dir.path())
        .working_dir(temp_dir.path())
        .timeout_secs(10)
        .assume_yes(true);
    let activator = Activator::new(surface, LocalBackend::default());
    let request = activator.prepare(&doc, &pipeline.affordances()[0]);
    assert_eq!(request.kind, ActionKind::Execute);

    let ActionOutcome::Executed(response) = activator.dispatch(&request).await else {
        panic!("expected an execution");
    };
    assert!(response.success, "{response:?}");
    assert_eq!(response.stdout.as_deref(), Some("done\n"));
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("marker.txt")).unwrap(),
        "from-block\n"
    );
}

/// Inference without any document at all falls back to a generated name
#[test]
fn test_inference_fallback_and_determinism() {
    let engine = FilenameInference::with_clock(fixed_clock);
    let a = engine.infer("lorem ipsum", &BlockContext::default(), ContentTag::Yaml);
    let b = engine.infer("lorem ipsum", &BlockContext::default(), ContentTag::Yaml);
    assert_eq!(a, b);
    assert_eq!(a.source, DetectionSource::Generated);
    assert_eq!(a.confidence, Confidence::None);
    assert_eq!(a.filename, "snippet-16.yaml");
}

/// Config round-trips through disk and missing files fall back to defaults
#[test]
fn test_config_file_round_trip() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("nested/config.json");

    let missing = Config::load(&path).unwrap();
    assert_eq!(missing.execute.default_timeout_secs, 30);

    let mut config = Config::default();
    config.execute.default_timeout_secs = 60;
    config.save(&path).unwrap();
    assert!(Path::new(&path).exists());

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.execute.default_timeout_secs, 60);
    loaded.validate().unwrap();
}
