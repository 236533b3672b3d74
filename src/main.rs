use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use blocksaver::action::{
    ActionKind, ActionOutcome, ActionRequest, Activator, TerminalSurface, prepare_request,
};
use blocksaver::config::Config;
use blocksaver::detection::{ContentTag, DetectionResult, FilenameInference};
use blocksaver::document::{Document, NodeId};
use blocksaver::host::{HostServer, LocalBackend};
use blocksaver::scan::watcher::load_document;
use blocksaver::scan::{Affordance, DocumentWatcher, ScanPipeline};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::Mutex as TokioMutex;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blocksaver", version, about)]
struct Cli {
    /// Configuration file (defaults to <config dir>/blocksaver/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the blocks of a transcript with their inferred filenames
    Detect { file: PathBuf },
    /// Save one block under a project root
    Save {
        file: PathBuf,
        /// Block index as printed by `detect`
        #[arg(long)]
        block: usize,
        #[arg(long)]
        root: PathBuf,
        /// Relative path to use instead of the inferred one
        #[arg(long)]
        path: Option<String>,
        #[arg(long, short)]
        yes: bool,
    },
    /// Run one executable block
    Run {
        file: PathBuf,
        #[arg(long)]
        block: usize,
        #[arg(long)]
        cwd: PathBuf,
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long, short)]
        yes: bool,
    },
    /// Follow a transcript as it grows and report new blocks
    Watch { file: PathBuf },
    /// Serve the native-messaging protocol on stdin/stdout
    Host,
}

#[derive(Serialize)]
struct BlockReport<'a> {
    index: usize,
    block: NodeId,
    content_tag: ContentTag,
    action: ActionKind,
    executable: bool,
    detection: &'a DetectionResult,
}

impl<'a> BlockReport<'a> {
    fn new(index: usize, request: &'a ActionRequest) -> Self {
        Self {
            index,
            block: request.block,
            content_tag: request.content_tag,
            action: request.kind,
            executable: request.kind == ActionKind::Execute,
            detection: &request.detection,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path.map(Path::to_path_buf).or_else(Config::default_path) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Invalid path: {}", path.display()))
}

/// Parse and scan a transcript, then pick the `index`-th attached block.
async fn scanned_block(
    config: &Config,
    file: &Path,
    index: usize,
) -> Result<(Document, Affordance)> {
    let mut doc = load_document(file).await?;
    let mut pipeline = ScanPipeline::new(config.surface.clone());
    pipeline.scan_once(&mut doc);
    let Some(affordance) = pipeline.affordances().get(index).copied() else {
        bail!(
            "{} has {} block(s), no block #{index}",
            file.display(),
            pipeline.affordances().len()
        );
    };
    Ok((doc, affordance))
}

async fn detect(config: &Config, file: &Path) -> Result<()> {
    let mut doc = load_document(file).await?;
    let mut pipeline = ScanPipeline::new(config.surface.clone());
    pipeline.scan_once(&mut doc);

    let inference = FilenameInference::default();
    for (index, affordance) in pipeline.affordances().iter().enumerate() {
        let request = prepare_request(&doc, affordance, &inference, &config.context);
        println!("{}", serde_json::to_string(&BlockReport::new(index, &request))?);
    }
    Ok(())
}

async fn save(
    config: &Config,
    file: &Path,
    index: usize,
    root: &Path,
    path: Option<String>,
    yes: bool,
) -> Result<()> {
    let (doc, affordance) = scanned_block(config, file, index).await?;
    let surface = TerminalSurface::new(&absolute(root)?)
        .path_override(path)
        .assume_yes(yes);
    let activator = Activator::new(surface, LocalBackend::new(config.execute.clone()))
        .with_limits(config.context.clone(), config.execute.clone());

    // any block can be saved, including scripts
    let mut request = activator.prepare(&doc, &affordance);
    request.kind = ActionKind::Save;

    match activator.dispatch(&request).await {
        ActionOutcome::Saved(response) if response.success => {
            println!("{}", response.full_path.unwrap_or_default());
            Ok(())
        }
        ActionOutcome::Saved(response) => bail!(response.error.unwrap_or_default()),
        _ => {
            eprintln!("Cancelled");
            Ok(())
        }
    }
}

async fn run(
    config: &Config,
    file: &Path,
    index: usize,
    cwd: &Path,
    timeout: Option<u64>,
    yes: bool,
) -> Result<()> {
    let (doc, affordance) = scanned_block(config, file, index).await?;
    if affordance.action != ActionKind::Execute {
        bail!("Block #{index} is not an executable shell script");
    }
    let cwd = absolute(cwd)?;
    let surface = TerminalSurface::new(&cwd)
        .working_dir(&cwd)
        .timeout_secs(timeout.unwrap_or(config.execute.default_timeout_secs))
        .assume_yes(yes);
    let activator = Activator::new(surface, LocalBackend::new(config.execute.clone()))
        .with_limits(config.context.clone(), config.execute.clone());

    let request = activator.prepare(&doc, &affordance);
    match activator.dispatch(&request).await {
        ActionOutcome::Executed(response) => {
            println!(
                "{}",
                response.report(&request.content, &cwd.to_string_lossy())
            );
            if !response.success {
                bail!("Command failed");
            }
            Ok(())
        }
        _ => {
            eprintln!("Cancelled");
            Ok(())
        }
    }
}

async fn watch(config: &Config, file: &Path) -> Result<()> {
    let document = Arc::new(TokioMutex::new(load_document(file).await?));
    let mut pipeline = ScanPipeline::new(config.surface.clone());
    let mut attached = pipeline.subscribe();
    let scan = pipeline.start(document.clone()).await?;

    let token = CancellationToken::new();
    let watcher = DocumentWatcher::new(file, &config.watch);
    let mut watch_task = tokio::spawn(watcher.run(document.clone(), token.clone()));

    let inference = FilenameInference::default();
    let mut index = 0;
    let mut watch_result = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            res = &mut watch_task => {
                watch_result = Some(res);
                break;
            }
            affordance = attached.recv() => {
                let Some(affordance) = affordance else { break };
                let request = {
                    let doc = document.lock().await;
                    prepare_request(&doc, &affordance, &inference, &config.context)
                };
                println!("{}", serde_json::to_string(&BlockReport::new(index, &request))?);
                index += 1;
            }
        }
    }

    token.cancel();
    let watched = match watch_result {
        Some(res) => res,
        None => watch_task.await,
    };
    watched?.context("File watcher failed")?;
    let pipeline = scan.stop().await?;
    tracing::info!("Processed {} block(s)", pipeline.registry().len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries framed messages in host mode, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Detect { file } => detect(&config, &file).await,
        Command::Save {
            file,
            block,
            root,
            path,
            yes,
        } => save(&config, &file, block, &root, path, yes).await,
        Command::Run {
            file,
            block,
            cwd,
            timeout,
            yes,
        } => run(&config, &file, block, &cwd, timeout, yes).await,
        Command::Watch { file } => watch(&config, &file).await,
        Command::Host => {
            HostServer::new(config.execute.clone())
                .serve_stdio()
                .await
                .context("Native messaging host failed")?;
            Ok(())
        }
    }
}
