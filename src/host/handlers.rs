use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use super::protocol::{ExecuteResponse, Response, SaveResponse};
use crate::action::ActionBackend;
use crate::config::ExecuteConfig;

/// Write `content` to an absolute path, creating missing parent directories.
pub async fn handle_save(path: &str, content: &str) -> SaveResponse {
    let target = Path::new(path);
    if !target.is_absolute() {
        return SaveResponse::failed("Path must be absolute");
    }

    if let Some(parent) = target.parent() {
        if !parent.exists() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return SaveResponse::failed(format!("Failed to create directories: {e}"));
            }
        }
    }

    match tokio::fs::write(target, content).await {
        Ok(()) => {
            debug!("Wrote {} bytes to {path}", content.len());
            SaveResponse::saved(target.to_string_lossy())
        }
        Err(e) => SaveResponse::failed(format!("Failed to write file: {e}")),
    }
}

fn non_empty(bytes: &[u8]) -> Option<String> {
    (!bytes.is_empty()).then(|| String::from_utf8_lossy(bytes).into_owned())
}

/// Run `<shell> -c <command>` in `working_dir`. The child is killed if it
/// outlives the timeout.
pub async fn handle_execute(
    shell: &str,
    command: &str,
    working_dir: &str,
    timeout_secs: u64,
) -> ExecuteResponse {
    let dir = Path::new(working_dir);
    if !dir.is_absolute() {
        return ExecuteResponse::failed("Working directory must be absolute");
    }
    if !dir.exists() {
        return ExecuteResponse::failed(format!(
            "Working directory does not exist: {working_dir}"
        ));
    }

    // stdin is the message channel in host mode and must not leak to the child
    let child = match Command::new(shell)
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return ExecuteResponse::failed(format!("Failed to spawn command: {e}")),
    };

    match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => ExecuteResponse {
            success: output.status.success(),
            stdout: non_empty(&output.stdout),
            stderr: non_empty(&output.stderr),
            exit_code: output.status.code(),
            error: None,
        },
        Ok(Err(e)) => ExecuteResponse::failed(format!("Failed to wait for command: {e}")),
        Err(_) => {
            warn!("Command in {working_dir} timed out after {timeout_secs}s");
            ExecuteResponse::failed(format!("Command timed out after {timeout_secs} seconds"))
        }
    }
}

pub fn handle_ping() -> Response {
    Response::Pong { success: true }
}

/// Performs actions in this process, with the same checks as the host.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    config: ExecuteConfig,
}

impl LocalBackend {
    pub fn new(config: ExecuteConfig) -> Self {
        Self { config }
    }
}

impl ActionBackend for LocalBackend {
    async fn save(&self, path: &str, content: &str) -> SaveResponse {
        handle_save(path, content).await
    }

    async fn execute(&self, command: &str, working_dir: &str, timeout_secs: u64) -> ExecuteResponse {
        handle_execute(&self.config.shell, command, working_dir, timeout_secs).await
    }
}
