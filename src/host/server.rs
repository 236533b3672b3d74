//! Native-messaging host loop.
//!
//! Reads one framed request at a time, answers it, and stops when the peer
//! closes the stream.
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use super::handlers::{handle_execute, handle_ping, handle_save};
use super::protocol::{ProtocolError, Request, Response, read_message, write_message};
use crate::config::ExecuteConfig;

#[derive(Debug, Clone, Default)]
pub struct HostServer {
    config: ExecuteConfig,
}

impl HostServer {
    pub fn new(config: ExecuteConfig) -> Self {
        Self { config }
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Save { path, content } => Response::Save(handle_save(&path, &content).await),
            Request::Execute {
                command,
                working_dir,
                timeout_secs,
            } => {
                let timeout_secs = self.config.clamp_timeout(timeout_secs);
                Response::Execute(
                    handle_execute(&self.config.shell, &command, &working_dir, timeout_secs).await,
                )
            }
            Request::Ping => handle_ping(),
        }
    }

    /// Serve until EOF. A frame that is not a valid request gets an error
    /// response and the loop carries on.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), ProtocolError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let response = match read_message(&mut reader).await {
                Ok(Some(request)) => {
                    debug!("Request: {request:?}");
                    self.handle(request).await
                }
                Ok(None) => break,
                Err(ProtocolError::Json(e)) => {
                    warn!("Rejecting malformed request: {e}");
                    Response::error(format!("Invalid request: {e}"))
                }
                Err(e) => return Err(e),
            };
            write_message(&mut writer, &response).await?;
        }
        info!("Peer closed the stream, host exiting");
        Ok(())
    }

    pub async fn serve_stdio(&self) -> Result<(), ProtocolError> {
        info!("Serving native messaging on stdio...");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }
}
