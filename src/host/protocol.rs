//! Length-prefixed JSON framing and the request/response vocabulary.
//!
//! Each message is a 4-byte native-endian length followed by that many bytes
//! of JSON.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message of {0} bytes exceeds the 64 MiB limit")]
    TooLarge(usize),
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Write `content` to an absolute path.
    Save { path: String, content: String },
    /// Run a shell command in an absolute working directory.
    Execute {
        command: String,
        working_dir: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveResponse {
    pub fn saved(full_path: impl Into<String>) -> Self {
        Self {
            success: true,
            full_path: Some(full_path.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            full_path: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteResponse {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: None,
            stderr: None,
            exit_code: None,
            error: Some(error.into()),
        }
    }

    /// Fenced summary of a finished command, ready to paste back into a chat.
    pub fn report(&self, command: &str, working_dir: &str) -> String {
        let mut out = String::from("```\n");
        let first_line = command.lines().next().unwrap_or_default();
        out.push_str(&format!("Command executed: {first_line}...\n"));
        out.push_str(&format!("Working directory: {working_dir}\n"));
        match self.exit_code {
            Some(code) => out.push_str(&format!("Exit code: {code}\n")),
            None => out.push_str("Exit code: none\n"),
        }
        out.push_str("\n--- Output ---\n");
        if let Some(stdout) = &self.stdout {
            push_line(&mut out, stdout);
        }
        if let Some(stderr) = &self.stderr {
            out.push_str("\n--- Errors ---\n");
            push_line(&mut out, stderr);
        }
        if let Some(error) = &self.error {
            out.push_str("\n--- Failure ---\n");
            push_line(&mut out, error);
        }
        out.push_str("```");
        out
    }
}

fn push_line(out: &mut String, text: &str) {
    out.push_str(text);
    if !text.ends_with('\n') {
        out.push('\n');
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Save(SaveResponse),
    Execute(ExecuteResponse),
    Pong { success: bool },
    Error { success: bool, error: String },
}

impl Response {
    pub fn error(error: impl Into<String>) -> Self {
        Response::Error {
            success: false,
            error: error.into(),
        }
    }
}

/// Read one framed message. `Ok(None)` means the peer closed the stream
/// before a new frame started.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_ne_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::TooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Read and decode one request.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Request>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader).await? {
        Some(body) => Ok(Some(serde_json::from_slice(&body)?)),
        None => Ok(None),
    }
}

pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_MESSAGE_BYTES {
        return Err(ProtocolError::TooLarge(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_ne_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(value: &serde_json::Value) -> Vec<u8> {
        let body = serde_json::to_vec(value).unwrap();
        let mut out = (body.len() as u32).to_ne_bytes().to_vec();
        out.extend(body);
        out
    }

    #[tokio::test]
    async fn test_read_requests() {
        let mut input = frame(&json!({"action": "ping"}));
        input.extend(frame(&json!({"action": "execute", "command": "ls", "working_dir": "/tmp"})));
        let mut reader = input.as_slice();

        assert_eq!(read_message(&mut reader).await.unwrap(), Some(Request::Ping));
        assert_eq!(
            read_message(&mut reader).await.unwrap(),
            Some(Request::Execute {
                command: "ls".into(),
                working_dir: "/tmp".into(),
                timeout_secs: 30,
            })
        );
        assert_eq!(read_message(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_action_is_a_json_error() {
        let input = frame(&json!({"action": "delete", "path": "/"}));
        let err = read_message(&mut input.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let input = (u32::MAX).to_ne_bytes();
        let err = read_frame(&mut input.as_slice()).await.unwrap_err();
        assert!(matches!(err, ProtocolError::TooLarge(_)));
    }

    #[tokio::test]
    async fn test_write_message_frames_json() {
        let mut out = Vec::new();
        write_message(&mut out, &Response::Pong { success: true })
            .await
            .unwrap();
        let len = u32::from_ne_bytes(out[..4].try_into().unwrap()) as usize;
        assert_eq!(len, out.len() - 4);
        assert_eq!(&out[4..], br#"{"success":true}"#);
    }

    #[test]
    fn test_responses_omit_empty_fields() {
        let saved = serde_json::to_value(Response::Save(SaveResponse::saved("/tmp/a.rs"))).unwrap();
        assert_eq!(saved, json!({"success": true, "full_path": "/tmp/a.rs"}));

        let failed = serde_json::to_value(Response::Execute(ExecuteResponse::failed(
            "Command timed out after 1 seconds",
        )))
        .unwrap();
        assert_eq!(
            failed,
            json!({"success": false, "error": "Command timed out after 1 seconds"})
        );
    }

    #[test]
    fn test_report_formatting() {
        let response = ExecuteResponse {
            success: true,
            stdout: Some("hi".into()),
            stderr: None,
            exit_code: Some(0),
            error: None,
        };
        let report = response.report("echo hi\necho more", "/work");
        assert_eq!(
            report,
            "```\nCommand executed: echo hi...\nWorking directory: /work\nExit code: 0\n\n--- Output ---\nhi\n```"
        );
    }
}
