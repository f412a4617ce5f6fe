//! IPC server for daemon communication
//!
//! Provides a Unix domain socket for the CLI to query and steer the running
//! daemon. One JSON request line in, one JSON response line out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub const SOCKET_NAME: &str = "beeftext.sock";
pub const LOCK_NAME: &str = "beeftextd.lock";

// ============================================================================
// IPC Message Types
// ============================================================================

/// Request messages sent from the CLI to the daemon
///
/// Serialized as JSON with a `type` field for discrimination:
/// - `{"type": "status"}`
/// - `{"type": "set_combo_enabled", "id": "...", "enabled": false}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcRequest {
    /// Query overall daemon status
    Status,
    /// Turn substitution on
    Enable,
    /// Turn substitution off; a running substitution stops after its
    /// current fragment
    Disable,
    /// Reload preferences and the combo list
    Reload,
    ListCombos,
    SetComboEnabled { id: String, enabled: bool },
    SetGroupEnabled { id: String, enabled: bool },
}

/// Response messages sent from the daemon back to the CLI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    /// Operation completed successfully
    Success {
        /// Optional message with additional details
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Status(DaemonStatus),
    Combos { combos: Vec<ComboSummary> },
    /// Error occurred while processing request
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DaemonStatus {
    pub enabled: bool,
    pub automatic: bool,
    pub use_clipboard: bool,
    pub trigger_shortcut: String,
    /// Combos taking part in matching
    pub active_combos: usize,
    pub total_combos: usize,
    pub combo_list: PathBuf,
    /// Names of the grabbed keyboards
    pub keyboards: Vec<String>,
    /// Why the keyboard hook is not installed, if it is not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_error: Option<String>,
    pub substituting: bool,
    pub substitutions: u64,
    pub failed_fragments: u64,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComboSummary {
    pub id: String,
    pub keyword: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub enabled: bool,
    /// Enabled and in an enabled group
    pub active: bool,
}

// ============================================================================
// Socket location
// ============================================================================

/// `$XDG_RUNTIME_DIR/<name>`, or `/tmp/<stem>-$UID.<ext>` without it.
pub fn runtime_path(name: &str) -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join(name),
        _ => {
            let uid = nix::unistd::getuid();
            let path = Path::new(name);
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
            match path.extension().and_then(|e| e.to_str()) {
                Some(ext) => PathBuf::from(format!("/tmp/{}-{}.{}", stem, uid, ext)),
                None => PathBuf::from(format!("/tmp/{}-{}", stem, uid)),
            }
        }
    }
}

pub fn default_socket_path() -> PathBuf {
    runtime_path(SOCKET_NAME)
}

// ============================================================================
// IPC Server
// ============================================================================

/// IPC server on a Unix domain socket
///
/// The socket file is removed when the server is dropped.
pub struct IpcServer {
    listener: UnixListener,
    socket_path: PathBuf,
}

impl IpcServer {
    /// Bind at the default location.
    pub fn new() -> Result<Self> {
        Self::bind(default_socket_path())
    }

    /// Bind at `socket_path`, replacing a stale socket file left by a
    /// previous run. The instance lock guarantees no live daemon owns it.
    pub fn bind(socket_path: PathBuf) -> Result<Self> {
        if socket_path.exists() {
            tracing::debug!("Removing stale socket file: {}", socket_path.display());
            std::fs::remove_file(&socket_path).with_context(|| {
                format!("Failed to remove stale socket file: {}", socket_path.display())
            })?;
        }

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to create IPC socket at {}", socket_path.display()))?;

        tracing::info!("IPC server listening on {}", socket_path.display());

        Ok(Self {
            listener,
            socket_path,
        })
    }

    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept IPC connection")?;
        tracing::debug!("Accepted IPC connection");
        Ok(stream)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                tracing::warn!("Failed to remove IPC socket file on shutdown: {}", e);
            }
        }
    }
}

// ============================================================================
// Connection handling
// ============================================================================

/// Read one request from `stream`, answer it with `handler`.
pub async fn handle_ipc_connection<F>(mut stream: UnixStream, handler: F) -> Result<()>
where
    F: FnOnce(IpcRequest) -> IpcResponse,
{
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);

    let mut line = String::new();
    let bytes_read = reader
        .read_line(&mut line)
        .await
        .context("Failed to read IPC request")?;

    if bytes_read == 0 {
        tracing::debug!("IPC connection closed without data");
        return Ok(());
    }

    let line = line.trim();
    tracing::debug!("Received IPC request: {}", line);

    let response = match serde_json::from_str::<IpcRequest>(line) {
        Ok(request) => handler(request),
        Err(e) => {
            tracing::warn!("Failed to parse IPC request: {}", e);
            IpcResponse::Error {
                message: format!("Invalid request: {}", e),
            }
        }
    };

    let response_json =
        serde_json::to_string(&response).context("Failed to serialize IPC response")?;
    writer
        .write_all(response_json.as_bytes())
        .await
        .context("Failed to write IPC response")?;
    writer.write_all(b"\n").await.context("Failed to write newline")?;
    writer.flush().await.context("Failed to flush IPC response")?;

    Ok(())
}

/// Send `request` to the daemon at `socket_path` and wait for its answer.
pub async fn send_request(socket_path: &Path, request: &IpcRequest) -> Result<IpcResponse> {
    let mut stream = UnixStream::connect(socket_path).await.with_context(|| {
        format!(
            "Failed to connect to {}. Is beeftextd running?",
            socket_path.display()
        )
    })?;

    let mut request_json = serde_json::to_string(request).context("Failed to serialize request")?;
    request_json.push('\n');
    stream
        .write_all(request_json.as_bytes())
        .await
        .context("Failed to send request")?;
    stream.flush().await?;

    let (reader, _writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .await
        .context("Failed to read response")?;
    if line.trim().is_empty() {
        anyhow::bail!("Daemon closed the connection without answering");
    }

    serde_json::from_str(line.trim()).context("Failed to parse daemon response")
}
