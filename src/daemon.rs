/// Query client for the optional history daemon.
///
/// The daemon keeps edit history across sessions and workspaces. Protocol: one
/// JSON request per connection, the client half-closes, the daemon replies
/// with one JSON object and closes. Every call is bounded by a dial timeout
/// and an overall timeout; an unreachable daemon is an ordinary `Err`.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::history::EditRecord;

pub const DEFAULT_DAEMON_SOCKET: &str = "/tmp/hookline-query.sock";

const QUERY_DIAL_TIMEOUT: Duration = Duration::from_secs(2);
const QUERY_TOTAL_TIMEOUT: Duration = Duration::from_secs(5);
const STATUS_DIAL_TIMEOUT: Duration = Duration::from_secs(1);
const STATUS_TOTAL_TIMEOUT: Duration = Duration::from_secs(2);

// ── Wire types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Request<'a> {
    Workspace { workspace_path: &'a str, limit: usize },
    Status { workspace_path: &'a str },
}

#[derive(Debug, Deserialize)]
struct WorkspaceResponse {
    #[serde(default)]
    edits: Vec<EditRecord>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: Option<DaemonStatus>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DaemonStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub uptime_str: String,
    #[serde(default)]
    pub active_workspace: Option<ActiveWorkspace>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActiveWorkspace {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edit_count: usize,
}

// ── Client ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket: PathBuf,
}

impl DaemonClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
        }
    }

    /// Most recent `limit` edits the daemon recorded for `workspace`.
    pub async fn workspace_history(&self, workspace: &Path, limit: usize) -> Result<Vec<EditRecord>> {
        let path = workspace.to_string_lossy();
        let req = Request::Workspace {
            workspace_path: &path,
            limit,
        };
        let raw = self
            .round_trip(&req, QUERY_DIAL_TIMEOUT, QUERY_TOTAL_TIMEOUT)
            .await?;
        let resp: WorkspaceResponse =
            serde_json::from_slice(&raw).context("malformed daemon response")?;
        if let Some(err) = resp.error.filter(|e| !e.is_empty()) {
            bail!("daemon error: {err}");
        }
        Ok(resp.edits)
    }

    pub async fn status(&self, workspace: &Path) -> Result<DaemonStatus> {
        let path = workspace.to_string_lossy();
        let req = Request::Status {
            workspace_path: &path,
        };
        let raw = self
            .round_trip(&req, STATUS_DIAL_TIMEOUT, STATUS_TOTAL_TIMEOUT)
            .await?;
        let resp: StatusResponse =
            serde_json::from_slice(&raw).context("malformed daemon status")?;
        if let Some(err) = resp.error.filter(|e| !e.is_empty()) {
            bail!("daemon error: {err}");
        }
        resp.status.context("daemon status missing")
    }

    async fn round_trip(&self, req: &Request<'_>, dial: Duration, total: Duration) -> Result<Vec<u8>> {
        let exchange = async {
            let mut stream = timeout(dial, UnixStream::connect(&self.socket))
                .await
                .context("daemon dial timed out")?
                .with_context(|| format!("cannot connect to {}", self.socket.display()))?;
            let body = serde_json::to_vec(req)?;
            stream.write_all(&body).await?;
            stream.shutdown().await?;
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).await?;
            Ok::<_, anyhow::Error>(buf)
        };
        timeout(total, exchange)
            .await
            .context("daemon request timed out")?
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    /// One-shot fake daemon: reads a request, checks it, answers `reply`.
    async fn fake_daemon(listener: UnixListener, expect_type: &'static str, reply: String) {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        let req: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(req["type"], expect_type);
        assert!(req["workspace_path"].is_string());
        stream.write_all(reply.as_bytes()).await.unwrap();
    }

    #[tokio::test]
    async fn test_workspace_history_decodes_edits() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("q.sock");
        let listener = UnixListener::bind(&sock).unwrap();
        let reply = serde_json::json!({
            "edits": [{
                "timestamp": "2024-01-01T00:00:00Z",
                "file_path": "/p",
                "tool_name": "Edit",
                "old_string": "a",
                "new_string": "b",
                "line_num": 4,
                "line_count": 1,
                "commit_sha": "abc",
                "commit_short": "abc",
                "vcs_type": "git"
            }]
        })
        .to_string();
        let server = tokio::spawn(fake_daemon(listener, "workspace", reply));

        let client = DaemonClient::new(&sock);
        let edits = client.workspace_history(dir.path(), 500).await.unwrap();
        server.await.unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].path, "/p");
        assert_eq!(edits[0].line_num, 4);
        assert!(edits[0].snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_error_field_becomes_err() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("q.sock");
        let listener = UnixListener::bind(&sock).unwrap();
        let server = tokio::spawn(fake_daemon(
            listener,
            "workspace",
            r#"{"edits":[],"error":"unknown workspace"}"#.to_string(),
        ));
        let err = DaemonClient::new(&sock)
            .workspace_history(dir.path(), 10)
            .await
            .unwrap_err();
        server.await.unwrap();
        assert!(err.to_string().contains("unknown workspace"));
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("q.sock");
        let listener = UnixListener::bind(&sock).unwrap();
        let server = tokio::spawn(fake_daemon(
            listener,
            "status",
            r#"{"status":{"running":true,"uptime_str":"3h12m","active_workspace":{"path":"/w","name":"w","edit_count":9}}}"#
                .to_string(),
        ));
        let status = DaemonClient::new(&sock).status(dir.path()).await.unwrap();
        server.await.unwrap();
        assert!(status.running);
        assert_eq!(status.uptime_str, "3h12m");
        assert_eq!(status.active_workspace.unwrap().edit_count, 9);
    }

    #[tokio::test]
    async fn test_missing_socket_is_err() {
        let dir = tempfile::tempdir().unwrap();
        let client = DaemonClient::new(dir.path().join("absent.sock"));
        assert!(client.status(dir.path()).await.is_err());
        assert!(client.workspace_history(dir.path(), 1).await.is_err());
    }
}
