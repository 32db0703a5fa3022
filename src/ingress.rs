/// Ingress socket: the Unix socket editor hooks write edit payloads to.
///
/// One socket per (user, workspace): `/tmp/hookline-<user>-<hash>.sock`, where
/// `<hash>` is the first 12 hex chars of SHA-256 over the canonical workspace
/// path. Each connection carries exactly one payload, terminated by EOF.
///
/// Payloads flow through a bounded queue (`INGRESS_QUEUE_CAPACITY`). A full
/// queue drops the payload.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::parser;
use crate::tui::AppEvent;

pub const INGRESS_QUEUE_CAPACITY: usize = 100;
/// Upper bound on a single payload. Anything larger is truncated and will
/// fail to parse.
pub const MAX_PAYLOAD_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("cannot remove stale socket {path}: {source}")]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot bind ingress socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ── Socket naming ──────────────────────────────────────────────────────────────

/// Canonical current working directory, used as the workspace root.
pub fn workspace_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("cannot read current directory")?;
    cwd.canonicalize()
        .with_context(|| format!("cannot canonicalize {}", cwd.display()))
}

/// Login name from the environment, or `"unknown"`.
pub fn current_user() -> String {
    ["USER", "LOGNAME"]
        .iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// First 12 hex characters of SHA-256 over the workspace path.
pub fn workspace_hash(workspace: &Path) -> String {
    let digest = Sha256::digest(workspace.to_string_lossy().as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

pub fn socket_path_for(workspace: &Path, user: &str) -> PathBuf {
    PathBuf::from(format!(
        "/tmp/{}-{}-{}.sock",
        crate::APP_NAME,
        user,
        workspace_hash(workspace)
    ))
}

// ── Listener ───────────────────────────────────────────────────────────────────

pub struct IngressServer {
    listener: UnixListener,
    path: PathBuf,
}

impl IngressServer {
    /// Remove any stale socket at `path` and bind a fresh listener.
    /// Must be called from inside a tokio runtime.
    pub fn bind(path: &Path) -> Result<Self, IngressError> {
        match fs::remove_file(path) {
            Ok(()) => debug!(event = "ingress_stale_removed", socket = %path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(IngressError::StaleSocket {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        let listener = UnixListener::bind(path).map_err(|source| IngressError::Bind {
            path: path.to_path_buf(),
            source,
        })?;
        info!(event = "ingress_bound", socket = %path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until the queue's receiver is dropped. The socket
    /// file is removed when the server is dropped, including on task abort.
    pub async fn serve(self, tx: mpsc::Sender<Vec<u8>>) {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                accept = self.listener.accept() => {
                    match accept {
                        Ok((stream, _addr)) => {
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, tx).await;
                            });
                        }
                        Err(err) => {
                            warn!(event = "ingress_accept_error", error = %err);
                        }
                    }
                }
            }
        }
        debug!(event = "ingress_stop", socket = %self.path.display());
    }
}

impl Drop for IngressServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

async fn handle_connection(stream: UnixStream, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = Vec::new();
    if let Err(err) = stream.take(MAX_PAYLOAD_BYTES).read_to_end(&mut buf).await {
        debug!(event = "ingress_read_error", error = %err);
        return;
    }
    if buf.is_empty() {
        return;
    }
    enqueue(&tx, buf);
}

/// Non-blocking hand-off to the consumer. Returns false when the payload was
/// dropped (queue full or consumer gone).
pub fn enqueue(tx: &mpsc::Sender<Vec<u8>>, payload: Vec<u8>) -> bool {
    match tx.try_send(payload) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(event = "ingress_queue_full", capacity = INGRESS_QUEUE_CAPACITY);
            false
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

// ── Consumer ───────────────────────────────────────────────────────────────────

/// Drain the queue in arrival order: parse, stamp with VCS info, forward to
/// the UI. Parsing runs on the blocking pool (it reads files and spawns VCS
/// subprocesses) but one payload at a time, so order is preserved.
pub async fn run_consumer(
    mut rx: mpsc::Receiver<Vec<u8>>,
    root: PathBuf,
    out: mpsc::UnboundedSender<AppEvent>,
) {
    while let Some(payload) = rx.recv().await {
        let root = root.clone();
        let parsed =
            tokio::task::spawn_blocking(move || parser::ingest_payload(&payload, &root)).await;
        match parsed {
            Ok(Ok(event)) => {
                if event.record.is_none() && event.plan_path.is_none() {
                    continue;
                }
                if out.send(AppEvent::Edit(event)).is_err() {
                    break;
                }
            }
            Ok(Err(err)) => debug!(event = "ingress_malformed", error = %err),
            Err(err) => warn!(event = "ingress_parse_panicked", error = %err),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_socket_path_shape() {
        let p = socket_path_for(Path::new("/home/dev/project"), "dev");
        let s = p.to_string_lossy();
        assert!(s.starts_with("/tmp/hookline-dev-"));
        assert!(s.ends_with(".sock"));
        let hash = s.trim_start_matches("/tmp/hookline-dev-").trim_end_matches(".sock");
        assert_eq!(hash.len(), 12);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_socket_path_deterministic_per_workspace() {
        let a = socket_path_for(Path::new("/w/a"), "u");
        assert_eq!(a, socket_path_for(Path::new("/w/a"), "u"));
        assert_ne!(a, socket_path_for(Path::new("/w/b"), "u"));
        assert_ne!(a, socket_path_for(Path::new("/w/a"), "v"));
    }

    #[test]
    fn test_workspace_hash_matches_sha256_prefix() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(workspace_hash(Path::new("abc")), "ba7816bf8f01");
    }

    #[test]
    fn test_enqueue_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(INGRESS_QUEUE_CAPACITY);
        let accepted = (0..=INGRESS_QUEUE_CAPACITY)
            .filter(|i| enqueue(&tx, vec![*i as u8]))
            .count();
        assert_eq!(accepted, INGRESS_QUEUE_CAPACITY);
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, INGRESS_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        fs::write(&path, b"left over").unwrap();
        let server = IngressServer::bind(&path).unwrap();
        assert_eq!(server.path(), path.as_path());
        drop(server);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_bind_replaces_dangling_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.sock");
        std::os::unix::fs::symlink(dir.path().join("gone"), &path).unwrap();
        assert!(!path.exists());
        let server = IngressServer::bind(&path).unwrap();
        assert!(path.exists());
        drop(server);
    }

    #[tokio::test]
    async fn test_bind_fresh_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.sock");
        let server = IngressServer::bind(&path).unwrap();
        assert!(path.exists());
        drop(server);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stale_path_that_cannot_be_removed_is_error() {
        let dir = tempfile::tempdir().unwrap();
        // a non-empty directory cannot be unlinked with remove_file
        let path = dir.path().join("busy.sock");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("x"), b"x").unwrap();
        let err = IngressServer::bind(&path).err();
        assert!(matches!(err, Some(IngressError::StaleSocket { .. })));
    }

    #[tokio::test]
    async fn test_payload_delivered_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.sock");
        let server = IngressServer::bind(&path).unwrap();
        let (tx, mut rx) = mpsc::channel(INGRESS_QUEUE_CAPACITY);
        let task = tokio::spawn(server.serve(tx));

        let mut client = UnixStream::connect(&path).await.unwrap();
        client.write_all(br#"{"tool_name":"Edit"}"#).await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        let got = rx.recv().await.unwrap();
        assert_eq!(got, br#"{"tool_name":"Edit"}"#.to_vec());

        task.abort();
        let _ = task.await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_consumer_forwards_parsed_edits_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        tx.send(b"garbage".to_vec()).await.unwrap();
        tx.send(br#"{"tool_input":{"file_path":"/p","new_string":"x"}}"#.to_vec())
            .await
            .unwrap();
        drop(tx);
        run_consumer(rx, dir.path().to_path_buf(), out_tx).await;

        match out_rx.recv().await {
            Some(AppEvent::Edit(ev)) => assert_eq!(ev.record.unwrap().path, "/p"),
            _ => panic!("expected an edit event"),
        }
        assert!(out_rx.try_recv().is_err());
    }
}
