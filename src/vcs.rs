/// Version-control probe: which commit was current when an edit landed, and
/// what a file looked like at that commit.
///
/// Jujutsu is preferred over git when both are present. Probes fail soft:
/// any command failure yields an empty result.
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Number of change-id characters shown for jj revisions.
pub const JJ_SHORT_LEN: usize = 8;
/// Fallback abbreviation when `git rev-parse --short` is unavailable.
pub const GIT_SHORT_LEN: usize = 7;

// ── Data structures ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VcsKind {
    Jj,
    Git,
    #[default]
    None,
}

impl VcsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VcsKind::Jj => "jj",
            VcsKind::Git => "git",
            VcsKind::None => "",
        }
    }
}

impl From<String> for VcsKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "jj" => VcsKind::Jj,
            "git" => VcsKind::Git,
            _ => VcsKind::None,
        }
    }
}

impl From<VcsKind> for String {
    fn from(k: VcsKind) -> Self {
        k.as_str().to_string()
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcsKind::None => f.write_str("none"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitInfo {
    pub long: String,
    /// Always a prefix of `long`
    pub short: String,
    pub kind: VcsKind,
}

/// Branch/bookmark and description of the working revision, for Context mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionSummary {
    pub branch: String,
    pub description: String,
}

pub struct Workspace {
    /// Canonical workspace root; all VCS commands run here.
    pub root: PathBuf,
}

// ── Pure helpers ───────────────────────────────────────────────────────────────

/// Choose the commit identity from raw probe outputs.
///
/// A non-empty jj change id wins. Otherwise git's full hash is used, with the
/// abbreviated form taken from `git rev-parse --short` when it is a prefix of
/// the full hash, else the first `GIT_SHORT_LEN` characters.
pub fn select_commit(
    jj_change: Option<String>,
    git_long: Option<String>,
    git_short: Option<String>,
) -> CommitInfo {
    if let Some(id) = jj_change.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        return CommitInfo {
            short: prefix(&id, JJ_SHORT_LEN),
            long: id,
            kind: VcsKind::Jj,
        };
    }
    if let Some(long) = git_long.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        let short = git_short
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && long.starts_with(s.as_str()))
            .unwrap_or_else(|| prefix(&long, GIT_SHORT_LEN));
        return CommitInfo {
            long,
            short,
            kind: VcsKind::Git,
        };
    }
    CommitInfo::default()
}

fn prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Path of `file` relative to `root`, or `None` when it lies outside.
pub fn relative_to(root: &Path, file: &Path) -> Option<PathBuf> {
    file.strip_prefix(root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

// ── Probes ─────────────────────────────────────────────────────────────────────

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Current commit, jj first then git. Empty `CommitInfo` outside any repo.
    pub fn current_commit(&self) -> CommitInfo {
        let jj = self
            .run("jj", &["log", "-r", "@", "--no-graph", "-T", "change_id"])
            .ok();
        if jj.as_deref().is_some_and(|s| !s.trim().is_empty()) {
            return select_commit(jj, None, None);
        }
        let long = self.run("git", &["rev-parse", "HEAD"]).ok();
        let short = match long {
            Some(_) => self.run("git", &["rev-parse", "--short", "HEAD"]).ok(),
            None => None,
        };
        select_commit(None, long, short)
    }

    /// File contents at `commit`. Empty when the path is outside the
    /// workspace, the commit is unknown, or the file did not exist then.
    pub fn file_at_commit(&self, file: &Path, commit: &str, kind: VcsKind) -> String {
        if commit.is_empty() {
            return String::new();
        }
        let Some(rel) = relative_to(&self.root, file) else {
            return String::new();
        };
        let rel = rel.to_string_lossy();
        let out = match kind {
            VcsKind::Jj => self.run("jj", &["file", "show", "-r", commit, rel.as_ref()]),
            VcsKind::Git => {
                let revspec = format!("{commit}:./{rel}");
                self.run("git", &["show", &revspec])
            }
            VcsKind::None => return String::new(),
        };
        out.unwrap_or_default()
    }

    /// Bookmark/branch and first description line of the working revision.
    pub fn revision_summary(&self, kind: VcsKind) -> RevisionSummary {
        let (branch, description) = match kind {
            VcsKind::Jj => (
                self.run(
                    "jj",
                    &["log", "-r", "latest(::@ & bookmarks())", "--no-graph", "-T", "bookmarks"],
                ),
                self.run(
                    "jj",
                    &["log", "-r", "@", "--no-graph", "-T", "description.first_line()"],
                ),
            ),
            VcsKind::Git => (
                self.run("git", &["rev-parse", "--abbrev-ref", "HEAD"]),
                self.run("git", &["log", "-1", "--format=%s"]),
            ),
            VcsKind::None => return RevisionSummary::default(),
        };
        RevisionSummary {
            branch: branch.map(|s| s.trim().to_string()).unwrap_or_default(),
            description: description.map(|s| s.trim().to_string()).unwrap_or_default(),
        }
    }

    /// Run a VCS command in the workspace root. Returns stdout on success,
    /// Err(stderr) on failure.
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = std::process::Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .stdin(std::process::Stdio::null())
            .output()
            .map_err(|e| anyhow!("failed to run {program}: {e}"))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(anyhow!("{program} {}: {}", args.join(" "), stderr.trim()))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jj_change_id_wins() {
        let c = select_commit(
            Some("qpvuntsmwlqtpsluzzsnyyzlmlwvmlnu\n".into()),
            Some("0123456789abcdef".into()),
            Some("0123456".into()),
        );
        assert_eq!(c.kind, VcsKind::Jj);
        assert_eq!(c.long, "qpvuntsmwlqtpsluzzsnyyzlmlwvmlnu");
        assert_eq!(c.short, "qpvuntsm");
    }

    #[test]
    fn test_git_fallback_when_jj_empty() {
        let long = "1f0e4a6c9b2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f";
        let c = select_commit(Some(String::new()), Some(format!("{long}\n")), Some("1f0e4a6\n".into()));
        assert_eq!(c.kind, VcsKind::Git);
        assert_eq!(c.long, long);
        assert_eq!(c.short, "1f0e4a6");
        assert!(c.long.starts_with(&c.short));
    }

    #[test]
    fn test_git_short_falls_back_to_prefix() {
        let long = "abcdef0123456789";
        let c = select_commit(None, Some(long.into()), None);
        assert_eq!(c.short, "abcdef0");

        // a short hash that is not a prefix is ignored
        let c = select_commit(None, Some(long.into()), Some("zzzzzzz".into()));
        assert_eq!(c.short, "abcdef0");
    }

    #[test]
    fn test_no_vcs_is_empty() {
        let c = select_commit(None, None, None);
        assert_eq!(c, CommitInfo::default());
        assert_eq!(c.kind.as_str(), "");
    }

    #[test]
    fn test_relative_to() {
        let root = Path::new("/work/repo");
        assert_eq!(
            relative_to(root, Path::new("/work/repo/src/main.rs")),
            Some(PathBuf::from("src/main.rs"))
        );
        assert_eq!(relative_to(root, Path::new("/elsewhere/x.rs")), None);
        assert_eq!(relative_to(root, root), None);
    }

    #[test]
    fn test_file_at_commit_outside_workspace_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        let out = ws.file_at_commit(Path::new("/definitely/not/here.rs"), "abc", VcsKind::Git);
        assert!(out.is_empty());
        let out = ws.file_at_commit(&dir.path().join("a.rs"), "", VcsKind::Git);
        assert!(out.is_empty());
    }

    #[test]
    fn test_vcs_kind_serde_strings() {
        assert_eq!(serde_json::to_string(&VcsKind::Jj).unwrap(), "\"jj\"");
        assert_eq!(serde_json::to_string(&VcsKind::None).unwrap(), "\"\"");
        let k: VcsKind = serde_json::from_str("\"git\"").unwrap();
        assert_eq!(k, VcsKind::Git);
        let k: VcsKind = serde_json::from_str("\"svn\"").unwrap();
        assert_eq!(k, VcsKind::None);
    }
}
