/// Working context for the current project: revision, cluster, edit
/// activity and the user's own notes.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::vcs::{VcsKind, Workspace};

pub const NOTES_FILE: &str = ".hookline/context.md";
const TOP_FILES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextInfo {
    pub workspace: PathBuf,
    pub vcs: VcsKind,
    pub commit_short: String,
    pub branch: String,
    pub description: String,
    pub kube_context: Option<String>,
    pub edit_count: usize,
    /// Most-edited files, (path, edits), descending
    pub top_files: Vec<(String, usize)>,
    pub distinct_files: usize,
    pub notes: Option<String>,
}

pub fn notes_path(workspace: &Path) -> PathBuf {
    workspace.join(NOTES_FILE)
}

/// Edit counts per path, highest first, ties by path.
pub fn summarize_files(paths: &[String]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for p in paths {
        *counts.entry(p.as_str()).or_default() += 1;
    }
    let mut out: Vec<(String, usize)> = counts.into_iter().map(|(p, n)| (p.to_string(), n)).collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

fn kube_context() -> Option<String> {
    let output = std::process::Command::new("kubectl")
        .args(["config", "current-context"])
        .stdin(std::process::Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let ctx = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!ctx.is_empty()).then_some(ctx)
}

/// Collect everything. Spawns VCS and kubectl subprocesses; call from a
/// blocking context.
pub fn gather(workspace: &Path, edited_paths: &[String]) -> ContextInfo {
    let ws = Workspace::new(workspace);
    let commit = ws.current_commit();
    let summary = ws.revision_summary(commit.kind);
    let files = summarize_files(edited_paths);
    ContextInfo {
        workspace: workspace.to_path_buf(),
        vcs: commit.kind,
        commit_short: commit.short,
        branch: summary.branch,
        description: summary.description,
        kube_context: kube_context(),
        edit_count: edited_paths.len(),
        distinct_files: files.len(),
        top_files: files.into_iter().take(TOP_FILES).collect(),
        notes: fs::read_to_string(notes_path(workspace)).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_files() {
        let paths: Vec<String> = ["/b", "/a", "/b", "/c", "/a", "/b"].iter().map(|s| s.to_string()).collect();
        let s = summarize_files(&paths);
        assert_eq!(s[0], ("/b".to_string(), 3));
        assert_eq!(s[1], ("/a".to_string(), 2));
        assert_eq!(s[2], ("/c".to_string(), 1));
    }

    #[test]
    fn test_gather_reads_notes_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".hookline")).unwrap();
        fs::write(notes_path(dir.path()), "remember the migration").unwrap();
        let info = gather(dir.path(), &["/x".to_string(), "/x".to_string(), "/y".to_string()]);
        assert_eq!(info.edit_count, 3);
        assert_eq!(info.distinct_files, 2);
        assert_eq!(info.notes.as_deref(), Some("remember the migration"));
        assert_eq!(info.workspace, dir.path());
    }
}
