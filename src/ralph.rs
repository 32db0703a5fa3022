/// Ralph loop monitor. An automation loop re-feeds the same prompt to the
/// assistant until it reports completion; its state lives in
/// `<workspace>/.claude/ralph-loop.local.md` as frontmatter plus the prompt.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::frontmatter;

pub const RALPH_STATE_FILE: &str = ".claude/ralph-loop.local.md";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RalphState {
    pub active: bool,
    pub iteration: u32,
    /// 0 means unlimited
    pub max_iterations: u32,
    pub completion_promise: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub prompt: String,
}

impl RalphState {
    /// Fraction of the iteration budget used, when there is a budget.
    pub fn progress(&self) -> Option<f64> {
        (self.max_iterations > 0)
            .then(|| (self.iteration as f64 / self.max_iterations as f64).clamp(0.0, 1.0))
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.started_at.map(|s| now - s)
    }
}

pub fn state_path(workspace: &Path) -> PathBuf {
    workspace.join(RALPH_STATE_FILE)
}

pub fn parse_state(raw: &str) -> Result<RalphState> {
    let (fm, body) = frontmatter::split(raw)?;
    let number = |key: &str| -> Result<u32> {
        match fm.get(key) {
            None | Some("") => Ok(0),
            Some(v) => v.parse().with_context(|| format!("{key} is not a number: {v}")),
        }
    };
    Ok(RalphState {
        active: matches!(fm.get("active"), Some("true") | Some("yes") | Some("1")),
        iteration: number("iteration")?,
        max_iterations: number("max_iterations")?,
        completion_promise: fm
            .get("completion_promise")
            .filter(|v| !v.is_empty() && *v != "null")
            .map(str::to_string),
        started_at: fm
            .get("started_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc)),
        prompt: body.trim().to_string(),
    })
}

/// Current loop state, or None when no loop has been started.
pub fn load(workspace: &Path) -> Result<Option<RalphState>> {
    let path = state_path(workspace);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
    };
    parse_state(&raw).map(Some)
}

/// Stop the loop by removing its state file. Returns false when none existed.
pub fn cancel(workspace: &Path) -> Result<bool> {
    let path = state_path(workspace);
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("cannot remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "---\nactive: true\niteration: 3\nmax_iterations: 10\n\
completion_promise: \"DONE\"\nstarted_at: \"2024-05-01T12:00:00Z\"\n---\n\nFix the flaky tests.\n";

    #[test]
    fn test_parse_state() {
        let s = parse_state(SAMPLE).unwrap();
        assert!(s.active);
        assert_eq!(s.iteration, 3);
        assert_eq!(s.max_iterations, 10);
        assert_eq!(s.completion_promise.as_deref(), Some("DONE"));
        assert_eq!(s.prompt, "Fix the flaky tests.");
        assert_eq!(s.progress(), Some(0.3));
        let later = DateTime::parse_from_rfc3339("2024-05-01T12:30:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(s.elapsed(later), Some(chrono::Duration::minutes(30)));
    }

    #[test]
    fn test_unlimited_and_null_promise() {
        let s = parse_state("---\nactive: false\niteration: 7\nmax_iterations: 0\ncompletion_promise: null\n---\nx").unwrap();
        assert!(!s.active);
        assert_eq!(s.progress(), None);
        assert_eq!(s.completion_promise, None);
        assert_eq!(s.started_at, None);
    }

    #[test]
    fn test_bad_number_is_error() {
        assert!(parse_state("---\niteration: many\n---\n").is_err());
    }

    #[test]
    fn test_load_and_cancel() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(dir.path()).unwrap(), None);
        assert!(!cancel(dir.path()).unwrap());

        fs::create_dir_all(dir.path().join(".claude")).unwrap();
        fs::write(state_path(dir.path()), SAMPLE).unwrap();
        assert_eq!(load(dir.path()).unwrap().unwrap().iteration, 3);
        assert!(cancel(dir.path()).unwrap());
        assert!(!state_path(dir.path()).exists());
    }
}
