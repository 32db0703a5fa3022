/// Hook payload parsing: turns the JSON an editor hook posts to the ingress
/// socket into an `EditRecord` (plus an optional plan-file pointer).
///
/// Hooks from different assistant versions disagree on field names, so every
/// value is resolved from a fixed list of candidate locations; the first
/// non-empty one wins.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::history::{EditRecord, Tool};
use crate::vcs::Workspace;

// ── Wire shape ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct HookPayload {
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    tool_input: Option<ToolFields>,
    #[serde(default)]
    parameters: Option<ToolFields>,
    #[serde(default)]
    plan_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ToolFields {
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    old_string: Option<String>,
    #[serde(default)]
    new_string: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Result of parsing one payload. Either half may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEvent {
    pub record: Option<EditRecord>,
    pub plan_path: Option<String>,
}

// ── Parsing ────────────────────────────────────────────────────────────────────

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = Option<&'a String>>) -> String {
    candidates
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .cloned()
        .unwrap_or_default()
}

/// Parse a raw hook payload.
///
/// Returns Err only for malformed JSON. A payload with no resolvable file
/// path yields `record: None` but may still carry a `plan_path`. The file at
/// the resolved path is read immediately so the record carries a snapshot.
pub fn parse_event(payload: &[u8], now: DateTime<Utc>) -> Result<ParsedEvent> {
    let hook: HookPayload =
        serde_json::from_slice(payload).context("malformed hook payload")?;

    let plan_path = hook.plan_path.clone().filter(|p| !p.is_empty());

    let input = hook.tool_input.as_ref();
    let params = hook.parameters.as_ref();

    let path = first_non_empty([
        input.and_then(|f| f.file_path.as_ref()),
        input.and_then(|f| f.path.as_ref()),
        params.and_then(|f| f.file_path.as_ref()),
        params.and_then(|f| f.path.as_ref()),
    ]);
    if path.is_empty() {
        return Ok(ParsedEvent { record: None, plan_path });
    }

    let old_text = first_non_empty([
        input.and_then(|f| f.old_string.as_ref()),
        params.and_then(|f| f.old_string.as_ref()),
    ]);
    let new_text = first_non_empty([
        input.and_then(|f| f.new_string.as_ref()),
        params.and_then(|f| f.new_string.as_ref()),
        input.and_then(|f| f.content.as_ref()),
        params.and_then(|f| f.content.as_ref()),
    ]);

    let snapshot = fs::read_to_string(&path).unwrap_or_default();
    let line_num = locate_line(&snapshot, &old_text);
    let line_count = count_lines(&old_text, &new_text);

    let record = EditRecord {
        timestamp: now,
        path,
        tool: Tool::from(hook.tool_name.unwrap_or_default()),
        old_text,
        new_text,
        snapshot,
        line_num,
        line_count,
        commit_long: String::new(),
        commit_short: String::new(),
        vcs: Default::default(),
    };
    Ok(ParsedEvent { record: Some(record), plan_path })
}

/// Parse a payload and stamp the record with the workspace's current commit.
/// Runs VCS subprocesses; call from a blocking context.
pub fn ingest_payload(payload: &[u8], root: &Path) -> Result<ParsedEvent> {
    let mut event = parse_event(payload, Utc::now())?;
    if let Some(record) = event.record.as_mut() {
        let commit = Workspace::new(root).current_commit();
        record.commit_long = commit.long;
        record.commit_short = commit.short;
        record.vcs = commit.kind;
    }
    Ok(event)
}

/// 1-based line of the first occurrence of `old` in `snapshot`; 1 when
/// `old` is empty or absent.
pub fn locate_line(snapshot: &str, old: &str) -> usize {
    if old.is_empty() {
        return 1;
    }
    match snapshot.find(old) {
        Some(offset) => 1 + snapshot[..offset].matches('\n').count(),
        None => 1,
    }
}

/// Lines in the replaced text, or in the new text when nothing was replaced.
pub fn count_lines(old: &str, new: &str) -> usize {
    let basis = if old.is_empty() { new } else { old };
    basis.matches('\n').count() + 1
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_parse_edit_with_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.rs");
        fs::write(&file, "a\nb\nc\n").unwrap();
        let payload = json!({
            "tool_name": "Edit",
            "tool_input": {
                "file_path": file.to_string_lossy(),
                "old_string": "b",
                "new_string": "B",
            }
        });
        let ev = parse_event(payload.to_string().as_bytes(), now()).unwrap();
        let r = ev.record.unwrap();
        assert_eq!(r.tool, Tool::Edit);
        assert_eq!(r.line_num, 2);
        assert_eq!(r.line_count, 1);
        assert_eq!(r.snapshot, "a\nb\nc\n");
        assert!(ev.plan_path.is_none());
    }

    #[test]
    fn test_path_resolution_order() {
        let payload = json!({
            "tool_name": "Edit",
            "tool_input": { "file_path": "", "path": "/from/path" },
            "parameters": { "file_path": "/from/params" }
        });
        let r = parse_event(payload.to_string().as_bytes(), now()).unwrap().record.unwrap();
        assert_eq!(r.path, "/from/path");

        let payload = json!({
            "tool_input": { "content": "whole file" },
            "parameters": { "path": "/from/params", "new_string": "n" }
        });
        let r = parse_event(payload.to_string().as_bytes(), now()).unwrap().record.unwrap();
        assert_eq!(r.path, "/from/params");
        // new_string outranks content
        assert_eq!(r.new_text, "n");
    }

    #[test]
    fn test_write_content_fills_new_text() {
        let payload = json!({
            "tool_name": "Write",
            "tool_input": { "file_path": "/nowhere/new.txt", "content": "one\ntwo\nthree" }
        });
        let r = parse_event(payload.to_string().as_bytes(), now()).unwrap().record.unwrap();
        assert_eq!(r.tool, Tool::Write);
        assert_eq!(r.new_text, "one\ntwo\nthree");
        assert_eq!(r.line_count, 3);
        assert_eq!(r.line_num, 1);
        assert!(r.snapshot.is_empty());
    }

    #[test]
    fn test_missing_path_discards_record_but_keeps_plan() {
        let payload = json!({ "tool_name": "ExitPlanMode", "plan_path": "/tmp/plan.md" });
        let ev = parse_event(payload.to_string().as_bytes(), now()).unwrap();
        assert!(ev.record.is_none());
        assert_eq!(ev.plan_path.as_deref(), Some("/tmp/plan.md"));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let payload = json!({
            "session_id": "s1",
            "tool_input": { "file_path": "/a", "replace_all": true }
        });
        assert!(parse_event(payload.to_string().as_bytes(), now()).unwrap().record.is_some());
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(parse_event(b"{\"tool_name\": ", now()).is_err());
    }

    #[test]
    fn test_locate_line() {
        assert_eq!(locate_line("a\nb\nc\n", "c"), 3);
        assert_eq!(locate_line("a\nb\nc\n", "zzz"), 1);
        assert_eq!(locate_line("a\nb\n", ""), 1);
        assert_eq!(locate_line("", "x"), 1);
        // first occurrence wins
        assert_eq!(locate_line("x\ny\nx\n", "x"), 1);
    }

    #[test]
    fn test_count_lines() {
        assert_eq!(count_lines("a\nb", "z"), 2);
        assert_eq!(count_lines("", "a\nb\nc\n"), 4);
        assert_eq!(count_lines("", ""), 1);
    }
}
