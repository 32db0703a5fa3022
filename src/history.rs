/// Edit history: the ordered record of every file change the assistant made.
///
/// Records are kept in strict append order (oldest at index 0). The TUI shows
/// them newest-first; conversion between the two lives in `tui::visual_pos`.
/// The whole sequence is persisted as a pretty-printed JSON array in
/// `<workspace>/.hookline-history.json` after every mutation.
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::vcs::VcsKind;

pub const HISTORY_FILE_NAME: &str = ".hookline-history.json";

// ── Tool label ────────────────────────────────────────────────────────────────

/// Which editor tool produced the edit. Determines how the diff is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tool {
    #[default]
    Edit,
    Write,
    Other(String),
}

impl From<String> for Tool {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Edit" => Tool::Edit,
            "Write" => Tool::Write,
            _ => Tool::Other(s),
        }
    }
}

impl From<Tool> for String {
    fn from(t: Tool) -> Self {
        match t {
            Tool::Edit => "Edit".to_string(),
            Tool::Write => "Write".to_string(),
            Tool::Other(s) => s,
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::Edit => f.write_str("Edit"),
            Tool::Write => f.write_str("Write"),
            Tool::Other(s) => f.write_str(s),
        }
    }
}

// ── EditRecord ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    pub timestamp: DateTime<Utc>,
    /// Absolute path of the edited file
    #[serde(rename = "file_path")]
    pub path: String,
    #[serde(rename = "tool_name", default)]
    pub tool: Tool,
    #[serde(rename = "old_string", default)]
    pub old_text: String,
    #[serde(rename = "new_string", default)]
    pub new_text: String,
    /// Full file content captured at ingestion. Never persisted; backfilled
    /// lazily by the diff cache for records loaded from disk.
    #[serde(skip)]
    pub snapshot: String,
    /// 1-based line where `old_text` first appears in `snapshot`
    #[serde(default = "one")]
    pub line_num: usize,
    #[serde(default = "one")]
    pub line_count: usize,
    #[serde(rename = "commit_sha", default)]
    pub commit_long: String,
    #[serde(default)]
    pub commit_short: String,
    #[serde(rename = "vcs_type", default)]
    pub vcs: VcsKind,
}

fn one() -> usize {
    1
}

/// Identity used when merging daemon results: path, whole second, line.
pub type DedupKey = (String, i64, usize);

impl EditRecord {
    pub fn dedup_key(&self) -> DedupKey {
        (self.path.clone(), self.timestamp.timestamp(), self.line_num)
    }

    /// File name component of `path`, for compact list rows.
    pub fn file_name(&self) -> &str {
        Path::new(&self.path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.path)
    }
}

// ── History store ─────────────────────────────────────────────────────────────

pub struct HistoryStore {
    records: Vec<EditRecord>,
    path: PathBuf,
}

impl HistoryStore {
    /// Empty store backed by `path`. Call `load()` to read existing records.
    pub fn new(path: PathBuf) -> Self {
        Self { records: Vec::new(), path }
    }

    pub fn path_for(workspace: &Path) -> PathBuf {
        workspace.join(HISTORY_FILE_NAME)
    }

    /// Replace in-memory records with the side-file contents.
    /// A missing file is an empty history. On a parse error the store stays
    /// empty and the error is returned for the caller to report.
    pub fn load(&mut self) -> Result<usize> {
        self.records.clear();
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", self.path.display()));
            }
        };
        if raw.trim().is_empty() {
            return Ok(0);
        }
        let records: Vec<EditRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("cannot parse {}", self.path.display()))?;
        self.records = records;
        Ok(self.records.len())
    }

    /// Write the full history to disk via a temp file + rename.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.records)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("cannot write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("cannot replace {}", self.path.display()))?;
        Ok(())
    }

    /// Append and persist. The record is kept even when the save fails.
    pub fn add(&mut self, record: EditRecord) -> Result<()> {
        self.records.push(record);
        self.save()
    }

    /// Drop every record and persist the empty history.
    pub fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.save()
    }

    /// Insert records not already present (by `dedup_key`). Each new record
    /// lands after every existing record with a timestamp <= its own, so the
    /// relative order of existing entries never changes. Returns how many
    /// records were inserted. Does not persist.
    pub fn merge(&mut self, incoming: Vec<EditRecord>) -> usize {
        let mut seen: HashSet<DedupKey> = self.records.iter().map(EditRecord::dedup_key).collect();
        let mut inserted = 0;
        for record in incoming {
            if !seen.insert(record.dedup_key()) {
                continue;
            }
            let pos = self
                .records
                .partition_point(|r| r.timestamp <= record.timestamp);
            self.records.insert(pos, record);
            inserted += 1;
        }
        inserted
    }

    pub fn records(&self) -> &[EditRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [EditRecord] {
        &mut self.records
    }

    pub fn get(&self, index: usize) -> Option<&EditRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
impl HistoryStore {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(path: &str, secs: i64, line: usize) -> EditRecord {
        EditRecord {
            timestamp: Utc.timestamp_opt(1_704_067_200 + secs, 0).unwrap(),
            path: path.to_string(),
            tool: Tool::Edit,
            old_text: "old".to_string(),
            new_text: "new".to_string(),
            snapshot: String::new(),
            line_num: line,
            line_count: 1,
            commit_long: "abcdef0123456789".to_string(),
            commit_short: "abcdef0".to_string(),
            vcs: VcsKind::Git,
        }
    }

    fn store() -> (tempfile::TempDir, HistoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(HistoryStore::path_for(dir.path()));
        (dir, store)
    }

    #[test]
    fn test_add_appends_at_tail_and_persists() {
        let (_dir, mut history) = store();
        history.add(record("/a", 0, 1)).unwrap();
        let r = record("/b", 5, 3);
        history.add(r.clone()).unwrap();
        assert_eq!(history.records().last(), Some(&r));
        assert_eq!(history.len(), 2);
        assert!(history.path().exists());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (_dir, mut history) = store();
        let mut with_snapshot = record("/a", 0, 2);
        with_snapshot.snapshot = "x\nold\n".to_string();
        history.add(with_snapshot).unwrap();
        history.add(record("/b", 1, 7)).unwrap();

        let mut reloaded = HistoryStore::new(history.path().to_path_buf());
        assert_eq!(reloaded.load().unwrap(), 2);
        let a = &reloaded.records()[0];
        assert_eq!(a.path, "/a");
        assert_eq!(a.line_num, 2);
        assert_eq!(a.timestamp.timestamp(), history.records()[0].timestamp.timestamp());
        // snapshot is never written to disk
        assert!(a.snapshot.is_empty());
        assert_eq!(reloaded.records()[1], history.records()[1]);
    }

    #[test]
    fn test_persisted_field_names() {
        let (_dir, mut history) = store();
        history.add(record("/a", 0, 1)).unwrap();
        let raw = fs::read_to_string(history.path()).unwrap();
        for key in [
            "timestamp", "file_path", "tool_name", "old_string", "new_string",
            "line_num", "line_count", "commit_sha", "commit_short", "vcs_type",
        ] {
            assert!(raw.contains(&format!("\"{key}\"")), "missing {key}");
        }
        assert!(!raw.contains("snapshot"));
        // pretty-printed with two-space indent
        assert!(raw.contains("\n  {"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let (_dir, mut history) = store();
        assert_eq!(history.load().unwrap(), 0);
        assert!(history.is_empty());
    }

    #[test]
    fn test_load_garbage_errors_and_stays_empty() {
        let (_dir, mut history) = store();
        fs::write(history.path(), "{ not json").unwrap();
        assert!(history.load().is_err());
        assert!(history.is_empty());
    }

    #[test]
    fn test_clear_truncates_file() {
        let (_dir, mut history) = store();
        history.add(record("/a", 0, 1)).unwrap();
        history.clear().unwrap();
        let mut reloaded = HistoryStore::new(history.path().to_path_buf());
        assert_eq!(reloaded.load().unwrap(), 0);
    }

    #[test]
    fn test_merge_drops_duplicates() {
        let (_dir, mut history) = store();
        history.add(record("/p", 0, 1)).unwrap();
        let inserted = history.merge(vec![record("/p", 0, 1), record("/q", 1, 10)]);
        assert_eq!(inserted, 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history.records().last().unwrap().path, "/q");
    }

    #[test]
    fn test_merge_full_overlap_is_idempotent() {
        let (_dir, mut history) = store();
        history.add(record("/a", 0, 1)).unwrap();
        history.add(record("/b", 3, 2)).unwrap();
        let snapshot: Vec<EditRecord> = history.records().to_vec();
        assert_eq!(history.merge(snapshot.clone()), 0);
        assert_eq!(history.merge(snapshot), 0);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_merge_same_second_collapses() {
        let (_dir, mut history) = store();
        history.add(record("/a", 0, 1)).unwrap();
        let mut near = record("/a", 0, 1);
        near.timestamp = near.timestamp + chrono::Duration::milliseconds(400);
        assert_eq!(history.merge(vec![near]), 0);
    }

    #[test]
    fn test_merge_keeps_existing_order_and_slots_by_time() {
        let (_dir, mut history) = store();
        history.add(record("/late", 10, 1)).unwrap();
        history.add(record("/later", 20, 1)).unwrap();
        history.merge(vec![record("/early", 0, 1), record("/middle", 15, 1)]);
        let paths: Vec<&str> = history.records().iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/early", "/late", "/middle", "/later"]);
    }

    #[test]
    fn test_tool_label_round_trip() {
        for label in ["Edit", "Write", "MultiEdit"] {
            let tool = Tool::from(label.to_string());
            assert_eq!(String::from(tool.clone()), label);
            assert_eq!(tool.to_string(), label);
        }
        assert_eq!(Tool::from("Write".to_string()), Tool::Write);
    }

    #[test]
    fn test_record_defaults_when_fields_missing() {
        let json = r#"{"timestamp":"2024-01-01T00:00:00Z","file_path":"/x"}"#;
        let r: EditRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.line_num, 1);
        assert_eq!(r.line_count, 1);
        assert_eq!(r.tool, Tool::Edit);
        assert_eq!(r.vcs, VcsKind::None);
        assert_eq!(r.file_name(), "x");
    }
}
