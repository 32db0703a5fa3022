/// Diff rendering and the per-record render cache.
///
/// A record is rendered one of four ways, in priority order:
/// - `Write` with content: the new file, every line prefixed `+ `
/// - snapshot available: the whole file with the edit shown in place
/// - only old/new text: a line diff of the two fragments
/// - nothing: a one-line placeholder
///
/// Rendered output is cached by record index. The cache owns no records; the
/// caller passes the history slice in, and snapshots backfilled during a
/// render are written back into it.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use similar::{ChangeTag, TextDiff};

use crate::highlight;
use crate::history::{EditRecord, Tool};
use crate::vcs::{VcsKind, Workspace};

/// Characters of a `Write` body shown before truncating.
pub const WRITE_PREVIEW_LIMIT: usize = 2000;
pub const EMPTY_DIFF_TEXT: &str = "no diff content available";

const GUTTER_WIDTH: usize = 5;

const ADDED_FG: Color = Color::Rgb(140, 220, 140);
const ADDED_BG: Color = Color::Rgb(14, 40, 20);
const REMOVED_FG: Color = Color::Rgb(235, 120, 120);
const REMOVED_BG: Color = Color::Rgb(48, 14, 18);
const GUTTER_FG: Color = Color::Rgb(70, 75, 95);
const HEADER_FG: Color = Color::Rgb(120, 170, 255);

// ── Rendered output ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Header,
    Note,
    Context,
    Added,
    Removed,
}

#[derive(Debug, Clone, Default)]
pub struct RenderedDiff {
    pub lines: Vec<Line<'static>>,
    /// Parallel to `lines`
    pub kinds: Vec<LineKind>,
    /// Row of the hunk header (or first change) for scroll-to-hunk
    pub hunk_row: usize,
    pub added: usize,
    pub removed: usize,
}

impl RenderedDiff {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Copy with the content of every code row shifted left by `h` chars.
    /// Gutter and marker columns stay put; headers and notes are untouched.
    pub fn shifted(&self, h: usize) -> RenderedDiff {
        if h == 0 {
            return self.clone();
        }
        let lines = self
            .lines
            .iter()
            .zip(&self.kinds)
            .map(|(line, kind)| match kind {
                LineKind::Header | LineKind::Note => line.clone(),
                _ => shift_line(line, h),
            })
            .collect();
        RenderedDiff {
            lines,
            ..self.clone()
        }
    }
}

fn shift_line(line: &Line<'static>, h: usize) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = line.spans.iter().take(2).cloned().collect();
    let mut skip = h;
    for span in line.spans.iter().skip(2) {
        let n = span.content.chars().count();
        if skip >= n {
            skip -= n;
            continue;
        }
        let rest: String = span.content.chars().skip(skip).collect();
        skip = 0;
        spans.push(Span::styled(rest, span.style));
    }
    Line::from(spans).style(line.style)
}

// ── Builder ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct DiffBuilder {
    out: RenderedDiff,
    hunk_row: Option<usize>,
}

impl DiffBuilder {
    fn header(&mut self, text: String) {
        self.hunk_row.get_or_insert(self.out.lines.len());
        self.out.lines.push(Line::from(Span::styled(
            text,
            Style::default().fg(HEADER_FG).add_modifier(Modifier::BOLD),
        )));
        self.out.kinds.push(LineKind::Header);
    }

    fn note(&mut self, text: String) {
        self.out.lines.push(Line::from(Span::styled(
            text,
            Style::default().fg(GUTTER_FG).add_modifier(Modifier::ITALIC),
        )));
        self.out.kinds.push(LineKind::Note);
    }

    fn row(&mut self, kind: LineKind, number: Option<usize>, content: Vec<Span<'static>>) {
        let gutter = match number {
            Some(n) => format!("{:>width$} ", n, width = GUTTER_WIDTH),
            None => " ".repeat(GUTTER_WIDTH + 1),
        };
        let (marker, line_style) = match kind {
            LineKind::Added => {
                self.out.added += 1;
                self.hunk_row.get_or_insert(self.out.lines.len());
                ("+ ", Style::default().bg(ADDED_BG))
            }
            LineKind::Removed => {
                self.out.removed += 1;
                self.hunk_row.get_or_insert(self.out.lines.len());
                ("- ", Style::default().bg(REMOVED_BG))
            }
            _ => ("  ", Style::default()),
        };
        let marker_fg = match kind {
            LineKind::Added => ADDED_FG,
            LineKind::Removed => REMOVED_FG,
            _ => GUTTER_FG,
        };
        let mut spans = vec![
            Span::styled(gutter, Style::default().fg(GUTTER_FG)),
            Span::styled(marker, Style::default().fg(marker_fg).add_modifier(Modifier::BOLD)),
        ];
        spans.extend(content);
        self.out.lines.push(Line::from(spans).style(line_style));
        self.out.kinds.push(kind);
    }

    fn plain_row(&mut self, kind: LineKind, number: Option<usize>, text: &str) {
        let style = match kind {
            LineKind::Added => Style::default().fg(ADDED_FG),
            LineKind::Removed => Style::default().fg(REMOVED_FG),
            _ => Style::default(),
        };
        self.row(kind, number, vec![Span::styled(text.to_string(), style)]);
    }

    fn finish(mut self) -> RenderedDiff {
        self.out.hunk_row = self.hunk_row.unwrap_or(0);
        self.out
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Render a record with whatever content it currently carries.
pub fn render(record: &EditRecord, theme: &str) -> RenderedDiff {
    if record.tool == Tool::Write && !record.new_text.is_empty() {
        return render_write(&record.new_text);
    }
    if !record.snapshot.is_empty() {
        if let Some(diff) = render_in_file(record, theme) {
            return diff;
        }
    }
    if !record.old_text.is_empty() || !record.new_text.is_empty() {
        return render_fragments(record);
    }
    render_empty()
}

fn render_write(content: &str) -> RenderedDiff {
    let (shown, hidden) = match content.char_indices().nth(WRITE_PREVIEW_LIMIT) {
        Some((cut, _)) => (&content[..cut], content[cut..].chars().count()),
        None => (content, 0),
    };
    let mut b = DiffBuilder::default();
    b.header(format!("@@ -0,0 +1,{} @@  new file", content.lines().count()));
    for (i, line) in shown.lines().enumerate() {
        b.plain_row(LineKind::Added, Some(i + 1), line);
    }
    if hidden > 0 {
        b.note(format!("… truncated, {hidden} more characters"));
    }
    b.finish()
}

fn render_empty() -> RenderedDiff {
    let mut b = DiffBuilder::default();
    b.note(EMPTY_DIFF_TEXT.to_string());
    b.finish()
}

/// 0-based line index containing byte `offset`. Counts raw bytes, so
/// `offset` need not sit on a char boundary.
fn line_of(text: &str, offset: usize) -> usize {
    let end = offset.min(text.len());
    text.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count()
}

/// Lines spanned by `text[start..start+len]` (at least one).
fn lines_spanned(text: &str, start: usize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    line_of(text, start + len - 1) - line_of(text, start) + 1
}

fn splice(text: &str, at: usize, remove: usize, insert: &str) -> String {
    let mut out = String::with_capacity(text.len() + insert.len());
    out.push_str(&text[..at]);
    out.push_str(insert);
    out.push_str(&text[at + remove..]);
    out
}

/// Whole-file view with the edit shown in place.
///
/// The snapshot may predate the edit (contains `old_text`) or postdate it
/// (contains `new_text`, typical for snapshots backfilled from the working
/// copy). The other side is reconstructed by splicing. Returns None when the
/// snapshot contains neither.
fn render_in_file(record: &EditRecord, theme: &str) -> Option<RenderedDiff> {
    let snap = record.snapshot.as_str();
    let old = record.old_text.as_str();
    let new = record.new_text.as_str();

    let old_at_recorded_line = (!old.is_empty())
        .then(|| snap.find(old))
        .flatten()
        .filter(|&o| line_of(snap, o) + 1 == record.line_num);
    let new_anywhere = (!new.is_empty()).then(|| snap.find(new)).flatten();
    let old_anywhere = (!old.is_empty()).then(|| snap.find(old)).flatten();

    // (snapshot is pre-edit, byte offset of the changed region)
    let (pre_edit, offset) = match (old_at_recorded_line, new_anywhere, old_anywhere) {
        (Some(o), _, _) => (true, o),
        (None, Some(o), _) => (false, o),
        (None, None, Some(o)) => (true, o),
        (None, None, None) => return None,
    };

    let (before, after) = if pre_edit {
        (snap.to_string(), splice(snap, offset, old.len(), new))
    } else {
        (splice(snap, offset, new.len(), old), snap.to_string())
    };
    let start = line_of(snap, offset);
    let before_lines: Vec<&str> = before.lines().collect();
    let after_lines: Vec<&str> = after.lines().collect();

    // Lines of the changed region on each side. Everything outside it is
    // identical, so one side's span follows from the other's.
    let spanned = if pre_edit {
        lines_spanned(snap, offset, old.len())
    } else {
        lines_spanned(snap, offset, new.len())
    };
    let (n_removed, n_added) = if pre_edit {
        let m = (after_lines.len() + spanned).saturating_sub(before_lines.len());
        (spanned, m)
    } else {
        let n = (before_lines.len() + spanned).saturating_sub(after_lines.len());
        (n, spanned)
    };

    let highlighted = highlight::highlight_file(Path::new(&record.path), snap, theme);
    let snap_lines: Vec<&str> = snap.lines().collect();
    let context = |i: usize| -> Vec<Span<'static>> {
        highlighted
            .get(i)
            .cloned()
            .unwrap_or_else(|| vec![Span::raw(snap_lines.get(i).copied().unwrap_or("").to_string())])
    };

    let mut b = DiffBuilder::default();
    for i in 0..start.min(snap_lines.len()) {
        b.row(LineKind::Context, Some(i + 1), context(i));
    }
    b.header(format!(
        "@@ -{},{} +{},{} @@  +{} -{}",
        start + 1,
        n_removed,
        start + 1,
        n_added,
        n_added,
        n_removed
    ));
    for k in 0..n_removed {
        let text = before_lines.get(start + k).copied().unwrap_or("");
        b.plain_row(LineKind::Removed, Some(start + k + 1), text);
    }
    for k in 0..n_added {
        let text = after_lines.get(start + k).copied().unwrap_or("");
        b.plain_row(LineKind::Added, Some(start + k + 1), text);
    }
    // Trailing context comes from the snapshot side so it can use highlighting.
    let snap_tail = start + if pre_edit { n_removed } else { n_added };
    let new_tail = start + n_added;
    for (k, i) in (snap_tail..snap_lines.len()).enumerate() {
        b.row(LineKind::Context, Some(new_tail + k + 1), context(i));
    }
    Some(b.finish())
}

/// Line diff of just the replaced and replacement text.
fn render_fragments(record: &EditRecord) -> RenderedDiff {
    let old = record.old_text.as_str();
    let new = record.new_text.as_str();
    let start = record.line_num.max(1);
    let mut b = DiffBuilder::default();
    b.header(format!(
        "@@ -{},{} +{},{} @@",
        start,
        old.lines().count(),
        start,
        new.lines().count()
    ));
    let (mut old_no, mut new_no) = (start, start);
    for change in TextDiff::from_lines(old, new).iter_all_changes() {
        let text = change.value().trim_end_matches(['\n', '\r']);
        match change.tag() {
            ChangeTag::Delete => {
                b.plain_row(LineKind::Removed, Some(old_no), text);
                old_no += 1;
            }
            ChangeTag::Insert => {
                b.plain_row(LineKind::Added, Some(new_no), text);
                new_no += 1;
            }
            ChangeTag::Equal => {
                b.plain_row(LineKind::Context, Some(new_no), text);
                old_no += 1;
                new_no += 1;
            }
        }
    }
    b.finish()
}

// ── Cache ─────────────────────────────────────────────────────────────────────

pub struct DiffCache {
    entries: HashMap<usize, RenderedDiff>,
    vcs: Workspace,
    theme: String,
}

impl DiffCache {
    pub fn new(root: PathBuf, theme: impl Into<String>) -> Self {
        Self {
            entries: HashMap::new(),
            vcs: Workspace::new(root),
            theme: theme.into(),
        }
    }

    /// Rendered diff for `records[index]`, rendering (and backfilling the
    /// record's snapshot) on a miss.
    pub fn get(&mut self, index: usize, records: &mut [EditRecord]) -> Option<&RenderedDiff> {
        let record = records.get_mut(index)?;
        if !self.entries.contains_key(&index) {
            backfill_snapshot(&self.vcs, record);
            let rendered = render(record, &self.theme);
            self.entries.insert(index, rendered);
        }
        self.entries.get(&index)
    }

    /// Cached entry only; never renders.
    pub fn peek(&self, index: usize) -> Option<&RenderedDiff> {
        self.entries.get(&index)
    }

    /// Horizontally scrolled view, rendered fresh from the record on every
    /// call. Bypasses the cache in both directions.
    pub fn render_shifted(&self, index: usize, records: &mut [EditRecord], h: usize) -> Option<RenderedDiff> {
        let record = records.get_mut(index)?;
        backfill_snapshot(&self.vcs, record);
        Some(render(record, &self.theme).shifted(h))
    }

    /// Warm the entries either side of `index`.
    pub fn prefetch_adjacent(&mut self, index: usize, records: &mut [EditRecord]) {
        for i in [index.checked_sub(1), index.checked_add(1)].into_iter().flatten() {
            let _ = self.get(i, records);
        }
    }

    pub fn invalidate(&mut self, index: usize) {
        self.entries.remove(&index);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
impl DiffCache {
    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
impl RenderedDiff {
    /// Text content without styling, one row per line.
    pub fn plain_text(&self) -> String {
        self.lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fill an empty snapshot from VCS at the record's commit, else from the
/// file as it is now. Writes of new content never need one.
fn backfill_snapshot(vcs: &Workspace, record: &mut EditRecord) {
    if !record.snapshot.is_empty() || record.tool == Tool::Write {
        return;
    }
    let path = Path::new(&record.path);
    let mut content = String::new();
    if !record.commit_long.is_empty() && record.vcs != VcsKind::None {
        content = vcs.file_at_commit(path, &record.commit_long, record.vcs);
    }
    if content.is_empty() {
        content = fs::read_to_string(path).unwrap_or_default();
    }
    record.snapshot = content;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn edit(old: &str, new: &str, snapshot: &str, line_num: usize) -> EditRecord {
        EditRecord {
            timestamp: Utc::now(),
            path: "/nonexistent/x.rs".to_string(),
            tool: Tool::Edit,
            old_text: old.to_string(),
            new_text: new.to_string(),
            snapshot: snapshot.to_string(),
            line_num,
            line_count: 1,
            commit_long: String::new(),
            commit_short: String::new(),
            vcs: VcsKind::None,
        }
    }

    fn cache() -> DiffCache {
        DiffCache::new(PathBuf::from("/nonexistent"), highlight::DEFAULT_THEME)
    }

    #[test]
    fn test_in_file_header_and_counts() {
        let r = edit("b", "B", "a\nb\nc\n", 2);
        let d = render(&r, highlight::DEFAULT_THEME);
        let text = d.plain_text();
        assert!(text.contains("@@ -2,1 +2,1 @@"), "{text}");
        assert_eq!((d.added, d.removed), (1, 1));
        assert_eq!(d.kinds[0], LineKind::Context);
        assert_eq!(d.kinds[d.hunk_row], LineKind::Header);
        assert!(text.contains("- b"));
        assert!(text.contains("+ B"));
        assert!(text.ends_with("c"));
    }

    #[test]
    fn test_in_file_multiline_replacement() {
        let r = edit("b\nc", "x", "a\nb\nc\nd\n", 2);
        let d = render(&r, highlight::DEFAULT_THEME);
        assert!(d.plain_text().contains("@@ -2,2 +2,1 @@"));
        assert_eq!((d.added, d.removed), (1, 2));
        // a, header, -b, -c, +x, d
        assert_eq!(d.len(), 6);
    }

    #[test]
    fn test_post_edit_snapshot_layout() {
        // snapshot already contains the replacement
        let r = edit("old line", "new line", "top\nnew line\nbottom\n", 7);
        let d = render(&r, highlight::DEFAULT_THEME);
        let text = d.plain_text();
        assert!(text.contains("@@ -2,1 +2,1 @@"), "{text}");
        assert!(text.contains("- old line"));
        assert!(text.contains("+ new line"));
    }

    #[test]
    fn test_multibyte_old_text_in_pre_edit_snapshot() {
        let r = edit("café", "cafe", "menu\ncafé\nend\n", 2);
        let d = render(&r, highlight::DEFAULT_THEME);
        let text = d.plain_text();
        assert!(text.contains("@@ -2,1 +2,1 @@"), "{text}");
        assert!(text.contains("- café"));
        assert!(text.contains("+ cafe"));
    }

    #[test]
    fn test_multibyte_new_text_in_post_edit_snapshot() {
        let r = edit("cafe", "café", "menu\ncafé\nend\n", 2);
        let d = render(&r, highlight::DEFAULT_THEME);
        let text = d.plain_text();
        assert!(text.contains("@@ -2,1 +2,1 @@"), "{text}");
        assert!(text.contains("- cafe"));
        assert!(text.contains("+ café"));
    }

    #[test]
    fn test_multiline_edit_ending_in_emoji() {
        let r = edit("a\nb", "x\n日本 🚀", "top\na\nb\nend\n", 2);
        let d = render(&r, highlight::DEFAULT_THEME);
        let text = d.plain_text();
        assert!(text.contains("@@ -2,2 +2,2 @@"), "{text}");
        assert!(text.contains("+ 日本 🚀"));
        assert_eq!((d.added, d.removed), (2, 2));
    }

    #[test]
    fn test_line_of_inside_multibyte_char() {
        // byte 9 is the second byte of 'é'
        assert_eq!(line_of("menu\ncafé\n", 9), 1);
        assert_eq!(lines_spanned("menu\ncafé\n", 5, "café".len()), 1);
    }

    #[test]
    fn test_snapshot_without_either_side_falls_back_to_fragments() {
        let r = edit("foo", "bar", "unrelated\n", 4);
        let d = render(&r, highlight::DEFAULT_THEME);
        let text = d.plain_text();
        assert!(text.starts_with("@@ -4,1 +4,1 @@"));
        assert!(text.contains("- foo"));
        assert!(text.contains("+ bar"));
    }

    #[test]
    fn test_write_is_numbered_and_truncated() {
        let mut r = edit("", "", "", 1);
        r.tool = Tool::Write;
        r.new_text = "x".repeat(WRITE_PREVIEW_LIMIT + 50);
        let d = render(&r, highlight::DEFAULT_THEME);
        assert_eq!(d.kinds.last(), Some(&LineKind::Note));
        assert!(d.plain_text().contains("50 more characters"));

        r.new_text = "one\ntwo".to_string();
        let d = render(&r, highlight::DEFAULT_THEME);
        let text = d.plain_text();
        assert!(text.contains("    1 + one"));
        assert!(text.contains("    2 + two"));
        assert_eq!(d.added, 2);
    }

    #[test]
    fn test_empty_record_sentinel() {
        let d = render(&edit("", "", "", 1), highlight::DEFAULT_THEME);
        assert_eq!(d.plain_text(), EMPTY_DIFF_TEXT);
    }

    #[test]
    fn test_shift_keeps_gutter() {
        let r = edit("abcdef", "ghijkl", "", 1);
        let d = render(&r, highlight::DEFAULT_THEME);
        let shifted = d.shifted(3);
        let text = shifted.plain_text();
        assert!(text.contains("    1 - def"));
        assert!(text.contains("    1 + jkl"));
        // header untouched
        assert!(text.starts_with("@@ -1,1 +1,1 @@"));
        // shifting past the end leaves an empty content column
        assert!(d.shifted(100).plain_text().contains("    1 - "));
    }

    #[test]
    fn test_cache_invalidate_rerenders_same_index() {
        let mut records = vec![edit("a", "b", "", 1)];
        let mut c = cache();
        assert!(c.get(0, &mut records).unwrap().plain_text().contains("+ b"));
        records[0] = edit("a", "zzz", "", 1);
        // stale until invalidated
        assert!(c.get(0, &mut records).unwrap().plain_text().contains("+ b"));
        c.invalidate(0);
        assert!(c.get(0, &mut records).unwrap().plain_text().contains("+ zzz"));
    }

    #[test]
    fn test_shifted_render_bypasses_cache() {
        let mut records = vec![edit("abcdef", "ghijkl", "", 1)];
        let mut c = cache();
        let shifted = c.render_shifted(0, &mut records, 2).unwrap();
        assert!(shifted.plain_text().contains("    1 + ijkl"));
        assert!(c.is_empty());

        assert!(c.get(0, &mut records).unwrap().plain_text().contains("+ ghijkl"));
        records[0] = edit("abcdef", "mnopqr", "", 1);
        // the cached entry is stale, the shifted view is not
        let shifted = c.render_shifted(0, &mut records, 2).unwrap();
        assert!(shifted.plain_text().contains("    1 + opqr"));
        assert!(c.peek(0).unwrap().plain_text().contains("+ ghijkl"));
        assert!(c.render_shifted(5, &mut records, 2).is_none());
    }

    #[test]
    fn test_prefetch_adjacent() {
        let mut records: Vec<EditRecord> = (0..5).map(|i| edit("a", &format!("n{i}"), "", 1)).collect();
        let mut c = cache();
        c.prefetch_adjacent(2, &mut records);
        assert!(c.contains(1) && c.contains(3));
        assert!(!c.contains(2));
        c.prefetch_adjacent(0, &mut records);
        assert!(c.contains(1));
        c.prefetch_adjacent(4, &mut records);
        assert_eq!(c.len(), 2);
        assert!(c.get(9, &mut records).is_none());
    }

    #[test]
    fn test_backfill_reads_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "one\nTWO\nthree\n").unwrap();
        let mut r = edit("two", "TWO", "", 2);
        r.path = file.to_string_lossy().into_owned();
        let mut records = vec![r];
        let mut c = DiffCache::new(dir.path().to_path_buf(), highlight::DEFAULT_THEME);
        let text = c.get(0, &mut records).unwrap().plain_text();
        assert_eq!(records[0].snapshot, "one\nTWO\nthree\n");
        assert!(text.contains("@@ -2,1 +2,1 @@"));
        assert!(text.contains("- two"));
    }
}
