/// History view: newest-first edit list on the left, rendered diff with an
/// optional change minimap on the right.
use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, Paragraph},
};

use super::render::{empty_hint, focused, pane_block, split_panes, truncate_path};
use super::{AppState, PaneFocus};
use crate::diff::{LineKind, RenderedDiff};
use crate::history::Tool;

pub fn draw(f: &mut Frame, state: &AppState, area: Rect) {
    let (left, right) = split_panes(state, area);
    if let Some(left) = left {
        draw_list(f, state, left);
    }
    draw_diff(f, state, right);
}

// ── Edit list ─────────────────────────────────────────────────────────────────

fn draw_list(f: &mut Frame, state: &AppState, area: Rect) {
    let is_focused = focused(state, PaneFocus::Left);
    let block = pane_block(format!("Edits ({})", state.history.len()), is_focused);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let records = state.history.records();
    if records.is_empty() {
        f.render_widget(
            Paragraph::new(empty_hint(
                "Waiting for edits.",
                &format!("hooks post to {}", state.socket_path.display()),
            )),
            inner,
        );
        return;
    }

    let len = records.len();
    let rows = inner.height as usize;
    let start = state.list_scroll_offset.min(len.saturating_sub(1));
    let end = (start + rows).min(len);
    let name_width = (inner.width as usize).saturating_sub(18);

    let items: Vec<ListItem> = (start..end)
        .map(|visual| {
            let index = len - 1 - visual;
            let r = &records[index];
            let selected = index == state.selected_index;
            let time = r.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string();
            let location = format!("{}:{}", r.file_name(), r.line_num);

            let base = if selected {
                Style::default().bg(if is_focused {
                    Color::Rgb(30, 30, 60)
                } else {
                    Color::Rgb(20, 20, 35)
                })
            } else {
                Style::default()
            };
            let tool_color = match r.tool {
                Tool::Write => Color::Rgb(200, 160, 50),
                Tool::Edit => Color::Rgb(100, 180, 220),
                Tool::Other(_) => Color::Gray,
            };

            ListItem::new(Line::from(vec![
                Span::styled(if selected { "▸" } else { " " }, base.fg(Color::Cyan)),
                Span::styled(format!("{time} "), base.fg(Color::DarkGray)),
                Span::styled(format!("{:<6}", r.tool.to_string()), base.fg(tool_color)),
                Span::styled(
                    truncate_path(&location, name_width),
                    if selected {
                        base.fg(Color::White).add_modifier(Modifier::BOLD)
                    } else {
                        base.fg(Color::Gray)
                    },
                ),
            ]))
        })
        .collect();

    f.render_widget(List::new(items), inner);
}

// ── Diff pane ─────────────────────────────────────────────────────────────────

fn draw_diff(f: &mut Frame, state: &AppState, area: Rect) {
    let is_focused = focused(state, PaneFocus::Right);

    let Some(record) = state.selected_record() else {
        let block = pane_block("Diff", is_focused);
        let inner = block.inner(area);
        f.render_widget(block, area);
        f.render_widget(
            Paragraph::new(empty_hint("Nothing selected.", "edits appear here as they happen")),
            inner,
        );
        return;
    };

    let title = truncate_path(&record.path, (area.width as usize).saturating_sub(6));
    let mut block = pane_block(title, is_focused);
    if let Some(diff) = state.current_diff() {
        let mut footer = vec![
            Span::styled(format!(" +{}", diff.added), Style::default().fg(Color::Green)),
            Span::styled(format!(" -{}", diff.removed), Style::default().fg(Color::Red)),
        ];
        if !record.commit_short.is_empty() {
            footer.push(Span::styled(
                format!("  {} {}", record.vcs.as_str(), record.commit_short),
                Style::default().fg(Color::Rgb(140, 120, 220)),
            ));
        }
        if state.horizontal_scroll > 0 {
            footer.push(Span::styled(
                format!("  →{}", state.horizontal_scroll),
                Style::default().fg(Color::DarkGray),
            ));
        }
        footer.push(Span::raw(" "));
        block = block.title_bottom(Line::from(footer));
    }
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(diff) = state.current_diff() else {
        return;
    };

    let (text_area, minimap_area) = if state.show_minimap && inner.width > 12 {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(inner);
        (cols[0], Some(cols[1]))
    } else {
        (inner, None)
    };

    let rows = text_area.height as usize;
    let scroll = state.diff_scroll.min(diff.len().saturating_sub(rows));
    let visible: Vec<Line> = diff.lines.iter().skip(scroll).take(rows).cloned().collect();
    f.render_widget(Paragraph::new(visible), text_area);

    if let Some(mm) = minimap_area {
        draw_minimap(f, diff, scroll, rows, mm);
    }
}

// ── Minimap ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimapCell {
    Empty,
    Added,
    Removed,
    Mixed,
}

/// Compress `kinds` onto `height` cells; each cell reports the changes in
/// the slice of lines it covers.
pub fn minimap_cells(kinds: &[LineKind], height: usize) -> Vec<MinimapCell> {
    let len = kinds.len();
    (0..height)
        .map(|row| {
            let start = row * len / height;
            if start >= len {
                return MinimapCell::Empty;
            }
            let end = ((row + 1) * len / height).max(start + 1).min(len);
            let slice = &kinds[start..end];
            match (
                slice.contains(&LineKind::Added),
                slice.contains(&LineKind::Removed),
            ) {
                (true, true) => MinimapCell::Mixed,
                (true, false) => MinimapCell::Added,
                (false, true) => MinimapCell::Removed,
                (false, false) => MinimapCell::Empty,
            }
        })
        .collect()
}

/// Cells whose covered lines intersect the visible window.
fn in_viewport(row: usize, height: usize, len: usize, scroll: usize, rows: usize) -> bool {
    if len == 0 || height == 0 {
        return false;
    }
    let start = row * len / height;
    let end = ((row + 1) * len / height).max(start + 1);
    start < scroll + rows && end > scroll
}

fn draw_minimap(f: &mut Frame, diff: &RenderedDiff, scroll: usize, rows: usize, area: Rect) {
    let height = area.height as usize;
    let cells = minimap_cells(&diff.kinds, height);
    let lines: Vec<Line> = cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            let bg = if in_viewport(row, height, diff.len(), scroll, rows) {
                Color::Rgb(30, 30, 50)
            } else {
                Color::Rgb(8, 8, 14)
            };
            let (glyph, fg) = match cell {
                MinimapCell::Empty => ("│", Color::Rgb(40, 40, 60)),
                MinimapCell::Added => ("▐", Color::Green),
                MinimapCell::Removed => ("▐", Color::Red),
                MinimapCell::Mixed => ("▐", Color::Yellow),
            };
            Line::from(Span::styled(glyph, Style::default().fg(fg).bg(bg)))
        })
        .collect();
    f.render_widget(Paragraph::new(lines), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use LineKind::*;

    #[test]
    fn test_minimap_compresses_long_diffs() {
        let mut kinds = vec![Context; 100];
        kinds[5] = Removed;
        kinds[6] = Added;
        kinds[95] = Added;
        let cells = minimap_cells(&kinds, 10);
        assert_eq!(cells.len(), 10);
        assert_eq!(cells[0], MinimapCell::Mixed);
        assert_eq!(cells[9], MinimapCell::Added);
        assert!(cells[1..9].iter().all(|c| *c == MinimapCell::Empty));
    }

    #[test]
    fn test_minimap_stretches_short_diffs() {
        let cells = minimap_cells(&[Header, Added], 4);
        assert_eq!(
            cells,
            vec![
                MinimapCell::Empty,
                MinimapCell::Empty,
                MinimapCell::Added,
                MinimapCell::Added
            ]
        );
        assert!(minimap_cells(&[], 3).iter().all(|c| *c == MinimapCell::Empty));
    }

    #[test]
    fn test_viewport_marks_visible_rows() {
        // 100 lines on 10 cells, showing lines 50..60
        assert!(in_viewport(5, 10, 100, 50, 10));
        assert!(!in_viewport(4, 10, 100, 50, 10));
        assert!(!in_viewport(6, 10, 100, 50, 10));
    }
}
