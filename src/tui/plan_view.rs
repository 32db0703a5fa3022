/// Plan view: saved and announced plans on the left, the selected plan's
/// markdown on the right.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, Paragraph, Wrap},
};

use super::render::{MUTED, empty_hint, focused, pane_block, split_panes, truncate_path};
use super::{AppState, PaneFocus};
use crate::plan;

pub fn draw(f: &mut Frame, state: &AppState, area: Rect) {
    let (left, right) = split_panes(state, area);
    if let Some(left) = left {
        draw_list(f, state, left);
    }
    draw_content(f, state, right);
}

fn draw_list(f: &mut Frame, state: &AppState, area: Rect) {
    let is_focused = focused(state, PaneFocus::Left);
    let title = if state.plan.generating {
        "Plans · generating".to_string()
    } else {
        format!("Plans ({})", state.plan.files.len())
    };
    let block = pane_block(title, is_focused);
    let inner = block.inner(area);
    f.render_widget(block, area);

    if state.plan.files.is_empty() {
        f.render_widget(
            Paragraph::new(empty_hint("No plans yet.", "press g to generate one")),
            inner,
        );
        return;
    }

    let width = inner.width as usize;
    let items: Vec<ListItem> = state
        .plan
        .files
        .iter()
        .enumerate()
        .take(inner.height as usize)
        .map(|(i, path)| {
            let selected = i == state.plan.selected;
            let announced = state.plan.announced.as_ref() == Some(path);
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let base = if selected {
                Style::default().bg(if is_focused {
                    Color::Rgb(30, 30, 60)
                } else {
                    Color::Rgb(20, 20, 35)
                })
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    if announced { "◆ " } else { "  " },
                    base.fg(Color::Rgb(200, 160, 50)),
                ),
                Span::styled(
                    truncate_path(&name, width.saturating_sub(2)),
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

fn draw_content(f: &mut Frame, state: &AppState, area: Rect) {
    let is_focused = focused(state, PaneFocus::Right);
    let title = plan::plan_title(&state.plan.content)
        .map(str::to_string)
        .unwrap_or_else(|| "Plan".to_string());
    let block = pane_block(title, is_focused);

    let lines = if let Some(err) = &state.plan.error {
        empty_hint("Cannot read plan.", err)
    } else if state.plan.content.is_empty() {
        empty_hint(
            "No plan selected.",
            &format!("{} g generates a plan for a task", state.leader_key.label()),
        )
    } else {
        markdown_lines(&state.plan.content)
    };

    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((state.plan.scroll.min(u16::MAX as usize) as u16, 0)),
        area,
    );
}

/// Light markdown styling: headings, list markers, fenced code.
pub fn markdown_lines(md: &str) -> Vec<Line<'static>> {
    let mut in_code = false;
    md.lines()
        .map(|raw| {
            if raw.trim_start().starts_with("```") {
                in_code = !in_code;
                return Line::from(Span::styled(raw.to_string(), Style::default().fg(MUTED)));
            }
            if in_code {
                return Line::from(Span::styled(
                    raw.to_string(),
                    Style::default().fg(Color::Rgb(140, 140, 160)),
                ));
            }
            if let Some(h) = raw.strip_prefix("# ") {
                Line::from(Span::styled(
                    h.to_string(),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ))
            } else if let Some(h) = raw.strip_prefix("## ").or_else(|| raw.strip_prefix("### ")) {
                Line::from(Span::styled(
                    h.to_string(),
                    Style::default().fg(Color::Rgb(100, 180, 220)).add_modifier(Modifier::BOLD),
                ))
            } else if let Some((marker, rest)) = list_marker(raw) {
                Line::from(vec![
                    Span::styled(marker, Style::default().fg(Color::Rgb(200, 160, 50))),
                    Span::raw(rest.to_string()),
                ])
            } else {
                Line::raw(raw.to_string())
            }
        })
        .collect()
}

/// Split `- item` / `1. item` into (indent + marker, rest).
fn list_marker(line: &str) -> Option<(String, &str)> {
    let trimmed = line.trim_start();
    let indent = line.len() - trimmed.len();
    if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        return Some((format!("{}• ", " ".repeat(indent)), rest));
    }
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        if let Some(rest) = trimmed[digits..].strip_prefix(". ") {
            return Some((format!("{}{}. ", " ".repeat(indent), &trimmed[..digits]), rest));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_marker() {
        assert_eq!(list_marker("- a"), Some(("• ".to_string(), "a")));
        assert_eq!(list_marker("  12. step"), Some(("  12. ".to_string(), "step")));
        assert_eq!(list_marker("plain"), None);
        assert_eq!(list_marker("2024 was"), None);
    }

    #[test]
    fn test_code_fence_not_styled_as_heading() {
        let lines = markdown_lines("```\n# not a heading\n```\n# Title");
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1].spans[0].content, "# not a heading");
        assert_eq!(lines[3].spans[0].content, "Title");
    }
}
