/// Prompts view: the prompt library on the left, the selected prompt on the
/// right.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{List, ListItem, Paragraph, Wrap},
};

use super::render::{MUTED, empty_hint, focused, pane_block, split_panes, truncate_path};
use super::{AppState, PaneFocus};

pub fn draw(f: &mut Frame, state: &AppState, area: Rect) {
    let (left, right) = split_panes(state, area);
    if let Some(left) = left {
        draw_list(f, state, left);
    }
    draw_preview(f, state, right);
}

fn draw_list(f: &mut Frame, state: &AppState, area: Rect) {
    let is_focused = focused(state, PaneFocus::Left);
    let title = if state.prompts.refining {
        format!("Prompts ({}) · refining", state.prompts.entries.len())
    } else {
        format!("Prompts ({})", state.prompts.entries.len())
    };
    let block = pane_block(title, is_focused);
    let inner = block.inner(area);
    f.render_widget(block, area);

    if let Some(err) = &state.prompts.error {
        f.render_widget(
            Paragraph::new(empty_hint("Cannot read prompts.", err)).wrap(Wrap { trim: false }),
            inner,
        );
        return;
    }
    if state.prompts.entries.is_empty() {
        f.render_widget(
            Paragraph::new(empty_hint(
                &format!("No prompts in {}", state.config.prompts_dir.display()),
                &format!("{} n to create one", state.leader_key.label()),
            )),
            inner,
        );
        return;
    }

    let rows = inner.height as usize;
    let width = inner.width as usize;
    let items: Vec<ListItem> = state
        .prompts
        .entries
        .iter()
        .enumerate()
        .skip(state.prompts.list_scroll)
        .take(rows)
        .map(|(i, p)| {
            let selected = i == state.prompts.selected;
            let base = if selected {
                Style::default().bg(if is_focused {
                    Color::Rgb(30, 30, 60)
                } else {
                    Color::Rgb(20, 20, 35)
                })
            } else {
                Style::default()
            };
            let mut spans = vec![
                Span::styled(if selected { "▸ " } else { "  " }, base.fg(Color::Cyan)),
                Span::styled(
                    truncate_path(&p.name, width.saturating_sub(4)),
                    if selected {
                        base.fg(Color::White).add_modifier(Modifier::BOLD)
                    } else {
                        base.fg(Color::Gray)
                    },
                ),
            ];
            if !p.tags.is_empty() {
                spans.push(Span::styled(
                    format!("  #{}", p.tags.join(" #")),
                    base.fg(MUTED),
                ));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    f.render_widget(List::new(items), inner);
}

fn draw_preview(f: &mut Frame, state: &AppState, area: Rect) {
    let is_focused = focused(state, PaneFocus::Right);
    let Some(prompt) = state.prompts.selected_entry() else {
        let block = pane_block("Preview", is_focused);
        f.render_widget(Paragraph::new(Vec::<Line>::new()).block(block), area);
        return;
    };

    let mut lines: Vec<Line> = Vec::new();
    if !prompt.description.is_empty() {
        lines.push(Line::from(Span::styled(
            prompt.description.clone(),
            Style::default().fg(Color::Rgb(100, 180, 220)).add_modifier(Modifier::ITALIC),
        )));
    }
    if !prompt.tags.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("tags: {}", prompt.tags.join(", ")),
            Style::default().fg(MUTED),
        )));
    }
    if !lines.is_empty() {
        lines.push(Line::raw(""));
    }
    lines.extend(prompt.body.lines().map(|l| Line::raw(l.to_string())));

    let block = pane_block(prompt.name.clone(), is_focused).title_bottom(Line::from(Span::styled(
        format!(" {} ", prompt.path.display()),
        Style::default().fg(Color::DarkGray),
    )));
    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((state.prompts.preview_scroll.min(u16::MAX as usize) as u16, 0)),
        area,
    );
}
