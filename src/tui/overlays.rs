/// Modal popups: key help, clear-history confirmation, plan task input.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};
use tui_textarea::TextArea;

use super::render::centered;
use super::{AppState, ViewMode, leader};

fn popup_block(title: &str, color: Color) -> Block<'static> {
    Block::default()
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .style(Style::default().bg(Color::Rgb(8, 8, 14)))
}

fn key_line(key: &str, label: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {key:<14}"), Style::default().fg(Color::Cyan)),
        Span::styled(label.to_string(), Style::default().fg(Color::Gray)),
    ])
}

fn section(title: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!(" {title}"),
        Style::default().fg(Color::Rgb(200, 160, 50)).add_modifier(Modifier::BOLD),
    ))
}

/// Keys of the current mode, beyond the global ones.
fn mode_keys(mode: ViewMode) -> &'static [(&'static str, &'static str)] {
    match mode {
        ViewMode::History => &[
            ("j/k ↓/↑", "older / newer edit (list), scroll (diff)"),
            ("g/G", "newest / oldest edit"),
            ("PgDn/PgUp", "page"),
            ("h/l ←/→", "scroll diff sideways"),
            ("0", "reset sideways scroll"),
            ("J/K", "older / newer edit from the diff"),
        ],
        ViewMode::Prompts => &[
            ("j/k", "select prompt / scroll preview"),
            ("Enter/y", "copy prompt"),
            ("e", "edit prompt"),
        ],
        ViewMode::Ralph => &[("j/k", "scroll"), ("r", "reload state")],
        ViewMode::Plan => &[
            ("j/k", "select plan / scroll"),
            ("g", "generate a plan"),
        ],
        ViewMode::Context => &[("j/k", "scroll"), ("r", "refresh")],
    }
}

pub fn draw_help(f: &mut Frame, state: &AppState, area: Rect) {
    let mut lines = vec![
        section("Global"),
        key_line("Tab/S-Tab", "next / previous mode"),
        key_line("1-5", "jump to mode"),
        key_line("[ / ]", "focus list / detail pane"),
        key_line("?", "this help"),
        key_line("q Ctrl+C", "quit"),
        Line::raw(""),
        section(state.mode.label()),
    ];
    lines.extend(mode_keys(state.mode).iter().map(|(k, l)| key_line(k, l)));
    lines.push(Line::raw(""));
    lines.push(section(&format!("{} then", state.leader_key.label())));
    lines.extend(
        leader::bindings(state.effective_focus(), state.mode)
            .iter()
            .map(|b| key_line(&b.key.to_string(), b.label)),
    );
    lines.push(Line::raw(""));
    lines.push(Line::from(Span::styled(
        "  any key closes",
        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
    )));

    let popup = centered(area, 64, lines.len() as u16 + 2);
    f.render_widget(Clear, popup);
    f.render_widget(Paragraph::new(lines).block(popup_block("Keys", Color::Cyan)), popup);
}

pub fn draw_confirm_clear(f: &mut Frame, state: &AppState, area: Rect) {
    let n = state.history.len();
    let lines = vec![
        Line::raw(""),
        Line::from(vec![
            Span::raw("  Delete all "),
            Span::styled(n.to_string(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
            Span::raw(if n == 1 { " edit from history?" } else { " edits from history?" }),
        ]),
        Line::raw(""),
        Line::from(vec![
            Span::styled("  y", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            Span::styled(" clear   ", Style::default().fg(Color::DarkGray)),
            Span::styled("any other key", Style::default().fg(Color::Cyan)),
            Span::styled(" cancel", Style::default().fg(Color::DarkGray)),
        ]),
    ];
    let popup = centered(area, 44, 6);
    f.render_widget(Clear, popup);
    f.render_widget(Paragraph::new(lines).block(popup_block("Clear history", Color::Red)), popup);
}

pub fn draw_plan_input(f: &mut Frame, textarea: &TextArea<'static>, area: Rect) {
    let popup = centered(area, 70, 8);
    f.render_widget(Clear, popup);
    let block = popup_block("Generate plan", Color::Cyan).title_bottom(Line::from(Span::styled(
        " Enter generate · Esc cancel ",
        Style::default().fg(Color::DarkGray),
    )));
    let inner = block.inner(popup);
    f.render_widget(block, popup);
    f.render_widget(textarea, inner);
}
