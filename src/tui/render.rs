/// Ratatui draw entry-point for hookline.
/// Thin dispatcher: each mode draws its own body; overlays, toasts and the
/// leader menu are layered on top.
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};
use unicode_width::UnicodeWidthStr;

use super::toast::ToastKind;
use super::{AppState, Overlay, PaneFocus, ViewMode, leader};

pub const PANE_BG: Color = Color::Rgb(8, 8, 14);
pub const DIM: Color = Color::Rgb(60, 55, 90);
pub const MUTED: Color = Color::Rgb(70, 65, 100);
const TOAST_MAX_WIDTH: u16 = 56;

// ── Main draw entry point ─────────────────────────────────────────────────────

pub fn draw(f: &mut Frame, state: &AppState) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // mode bar
            Constraint::Min(0),    // body
            Constraint::Length(1), // status bar
        ])
        .split(area);

    draw_mode_bar(f, state, chunks[0]);

    match state.mode {
        ViewMode::History => super::history_view::draw(f, state, chunks[1]),
        ViewMode::Prompts => super::prompts_view::draw(f, state, chunks[1]),
        ViewMode::Ralph => super::ralph_view::draw(f, state, chunks[1]),
        ViewMode::Plan => super::plan_view::draw(f, state, chunks[1]),
        ViewMode::Context => super::context_view::draw(f, state, chunks[1]),
    }

    draw_status_bar(f, state, chunks[2]);

    match &state.overlay {
        Overlay::None => {}
        Overlay::Help => super::overlays::draw_help(f, state, area),
        Overlay::ConfirmClear => super::overlays::draw_confirm_clear(f, state, area),
        Overlay::PlanInput(textarea) => super::overlays::draw_plan_input(f, textarea, area),
    }

    if state.leader.is_active() {
        draw_leader_menu(f, state, chunks[1]);
    }
    draw_toasts(f, state, chunks[1]);
}

// ── Shared pane helpers ───────────────────────────────────────────────────────

/// Left/right split for two-pane modes; no left rect when it is hidden.
pub fn split_panes(state: &AppState, area: Rect) -> (Option<Rect>, Rect) {
    if state.hide_left_pane {
        return (None, area);
    }
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(32), Constraint::Min(0)])
        .split(area);
    (Some(cols[0]), cols[1])
}

pub fn pane_block(title: impl Into<String>, focused: bool) -> Block<'static> {
    let (border, title_style) = if focused {
        (
            Style::default().fg(Color::Cyan),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )
    } else {
        (Style::default().fg(DIM), Style::default().fg(Color::Gray))
    };
    Block::default()
        .title(Span::styled(format!(" {} ", title.into()), title_style))
        .borders(Borders::ALL)
        .border_style(border)
        .style(Style::default().bg(PANE_BG))
}

pub fn focused(state: &AppState, pane: PaneFocus) -> bool {
    state.effective_focus() == pane
}

/// Placeholder for an empty pane: a message and a dimmer hint below it.
pub fn empty_hint(message: &str, hint: &str) -> Vec<Line<'static>> {
    vec![
        Line::raw(""),
        Line::from(vec![
            Span::raw("  "),
            Span::styled(message.to_string(), Style::default().fg(Color::DarkGray)),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled(
                hint.to_string(),
                Style::default().fg(MUTED).add_modifier(Modifier::ITALIC),
            ),
        ]),
    ]
}

/// Keep the tail of `path` within `max` display columns.
pub fn truncate_path(path: &str, max: usize) -> String {
    if path.width() <= max {
        return path.to_string();
    }
    let mut tail: Vec<char> = Vec::new();
    let mut width = 1; // the ellipsis
    for c in path.chars().rev() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > max {
            break;
        }
        width += w;
        tail.push(c);
    }
    tail.reverse();
    format!("…{}", tail.into_iter().collect::<String>())
}

/// Rect of at most `width`×`height`, centred in `area`.
pub fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(2));
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}

/// `[████░░░░]` style gauge.
pub fn bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}

// ── Mode bar ──────────────────────────────────────────────────────────────────

fn draw_mode_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for (i, mode) in ViewMode::ALL.iter().enumerate() {
        let active = state.mode == *mode;
        let style = if active {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(DIM)
        };
        spans.push(Span::styled(format!("[{}] {}", i + 1, mode.label()), style));
        spans.push(Span::raw("  "));
    }

    let workspace = state
        .workspace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| state.workspace.display().to_string());
    spans.push(Span::styled(
        format!("  {workspace}"),
        Style::default().fg(Color::Rgb(100, 180, 220)),
    ));

    f.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(6, 6, 12))),
        area,
    );
}

// ── Status bar ────────────────────────────────────────────────────────────────

fn draw_status_bar(f: &mut Frame, state: &AppState, area: Rect) {
    let sep = || Span::styled("  ·  ", Style::default().fg(Color::DarkGray));

    let mut spans = vec![
        Span::raw(" "),
        Span::styled("▲", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::styled(" hookline", Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
        Span::raw("  "),
    ];

    if state.leader.is_active() {
        spans.push(Span::styled(
            " LEADER ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw("  "));
    }

    let len = state.history.len();
    let position = if len == 0 {
        "no edits".to_string()
    } else {
        format!("edit {}/{len}", state.selected_visual() + 1)
    };
    spans.push(Span::styled(position, Style::default().fg(Color::Cyan)));

    if let Some(r) = state.selected_record() {
        if !r.commit_short.is_empty() {
            spans.push(sep());
            spans.push(Span::styled(
                format!("{} {}", r.vcs.as_str(), r.commit_short),
                Style::default().fg(Color::Rgb(140, 120, 220)),
            ));
        }
    }

    spans.push(sep());
    let (glyph, label, color) = match (&state.daemon.status, state.daemon.connected) {
        (Some(s), true) if !s.uptime_str.is_empty() => {
            ("●", format!(" daemon up {}", s.uptime_str), Color::Green)
        }
        (_, true) => ("●", " daemon".to_string(), Color::Green),
        (_, false) => ("○", " daemon offline".to_string(), Color::DarkGray),
    };
    spans.push(Span::styled(glyph, Style::default().fg(color)));
    spans.push(Span::styled(label, Style::default().fg(color)));

    if !state.mode.single_pane() {
        spans.push(sep());
        let pane = match state.effective_focus() {
            PaneFocus::Left => "list",
            PaneFocus::Right => "detail",
        };
        spans.push(Span::styled(pane, Style::default().fg(Color::Gray)));
    }

    spans.push(Span::styled(
        format!("   Tab modes  ? help  {} leader  q quit", state.leader_key.label()),
        Style::default().fg(Color::Rgb(55, 50, 90)),
    ));

    f.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Rgb(10, 10, 18))),
        area,
    );
}

// ── Leader menu ───────────────────────────────────────────────────────────────

fn draw_leader_menu(f: &mut Frame, state: &AppState, area: Rect) {
    let bindings = leader::bindings(state.effective_focus(), state.mode);
    let width = 32u16.min(area.width);
    let height = (bindings.len() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y + area.height.saturating_sub(height),
        width,
        height,
    };
    f.render_widget(Clear, popup);

    let lines: Vec<Line> = bindings
        .iter()
        .map(|b| {
            Line::from(vec![
                Span::styled(
                    format!("  {}  ", b.key),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                ),
                Span::styled(b.label, Style::default().fg(Color::Gray)),
            ])
        })
        .collect();

    let block = Block::default()
        .title(Span::styled(
            format!(" {} ", state.leader_key.label()),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .style(Style::default().bg(Color::Rgb(12, 12, 20)));
    f.render_widget(Paragraph::new(lines).block(block), popup);
}

// ── Toasts ────────────────────────────────────────────────────────────────────

fn toast_color(kind: ToastKind) -> Color {
    match kind {
        ToastKind::Info => Color::Cyan,
        ToastKind::Success => Color::Green,
        ToastKind::Warning => Color::Yellow,
        ToastKind::Error => Color::Red,
    }
}

fn toast_glyph(kind: ToastKind) -> &'static str {
    match kind {
        ToastKind::Info => "ℹ",
        ToastKind::Success => "✓",
        ToastKind::Warning => "!",
        ToastKind::Error => "✗",
    }
}

/// Stacked top-right, oldest on top; one bordered box per toast.
fn draw_toasts(f: &mut Frame, state: &AppState, area: Rect) {
    let mut y = area.y;
    for toast in state.toasts.iter() {
        if y + 3 > area.y + area.height {
            break;
        }
        let text = format!("{} {}", toast_glyph(toast.kind), toast.message);
        let width = (text.width() as u16 + 4).min(TOAST_MAX_WIDTH).min(area.width);
        let rect = Rect {
            x: area.x + area.width.saturating_sub(width + 1),
            y,
            width,
            height: 3,
        };
        let color = toast_color(toast.kind);
        f.render_widget(Clear, rect);
        f.render_widget(
            Paragraph::new(Line::from(Span::styled(
                truncate_path(&text, width.saturating_sub(2) as usize),
                Style::default().fg(color),
            )))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(color))
                    .style(Style::default().bg(Color::Rgb(12, 12, 20))),
            ),
            rect,
        );
        y += 3;
    }
}
