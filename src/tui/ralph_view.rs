/// Ralph view: status of the workspace's iterative agent loop.
use chrono::Utc;
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
};

use super::AppState;
use super::render::{bar, empty_hint, pane_block};
use crate::ralph::{self, RalphState};

pub fn draw(f: &mut Frame, state: &AppState, area: Rect) {
    let block = pane_block("Ralph loop", true);

    let lines = if let Some(err) = &state.ralph.error {
        empty_hint("Cannot read loop state.", err)
    } else if let Some(ralph) = &state.ralph.state {
        status_lines(ralph)
    } else {
        empty_hint(
            "No ralph loop in this workspace.",
            &format!("looking for {}", ralph::state_path(&state.workspace).display()),
        )
    };

    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((state.ralph.scroll.min(u16::MAX as usize) as u16, 0)),
        area,
    );
}

fn label(name: &str) -> Span<'static> {
    Span::styled(format!("  {name:<12}"), Style::default().fg(Color::DarkGray))
}

fn status_lines(ralph: &RalphState) -> Vec<Line<'static>> {
    let (status, color) = if ralph.active {
        ("● active", Color::Green)
    } else {
        ("○ stopped", Color::DarkGray)
    };

    let iteration = if ralph.max_iterations > 0 {
        format!("{} / {}", ralph.iteration, ralph.max_iterations)
    } else {
        format!("{} (no limit)", ralph.iteration)
    };

    let mut lines = vec![
        Line::raw(""),
        Line::from(vec![
            label("status"),
            Span::styled(status, Style::default().fg(color).add_modifier(Modifier::BOLD)),
        ]),
        Line::from(vec![
            label("iteration"),
            Span::styled(iteration, Style::default().fg(Color::White)),
        ]),
    ];

    if let Some(progress) = ralph.progress() {
        let gauge_color = match (progress * 100.0) as u32 {
            0..=50 => Color::Green,
            51..=80 => Color::Yellow,
            _ => Color::Red,
        };
        lines.push(Line::from(vec![
            label(""),
            Span::styled(bar(progress, 24), Style::default().fg(gauge_color)),
            Span::styled(
                format!(" {:.0}%", progress * 100.0),
                Style::default().fg(gauge_color).add_modifier(Modifier::BOLD),
            ),
        ]));
    }

    if let Some(promise) = &ralph.completion_promise {
        lines.push(Line::from(vec![
            label("promise"),
            Span::styled(promise.clone(), Style::default().fg(Color::Rgb(200, 160, 50))),
        ]));
    }

    if let Some(started) = ralph.started_at {
        let mut spans = vec![
            label("started"),
            Span::styled(
                started.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string(),
                Style::default().fg(Color::Gray),
            ),
        ];
        if let Some(elapsed) = ralph.elapsed(Utc::now()) {
            spans.push(Span::styled(
                format!("  ({} ago)", format_elapsed(elapsed)),
                Style::default().fg(Color::DarkGray),
            ));
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::raw(""));
    lines.push(Line::from(Span::styled(
        "  Prompt",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )));
    lines.extend(ralph.prompt.lines().map(|l| Line::raw(format!("  {l}"))));
    lines
}

pub fn format_elapsed(d: chrono::Duration) -> String {
    let secs = d.num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m{:02}s", secs / 60, secs % 60),
        _ => format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(125)), "2m05s");
        assert_eq!(format_elapsed(chrono::Duration::seconds(3 * 3600 + 12 * 60)), "3h12m");
        assert_eq!(format_elapsed(chrono::Duration::seconds(-5)), "0s");
    }

    #[test]
    fn test_status_lines_show_budget() {
        let ralph = RalphState {
            active: true,
            iteration: 3,
            max_iterations: 10,
            prompt: "fix the tests".into(),
            ..Default::default()
        };
        let text: Vec<String> = status_lines(&ralph)
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect();
        assert!(text.iter().any(|l| l.contains("3 / 10")));
        assert!(text.iter().any(|l| l.contains("30%")));
        assert!(text.iter().any(|l| l.contains("fix the tests")));
    }
}
