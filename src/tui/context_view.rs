/// Context view: workspace, revision, cluster, edit activity and notes.
use ratatui::{
    Frame,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
};

use super::AppState;
use super::render::{MUTED, empty_hint, pane_block};
use crate::context::ContextInfo;
use crate::vcs::VcsKind;

pub fn draw(f: &mut Frame, state: &AppState, area: Rect) {
    let title = if state.context.loading {
        "Context · refreshing"
    } else {
        "Context"
    };
    let block = pane_block(title, true);

    let lines = match (&state.context.info, &state.context.error) {
        (_, Some(err)) => empty_hint("Cannot gather context.", err),
        (Some(info), None) => info_lines(info, &state.leader_key.label()),
        (None, None) => empty_hint("Gathering context…", "r refreshes"),
    };

    f.render_widget(
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((state.context.scroll.min(u16::MAX as usize) as u16, 0)),
        area,
    );
}

fn row(name: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {name:<12}"), Style::default().fg(Color::DarkGray)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

fn heading(text: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("  {text}"),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    ))
}

pub fn info_lines(info: &ContextInfo, leader_label: &str) -> Vec<Line<'static>> {
    let mut lines = vec![
        Line::raw(""),
        row("workspace", info.workspace.display().to_string(), Color::White),
    ];

    if info.vcs == VcsKind::None {
        lines.push(row("vcs", "none".into(), Color::DarkGray));
    } else {
        lines.push(row(
            "revision",
            format!("{} {}", info.vcs.as_str(), info.commit_short),
            Color::Rgb(140, 120, 220),
        ));
        if !info.branch.is_empty() {
            lines.push(row("branch", info.branch.clone(), Color::Green));
        }
        if !info.description.is_empty() {
            lines.push(row("description", info.description.clone(), Color::Gray));
        }
    }
    if let Some(kube) = &info.kube_context {
        lines.push(row("kube", kube.clone(), Color::Rgb(100, 180, 220)));
    }

    lines.push(Line::raw(""));
    lines.push(heading("Activity"));
    lines.push(row(
        "edits",
        format!("{} across {} files", info.edit_count, info.distinct_files),
        Color::White,
    ));
    for (path, count) in &info.top_files {
        lines.push(Line::from(vec![
            Span::styled(format!("  {count:>5}  "), Style::default().fg(Color::Rgb(200, 160, 50))),
            Span::styled(path.clone(), Style::default().fg(Color::Gray)),
        ]));
    }

    lines.push(Line::raw(""));
    lines.push(heading("Notes"));
    match info.notes.as_deref().map(str::trim_end) {
        Some(notes) if !notes.is_empty() => {
            lines.extend(notes.lines().map(|l| Line::raw(format!("  {l}"))));
        }
        _ => lines.push(Line::from(Span::styled(
            format!("  none yet, {leader_label} o to write some"),
            Style::default().fg(MUTED).add_modifier(Modifier::ITALIC),
        ))),
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(lines: &[Line]) -> String {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_info_lines_without_vcs() {
        let info = ContextInfo {
            workspace: "/w".into(),
            edit_count: 3,
            distinct_files: 2,
            top_files: vec![("/w/a.rs".into(), 2), ("/w/b.rs".into(), 1)],
            ..Default::default()
        };
        let out = text(&info_lines(&info, "Ctrl+G"));
        assert!(out.contains("none"));
        assert!(out.contains("3 across 2 files"));
        assert!(out.contains("/w/a.rs"));
        assert!(out.contains("Ctrl+G o"));
    }

    #[test]
    fn test_info_lines_with_revision_and_notes() {
        let info = ContextInfo {
            workspace: "/w".into(),
            vcs: VcsKind::Git,
            commit_short: "abc1234".into(),
            branch: "main".into(),
            notes: Some("ship it\n".into()),
            ..Default::default()
        };
        let out = text(&info_lines(&info, "Ctrl+G"));
        assert!(out.contains("git abc1234"));
        assert!(out.contains("main"));
        assert!(out.contains("ship it"));
    }
}
