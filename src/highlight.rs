/// Syntax highlighting for unchanged context lines in the diff view.
use std::path::Path;
use std::sync::OnceLock;

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Style as SynStyle, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Files above this size are shown without highlighting.
const MAX_HIGHLIGHT_BYTES: usize = 512 * 1024;

static SYNTAXES: OnceLock<SyntaxSet> = OnceLock::new();
static THEMES: OnceLock<ThemeSet> = OnceLock::new();

fn syntax_set() -> &'static SyntaxSet {
    SYNTAXES.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn themes() -> &'static ThemeSet {
    THEMES.get_or_init(ThemeSet::load_defaults)
}

fn theme(name: &str) -> Option<&'static Theme> {
    let ts = themes();
    ts.themes
        .get(name)
        .or_else(|| ts.themes.get(DEFAULT_THEME))
        .or_else(|| ts.themes.values().next())
}

/// Names of the bundled themes, for config validation messages.
pub fn theme_names() -> Vec<&'static str> {
    themes().themes.keys().map(String::as_str).collect()
}

fn syntax_for_path<'a>(ps: &'a SyntaxSet, path: &Path) -> &'a SyntaxReference {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|ext| ps.find_syntax_by_extension(ext))
        .or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| ps.find_syntax_by_extension(n))
        })
        .unwrap_or_else(|| ps.find_syntax_plain_text())
}

fn span_from_syn((SynStyle { foreground, font_style, .. }, text): (SynStyle, &str)) -> Span<'static> {
    let mut style = Style::default().fg(Color::Rgb(foreground.r, foreground.g, foreground.b));
    if font_style.contains(FontStyle::BOLD) {
        style = style.add_modifier(Modifier::BOLD);
    }
    if font_style.contains(FontStyle::ITALIC) {
        style = style.add_modifier(Modifier::ITALIC);
    }
    let content = text.trim_end_matches(['\n', '\r']);
    Span::styled(content.to_string(), style)
}

/// Highlight `content` as the language implied by `path`.
///
/// Returns one span list per line, aligned with `content.lines()`. Large
/// inputs and highlighting failures fall back to unstyled text.
pub fn highlight_file(path: &Path, content: &str, theme_name: &str) -> Vec<Vec<Span<'static>>> {
    let plain = || {
        content
            .lines()
            .map(|l| vec![Span::raw(l.to_string())])
            .collect()
    };
    if content.len() > MAX_HIGHLIGHT_BYTES {
        return plain();
    }
    let Some(theme) = theme(theme_name) else {
        return plain();
    };
    let ps = syntax_set();
    let mut highlighter = HighlightLines::new(syntax_for_path(ps, path), theme);
    let mut out = Vec::new();
    for line in LinesWithEndings::from(content) {
        let ranges = match highlighter.highlight_line(line, ps) {
            Ok(r) => r,
            Err(_) => return plain(),
        };
        out.push(ranges.into_iter().map(span_from_syn).collect());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(spans: &[Span<'_>]) -> String {
        spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_line_count_matches_input() {
        let src = "fn main() {\n    println!(\"hi\");\n}\n";
        let lines = highlight_file(Path::new("main.rs"), src, DEFAULT_THEME);
        assert_eq!(lines.len(), src.lines().count());
        assert_eq!(text(&lines[1]), "    println!(\"hi\");");
    }

    #[test]
    fn test_unknown_theme_and_extension_still_render() {
        let lines = highlight_file(Path::new("notes.unknownext"), "a\nb", "no-such-theme");
        assert_eq!(lines.len(), 2);
        assert_eq!(text(&lines[0]), "a");
    }

    #[test]
    fn test_default_theme_is_bundled() {
        assert!(theme_names().contains(&DEFAULT_THEME));
    }
}
