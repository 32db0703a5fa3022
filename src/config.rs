use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::daemon::DEFAULT_DAEMON_SOCKET;
use crate::highlight::DEFAULT_THEME;

// ── Config file ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// Chord that arms the leader layer, e.g. "ctrl+g"
    pub leader_key: String,
    /// Editor command; falls back to $VISUAL, $EDITOR, then `vi`
    pub editor: Option<String>,
    /// Socket of the history daemon
    pub daemon_socket: PathBuf,
    /// How many past edits to ask the daemon for on startup
    pub daemon_history_limit: usize,
    /// Prompt library directory. Default: ~/.config/hookline/prompts
    pub prompts_dir: Option<PathBuf>,
    /// Assistant CLI used for plan generation and prompt refinement
    pub ai_command: String,
    /// syntect theme for unchanged lines in diffs
    pub syntax_theme: String,
    pub show_minimap: bool,
    pub hide_left_pane: bool,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            leader_key: "ctrl+g".to_string(),
            editor: None,
            daemon_socket: PathBuf::from(DEFAULT_DAEMON_SOCKET),
            daemon_history_limit: 500,
            prompts_dir: None,
            ai_command: "claude".to_string(),
            syntax_theme: DEFAULT_THEME.to_string(),
            show_minimap: true,
            hide_left_pane: false,
        }
    }
}

impl ConfigFile {
    /// Load from disk, or return a default config if the file doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    /// Write a starter config file to disk (only if it doesn't exist).
    pub fn write_default_if_missing() -> Result<PathBuf> {
        let path = config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, DEFAULT_CONFIG_TOML)?;
        Ok(path)
    }
}

// ── Resolved runtime config (after merging file + environment) ────────────────

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub leader_key: String,
    /// Editor argv, never empty
    pub editor: Vec<String>,
    pub daemon_socket: PathBuf,
    pub daemon_history_limit: usize,
    pub prompts_dir: PathBuf,
    pub ai_command: String,
    pub syntax_theme: String,
    pub show_minimap: bool,
    pub hide_left_pane: bool,
}

impl ResolvedConfig {
    /// Priority for the editor: config file > $VISUAL > $EDITOR > `vi`.
    pub fn resolve(file: &ConfigFile) -> Self {
        let editor = resolve_editor(
            file.editor.as_deref(),
            std::env::var("VISUAL").ok().as_deref(),
            std::env::var("EDITOR").ok().as_deref(),
        );
        Self {
            leader_key: file.leader_key.clone(),
            editor,
            daemon_socket: file.daemon_socket.clone(),
            daemon_history_limit: file.daemon_history_limit,
            prompts_dir: file
                .prompts_dir
                .clone()
                .unwrap_or_else(|| config_dir().join("prompts")),
            ai_command: file.ai_command.clone(),
            syntax_theme: file.syntax_theme.clone(),
            show_minimap: file.show_minimap,
            hide_left_pane: file.hide_left_pane,
        }
    }
}

/// First non-blank candidate split into argv, or `["vi"]`.
pub fn resolve_editor(configured: Option<&str>, visual: Option<&str>, editor: Option<&str>) -> Vec<String> {
    [configured, visual, editor]
        .into_iter()
        .flatten()
        .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .find(|argv| !argv.is_empty())
        .unwrap_or_else(|| vec!["vi".to_string()])
}

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    dirs_config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::APP_NAME)
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn dirs_config_dir() -> Option<PathBuf> {
    // XDG_CONFIG_HOME or ~/.config
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
}

// ── Default config template written on first run ──────────────────────────────

const DEFAULT_CONFIG_TOML: &str = r#"# hookline configuration
# Run `hookline --init` to regenerate this file.

# Chord that arms the leader layer (ctrl+<key> or alt+<key>)
leader_key = "ctrl+g"

# Editor used by leader+o. Unset: $VISUAL, then $EDITOR, then vi
# editor = "nvim"

# ── History daemon (optional) ────────────────────────────────────────────────
daemon_socket        = "/tmp/hookline-query.sock"
daemon_history_limit = 500

# ── Prompts / plans ──────────────────────────────────────────────────────────
# prompts_dir = "/home/me/.config/hookline/prompts"
ai_command = "claude"

# ── Display ──────────────────────────────────────────────────────────────────
syntax_theme   = "base16-ocean.dark"
show_minimap   = true
hide_left_pane = false
"#;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_matches_defaults() {
        let parsed: ConfigFile = toml::from_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(parsed, ConfigFile::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let parsed: ConfigFile = toml::from_str("show_minimap = false\nai_command = \"my-ai\"").unwrap();
        assert!(!parsed.show_minimap);
        assert_eq!(parsed.ai_command, "my-ai");
        assert_eq!(parsed.leader_key, "ctrl+g");
        assert_eq!(parsed.daemon_history_limit, 500);
    }

    #[test]
    fn test_load_from_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(ConfigFile::load_from(&path).unwrap(), ConfigFile::default());
        fs::write(&path, "leader_key = [").unwrap();
        assert!(ConfigFile::load_from(&path).is_err());
    }

    #[test]
    fn test_editor_priority() {
        assert_eq!(resolve_editor(Some("code -w"), Some("nvim"), None), vec!["code", "-w"]);
        assert_eq!(resolve_editor(None, Some("nvim"), Some("nano")), vec!["nvim"]);
        assert_eq!(resolve_editor(Some("  "), None, Some("nano")), vec!["nano"]);
        assert_eq!(resolve_editor(None, None, None), vec!["vi"]);
    }

    #[test]
    fn test_resolve_fills_prompts_dir() {
        let file = ConfigFile {
            prompts_dir: Some(PathBuf::from("/p")),
            editor: Some("hx".into()),
            ..ConfigFile::default()
        };
        let resolved = ResolvedConfig::resolve(&file);
        assert_eq!(resolved.prompts_dir, PathBuf::from("/p"));
        assert_eq!(resolved.editor, vec!["hx"]);
        let resolved = ResolvedConfig::resolve(&ConfigFile::default());
        assert!(resolved.prompts_dir.ends_with("hookline/prompts"));
    }
}
