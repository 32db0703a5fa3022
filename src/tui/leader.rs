/// Leader layer: a chord (default Ctrl+G) arms a short-lived mode in which
/// the next key selects a context-dependent action.
///
/// Arming records the instant; the event loop schedules a timeout carrying
/// that instant back. A timeout only disarms when it matches the current
/// arming, so re-arming before an older timer fires extends the window.
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use super::{PaneFocus, ViewMode};

pub const LEADER_TIMEOUT: Duration = Duration::from_secs(4);

// ── Leader state ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Leader {
    active: bool,
    activated_at: Option<Instant>,
}

impl Leader {
    /// Arm (or re-arm) and return the instant to schedule a timeout for.
    pub fn arm(&mut self, now: Instant) -> Instant {
        self.active = true;
        self.activated_at = Some(now);
        now
    }

    pub fn disarm(&mut self) {
        self.active = false;
        self.activated_at = None;
    }

    /// Timeout for the arming at `at`. Stale timeouts are ignored.
    /// Returns true when the layer was disarmed.
    pub fn expire(&mut self, at: Instant) -> bool {
        if self.active && self.activated_at == Some(at) {
            self.disarm();
            return true;
        }
        false
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    #[cfg(test)]
    pub fn activated_at(&self) -> Option<Instant> {
        self.activated_at
    }
}

// ── Leader chord ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderKey {
    pub code: char,
    pub modifiers: KeyModifiers,
}

impl Default for LeaderKey {
    fn default() -> Self {
        Self {
            code: 'g',
            modifiers: KeyModifiers::CONTROL,
        }
    }
}

impl LeaderKey {
    /// `ctrl+<c>`, `alt+<c>`, or a bare `<c>`. Case-insensitive.
    pub fn parse(text: &str) -> Result<Self> {
        let lower = text.trim().to_lowercase();
        let mut modifiers = KeyModifiers::NONE;
        let mut key = lower.as_str();
        loop {
            if let Some(rest) = key.strip_prefix("ctrl+").or_else(|| key.strip_prefix("c-")) {
                modifiers |= KeyModifiers::CONTROL;
                key = rest;
            } else if let Some(rest) = key.strip_prefix("alt+").or_else(|| key.strip_prefix("m-")) {
                modifiers |= KeyModifiers::ALT;
                key = rest;
            } else {
                break;
            }
        }
        let mut chars = key.chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Ok(Self { code, modifiers }),
            _ => bail!("invalid leader key {text:?}: expected ctrl+<char>, alt+<char> or <char>"),
        }
    }

    pub fn matches(&self, key: &KeyEvent) -> bool {
        let KeyCode::Char(c) = key.code else {
            return false;
        };
        let relevant = key.modifiers & (KeyModifiers::CONTROL | KeyModifiers::ALT);
        c.to_ascii_lowercase() == self.code && relevant == self.modifiers
    }

    pub fn label(&self) -> String {
        let mut out = String::new();
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            out.push_str("Ctrl+");
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            out.push_str("Alt+");
        }
        out.push(self.code.to_ascii_uppercase());
        out
    }
}

// ── Context tables ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderAction {
    OpenInEditor,
    CopyPath,
    ToggleMinimap,
    ToggleLeftPane,
    ClearHistory,
    ReloadDaemon,
    NewPrompt,
    EditPrompt,
    RefinePrompt,
    CopyPrompt,
    ReloadPrompts,
    CancelRalph,
    OpenRalphState,
    ReloadRalph,
    GeneratePlan,
    OpenPlan,
    ReloadPlans,
    OpenContextNotes,
    RefreshContext,
    ShowHelp,
    Quit,
}

#[derive(Debug, Clone, Copy)]
pub struct LeaderBinding {
    pub key: char,
    pub label: &'static str,
    pub action: LeaderAction,
}

const fn bind(key: char, label: &'static str, action: LeaderAction) -> LeaderBinding {
    LeaderBinding { key, label, action }
}

use LeaderAction as A;

const HISTORY_LIST: &[LeaderBinding] = &[
    bind('o', "open in editor", A::OpenInEditor),
    bind('y', "copy path", A::CopyPath),
    bind('r', "reload from daemon", A::ReloadDaemon),
    bind('c', "clear history", A::ClearHistory),
    bind('m', "toggle minimap", A::ToggleMinimap),
    bind('b', "toggle list pane", A::ToggleLeftPane),
    bind('?', "help", A::ShowHelp),
    bind('q', "quit", A::Quit),
];

const HISTORY_DIFF: &[LeaderBinding] = &[
    bind('o', "open at line", A::OpenInEditor),
    bind('y', "copy path", A::CopyPath),
    bind('m', "toggle minimap", A::ToggleMinimap),
    bind('b', "toggle list pane", A::ToggleLeftPane),
    bind('?', "help", A::ShowHelp),
    bind('q', "quit", A::Quit),
];

const PROMPTS_LIST: &[LeaderBinding] = &[
    bind('n', "new prompt", A::NewPrompt),
    bind('e', "edit prompt", A::EditPrompt),
    bind('f', "refine with AI", A::RefinePrompt),
    bind('y', "copy prompt", A::CopyPrompt),
    bind('r', "reload prompts", A::ReloadPrompts),
    bind('b', "toggle list pane", A::ToggleLeftPane),
    bind('?', "help", A::ShowHelp),
    bind('q', "quit", A::Quit),
];

const PROMPTS_PREVIEW: &[LeaderBinding] = &[
    bind('e', "edit prompt", A::EditPrompt),
    bind('f', "refine with AI", A::RefinePrompt),
    bind('y', "copy prompt", A::CopyPrompt),
    bind('b', "toggle list pane", A::ToggleLeftPane),
    bind('?', "help", A::ShowHelp),
    bind('q', "quit", A::Quit),
];

const RALPH: &[LeaderBinding] = &[
    bind('x', "cancel loop", A::CancelRalph),
    bind('o', "open state file", A::OpenRalphState),
    bind('r', "reload", A::ReloadRalph),
    bind('?', "help", A::ShowHelp),
    bind('q', "quit", A::Quit),
];

const PLAN_LIST: &[LeaderBinding] = &[
    bind('g', "generate plan", A::GeneratePlan),
    bind('o', "open plan", A::OpenPlan),
    bind('r', "reload plans", A::ReloadPlans),
    bind('b', "toggle list pane", A::ToggleLeftPane),
    bind('?', "help", A::ShowHelp),
    bind('q', "quit", A::Quit),
];

const PLAN_VIEW: &[LeaderBinding] = &[
    bind('g', "generate plan", A::GeneratePlan),
    bind('o', "open plan", A::OpenPlan),
    bind('b', "toggle list pane", A::ToggleLeftPane),
    bind('?', "help", A::ShowHelp),
    bind('q', "quit", A::Quit),
];

const CONTEXT: &[LeaderBinding] = &[
    bind('o', "edit notes", A::OpenContextNotes),
    bind('r', "refresh", A::RefreshContext),
    bind('?', "help", A::ShowHelp),
    bind('q', "quit", A::Quit),
];

/// Bindings for the focused pane in `mode`. Ralph and Context have a single
/// pane, so focus is ignored there.
pub fn bindings(pane: PaneFocus, mode: ViewMode) -> &'static [LeaderBinding] {
    match (mode, pane) {
        (ViewMode::History, PaneFocus::Left) => HISTORY_LIST,
        (ViewMode::History, PaneFocus::Right) => HISTORY_DIFF,
        (ViewMode::Prompts, PaneFocus::Left) => PROMPTS_LIST,
        (ViewMode::Prompts, PaneFocus::Right) => PROMPTS_PREVIEW,
        (ViewMode::Ralph, _) => RALPH,
        (ViewMode::Plan, PaneFocus::Left) => PLAN_LIST,
        (ViewMode::Plan, PaneFocus::Right) => PLAN_VIEW,
        (ViewMode::Context, _) => CONTEXT,
    }
}

pub fn lookup(pane: PaneFocus, mode: ViewMode, key: char) -> Option<LeaderAction> {
    bindings(pane, mode)
        .iter()
        .find(|b| b.key == key)
        .map(|b| b.action)
}
