/// Ratatui dashboard for hookline.
///
/// Architecture:
///   main task:   event loop, sole owner of `AppState`
///   ingress:     socket accept loop + consumer task, posts `AppEvent::Edit`
///   one-shots:   daemon queries, AI CLI runs, clipboard, context gathering,
///                each posts its result back as an `AppEvent`
///
/// State transitions are pure: `handle_key` and `apply_event` mutate
/// `AppState` and return `Effect`s; the loop performs the effects.
///
/// Layout:
///   ┌────────────────────────────────────────────────┐
///   │  mode bar (1 line)                             │
///   ├──────────────┬─────────────────────────────────┤
///   │  list pane   │  detail pane                    │
///   ├──────────────┴─────────────────────────────────┤
///   │  status bar (1 line)                           │
///   └────────────────────────────────────────────────┘
pub mod context_view;
pub mod history_view;
pub mod leader;
pub mod overlays;
pub mod plan_view;
pub mod prompts_view;
pub mod ralph_view;
pub mod render;
pub mod toast;

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tui_textarea::TextArea;

use crate::config::ResolvedConfig;
use crate::context::{self, ContextInfo};
use crate::daemon::{DaemonClient, DaemonStatus};
use crate::diff::{DiffCache, RenderedDiff};
use crate::external;
use crate::highlight;
use crate::history::{EditRecord, HistoryStore};
use crate::ingress::{self, INGRESS_QUEUE_CAPACITY, IngressServer};
use crate::parser::ParsedEvent;
use crate::plan;
use crate::prompts::{self, PromptEntry};
use crate::ralph::{self, RalphState};
use leader::{LEADER_TIMEOUT, Leader, LeaderAction, LeaderKey};
use toast::{ToastKind, ToastQueue};

const TOAST_TICK: Duration = Duration::from_secs(1);
const STATUS_POLL: Duration = Duration::from_secs(10);
const RALPH_POLL: Duration = Duration::from_secs(5);
/// Columns per horizontal scroll step in the diff pane
const HSCROLL_STEP: usize = 4;
/// Rows of context kept above the first changed line when jumping to a hunk
const HUNK_CONTEXT_ROWS: usize = 3;
/// Pane height assumed until the first resize arrives
const DEFAULT_PANE_ROWS: usize = 20;

// ── AppEvent: results delivered to the loop ──────────────────────────────────

#[derive(Debug)]
pub enum AppEvent {
    /// Parsed payload from the ingress consumer
    Edit(ParsedEvent),
    DaemonHistory(Result<Vec<EditRecord>, String>),
    DaemonStatus(Result<DaemonStatus, String>),
    /// Scheduled expiry for the leader arming made at this instant
    LeaderTimeout(Instant),
    PlanGenerated(Result<PathBuf, String>),
    PromptRefined(Result<PathBuf, String>),
    ClipboardDone(Result<(), String>),
    ContextLoaded(Result<ContextInfo, String>),
    EditorExited {
        purpose: EditorPurpose,
        result: Result<(), String>,
    },
}

// ── Effect: work requested by a state transition ─────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorPurpose {
    Edit,
    Prompt,
    RalphState,
    Plan,
    ContextNotes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Quit,
    ScheduleLeaderTimeout(Instant),
    OpenEditor {
        path: PathBuf,
        line: Option<usize>,
        purpose: EditorPurpose,
    },
    CopyToClipboard(String),
    QueryDaemonHistory,
    GeneratePlan(String),
    RefinePrompt(PathBuf),
    RefreshContext,
}

// ── Modes and focus ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    History,
    Prompts,
    Ralph,
    Plan,
    Context,
}

impl ViewMode {
    pub const ALL: [ViewMode; 5] = [
        ViewMode::History,
        ViewMode::Prompts,
        ViewMode::Ralph,
        ViewMode::Plan,
        ViewMode::Context,
    ];

    pub fn index(self) -> usize {
        match self {
            ViewMode::History => 0,
            ViewMode::Prompts => 1,
            ViewMode::Ralph => 2,
            ViewMode::Plan => 3,
            ViewMode::Context => 4,
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// `'1'..='5'` in ring order.
    pub fn from_digit(c: char) -> Option<Self> {
        let d = c.to_digit(10)? as usize;
        (1..=Self::ALL.len()).contains(&d).then(|| Self::ALL[d - 1])
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewMode::History => "History",
            ViewMode::Prompts => "Prompts",
            ViewMode::Ralph => "Ralph",
            ViewMode::Plan => "Plan",
            ViewMode::Context => "Context",
        }
    }

    /// Modes drawn as one full-width pane.
    pub fn single_pane(self) -> bool {
        matches!(self, ViewMode::Ralph | ViewMode::Context)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaneFocus {
    #[default]
    Left,
    Right,
}

pub enum Overlay {
    None,
    Help,
    ConfirmClear,
    PlanInput(TextArea<'static>),
}

// ── Per-mode state ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PromptsPane {
    pub entries: Vec<PromptEntry>,
    pub selected: usize,
    pub list_scroll: usize,
    pub preview_scroll: usize,
    pub error: Option<String>,
    pub refining: bool,
}

impl PromptsPane {
    pub fn selected_entry(&self) -> Option<&PromptEntry> {
        self.entries.get(self.selected)
    }
}

#[derive(Debug, Default)]
pub struct RalphPane {
    pub state: Option<RalphState>,
    pub error: Option<String>,
    pub scroll: usize,
}

#[derive(Debug, Default)]
pub struct PlanPane {
    /// Newest first; an announced plan outside the plans directory leads
    pub files: Vec<PathBuf>,
    pub selected: usize,
    pub announced: Option<PathBuf>,
    pub content: String,
    pub error: Option<String>,
    pub scroll: usize,
    pub generating: bool,
}

impl PlanPane {
    pub fn selected_path(&self) -> Option<&PathBuf> {
        self.files.get(self.selected)
    }
}

#[derive(Debug, Default)]
pub struct ContextPane {
    pub info: Option<ContextInfo>,
    pub error: Option<String>,
    pub loading: bool,
    pub scroll: usize,
}

#[derive(Debug, Default, Clone)]
pub struct DaemonIndicator {
    pub connected: bool,
    pub status: Option<DaemonStatus>,
}

// ── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    pub workspace: PathBuf,
    pub socket_path: PathBuf,
    pub config: ResolvedConfig,
    pub leader_key: LeaderKey,
    pub mode: ViewMode,
    pub pane_focus: PaneFocus,
    pub hide_left_pane: bool,
    pub show_minimap: bool,
    pub overlay: Overlay,
    pub leader: Leader,
    pub toasts: ToastQueue,

    // History view
    pub history: HistoryStore,
    pub diff_cache: DiffCache,
    /// Index into `history.records()`; display order is reversed
    pub selected_index: usize,
    /// Offset into the newest-first display list
    pub list_scroll_offset: usize,
    pub diff_scroll: usize,
    pub horizontal_scroll: usize,
    /// Fresh render for the selection when `horizontal_scroll > 0`
    pub shifted_diff: Option<RenderedDiff>,
    pending_hunk_scroll: bool,

    pub list_rows: usize,
    pub detail_rows: usize,

    pub daemon: DaemonIndicator,
    manual_daemon_reload: bool,

    pub prompts: PromptsPane,
    pub ralph: RalphPane,
    pub plan: PlanPane,
    pub context: ContextPane,

    now: Instant,
}

impl AppState {
    pub fn new(config: ResolvedConfig, workspace: PathBuf, socket_path: PathBuf, now: Instant) -> Self {
        let mut toasts = ToastQueue::default();

        let leader_key = match LeaderKey::parse(&config.leader_key) {
            Ok(k) => k,
            Err(e) => {
                warn!(event = "leader_key_invalid", error = %e);
                toasts.push(format!("{e}; using Ctrl+G"), ToastKind::Warning, now);
                LeaderKey::default()
            }
        };

        if !highlight::theme_names().contains(&config.syntax_theme.as_str()) {
            warn!(event = "syntax_theme_unknown", theme = %config.syntax_theme);
            toasts.push(
                format!("unknown syntax theme {:?}; using {}", config.syntax_theme, highlight::DEFAULT_THEME),
                ToastKind::Warning,
                now,
            );
        }

        let mut history = HistoryStore::new(HistoryStore::path_for(&workspace));
        match history.load() {
            Ok(n) => debug!(event = "history_loaded", records = n),
            Err(e) => {
                warn!(event = "history_load_failed", error = %format!("{e:#}"));
                toasts.push(format!("history: {e:#}"), ToastKind::Warning, now);
            }
        }

        let mut state = Self {
            diff_cache: DiffCache::new(workspace.clone(), config.syntax_theme.clone()),
            selected_index: history.len().saturating_sub(1),
            history,
            workspace,
            socket_path,
            leader_key,
            mode: ViewMode::History,
            pane_focus: PaneFocus::Left,
            hide_left_pane: config.hide_left_pane,
            show_minimap: config.show_minimap,
            config,
            overlay: Overlay::None,
            leader: Leader::default(),
            toasts,
            list_scroll_offset: 0,
            diff_scroll: 0,
            horizontal_scroll: 0,
            shifted_diff: None,
            pending_hunk_scroll: true,
            list_rows: DEFAULT_PANE_ROWS,
            detail_rows: DEFAULT_PANE_ROWS,
            daemon: DaemonIndicator::default(),
            manual_daemon_reload: false,
            prompts: PromptsPane::default(),
            ralph: RalphPane::default(),
            plan: PlanPane::default(),
            context: ContextPane::default(),
            now,
        };
        state.reload_plans();
        state
    }

    fn toast(&mut self, message: impl Into<String>, kind: ToastKind) {
        self.toasts.push(message, kind, self.now);
    }

    /// Focus after forcing: single-pane modes and a hidden list pane always
    /// route keys to the right pane.
    pub fn effective_focus(&self) -> PaneFocus {
        if self.hide_left_pane || self.mode.single_pane() {
            PaneFocus::Right
        } else {
            self.pane_focus
        }
    }

    pub fn edited_paths(&self) -> Vec<String> {
        self.history.records().iter().map(|r| r.path.clone()).collect()
    }

    // ── Layout ───────────────────────────────────────────────────────────────

    /// Terminal resized. Both panes lose two rows of chrome (mode bar, status
    /// bar) and two of border.
    pub fn resize(&mut self, _width: u16, height: u16) {
        let rows = (height as usize).saturating_sub(4).max(1);
        self.list_rows = rows;
        self.detail_rows = rows;
        self.clamp_list_scroll();
        self.prompts.list_scroll = clamp_offset(
            self.prompts.selected,
            self.prompts.list_scroll,
            self.list_rows,
            self.prompts.entries.len(),
        );
        self.clamp_diff_scroll();
    }

    // ── History selection ────────────────────────────────────────────────────

    /// Row of the selection in the newest-first list.
    pub fn selected_visual(&self) -> usize {
        visual_pos(self.history.len(), self.selected_index)
    }

    pub fn selected_record(&self) -> Option<&EditRecord> {
        self.history.get(self.selected_index)
    }

    fn clamp_list_scroll(&mut self) {
        let len = self.history.len();
        if len == 0 {
            self.selected_index = 0;
            self.list_scroll_offset = 0;
            return;
        }
        self.selected_index = self.selected_index.min(len - 1);
        self.list_scroll_offset =
            clamp_offset(self.selected_visual(), self.list_scroll_offset, self.list_rows, len);
    }

    fn select_history(&mut self, index: usize) {
        let len = self.history.len();
        if len == 0 {
            return;
        }
        let index = index.min(len - 1);
        if index == self.selected_index {
            return;
        }
        self.selected_index = index;
        self.horizontal_scroll = 0;
        self.shifted_diff = None;
        self.clamp_list_scroll();
        self.pending_hunk_scroll = true;

        let records = self.history.records_mut();
        let _ = self.diff_cache.get(index, records);
        self.diff_cache.prefetch_adjacent(index, records);
        self.apply_hunk_scroll();
    }

    fn select_older(&mut self, n: usize) {
        self.select_history(self.selected_index.saturating_sub(n));
    }

    fn select_newer(&mut self, n: usize) {
        self.select_history(self.selected_index.saturating_add(n));
    }

    pub fn current_diff(&self) -> Option<&RenderedDiff> {
        self.shifted_diff
            .as_ref()
            .or_else(|| self.diff_cache.peek(self.selected_index))
    }

    fn apply_hunk_scroll(&mut self) {
        if !self.pending_hunk_scroll {
            return;
        }
        if let Some(diff) = self.diff_cache.peek(self.selected_index) {
            self.diff_scroll = diff.hunk_row.saturating_sub(HUNK_CONTEXT_ROWS);
            self.pending_hunk_scroll = false;
        }
    }

    fn clamp_diff_scroll(&mut self) {
        let len = self.current_diff().map(RenderedDiff::len).unwrap_or(0);
        self.diff_scroll = self.diff_scroll.min(len.saturating_sub(self.detail_rows));
    }

    /// Bring derived render state up to date. Called before every draw.
    pub fn prepare_render(&mut self) {
        if self.mode != ViewMode::History || self.history.is_empty() {
            self.shifted_diff = None;
            return;
        }
        let index = self.selected_index.min(self.history.len() - 1);
        let records = self.history.records_mut();
        if self.horizontal_scroll > 0 {
            self.shifted_diff = self
                .diff_cache
                .render_shifted(index, records, self.horizontal_scroll);
        } else {
            self.shifted_diff = None;
            let _ = self.diff_cache.get(index, records);
        }
        self.apply_hunk_scroll();
        self.clamp_diff_scroll();
    }

    // ── History mutation ─────────────────────────────────────────────────────

    fn append_record(&mut self, record: EditRecord) {
        info!(event = "edit_received", path = %record.path, tool = %record.tool, line = record.line_num);
        let saved = self.history.add(record);
        let index = self.history.len() - 1;
        self.selected_index = index;
        self.list_scroll_offset = 0;
        self.horizontal_scroll = 0;
        self.shifted_diff = None;
        self.diff_cache.invalidate(index);
        self.pending_hunk_scroll = true;
        if let Err(e) = saved {
            warn!(event = "history_save_failed", error = %format!("{e:#}"));
            self.toast(format!("history save failed: {e:#}"), ToastKind::Error);
        }
    }

    fn merge_daemon_history(&mut self, records: Vec<EditRecord>) {
        let inserted = self.history.merge(records);
        info!(event = "daemon_history_merged", inserted, total = self.history.len());
        if inserted > 0 {
            // indices shifted
            self.diff_cache.clear();
            if let Err(e) = self.history.save() {
                warn!(event = "history_save_failed", error = %format!("{e:#}"));
                self.toast(format!("history save failed: {e:#}"), ToastKind::Error);
            }
            self.selected_index = self.history.len() - 1;
            self.list_scroll_offset = 0;
            self.horizontal_scroll = 0;
            self.shifted_diff = None;
            self.pending_hunk_scroll = true;
            self.toast(
                format!("merged {inserted} edit{} from daemon", if inserted == 1 { "" } else { "s" }),
                ToastKind::Info,
            );
        } else if self.manual_daemon_reload {
            self.toast("history already up to date", ToastKind::Info);
        }
    }

    fn clear_history(&mut self) {
        match self.history.clear() {
            Ok(()) => {
                info!(event = "history_cleared");
                self.toast("history cleared", ToastKind::Success);
            }
            Err(e) => self.toast(format!("clear failed: {e:#}"), ToastKind::Error),
        }
        self.diff_cache.clear();
        self.selected_index = 0;
        self.list_scroll_offset = 0;
        self.diff_scroll = 0;
        self.horizontal_scroll = 0;
        self.shifted_diff = None;
    }

    // ── Other modes ──────────────────────────────────────────────────────────

    fn reload_prompts(&mut self) {
        match prompts::list_prompts(&self.config.prompts_dir) {
            Ok(entries) => {
                self.prompts.entries = entries;
                self.prompts.error = None;
            }
            Err(e) => {
                warn!(event = "prompts_load_failed", error = %format!("{e:#}"));
                self.prompts.entries.clear();
                self.prompts.error = Some(format!("{e:#}"));
            }
        }
        let len = self.prompts.entries.len();
        self.prompts.selected = self.prompts.selected.min(len.saturating_sub(1));
        self.prompts.list_scroll =
            clamp_offset(self.prompts.selected, self.prompts.list_scroll, self.list_rows, len);
    }

    fn select_prompt(&mut self, index: usize) {
        let len = self.prompts.entries.len();
        if len == 0 {
            return;
        }
        let index = index.min(len - 1);
        if index != self.prompts.selected {
            self.prompts.selected = index;
            self.prompts.preview_scroll = 0;
        }
        self.prompts.list_scroll =
            clamp_offset(index, self.prompts.list_scroll, self.list_rows, len);
    }

    fn select_prompt_path(&mut self, path: &Path) {
        if let Some(i) = self.prompts.entries.iter().position(|p| p.path == path) {
            self.select_prompt(i);
        }
    }

    fn reload_ralph(&mut self) {
        match ralph::load(&self.workspace) {
            Ok(state) => {
                self.ralph.state = state;
                self.ralph.error = None;
            }
            Err(e) => {
                self.ralph.state = None;
                self.ralph.error = Some(format!("{e:#}"));
            }
        }
    }

    /// Periodic refresh; only while the Ralph view is showing.
    pub fn poll_ralph(&mut self) {
        if self.mode == ViewMode::Ralph {
            self.reload_ralph();
        }
    }

    fn reload_plans(&mut self) {
        let mut files = plan::list_plans(&self.workspace);
        if let Some(announced) = &self.plan.announced {
            if !files.contains(announced) {
                files.insert(0, announced.clone());
            }
        }
        let keep = self.plan.selected_path().cloned();
        self.plan.files = files;
        self.plan.selected = keep
            .and_then(|k| self.plan.files.iter().position(|f| *f == k))
            .unwrap_or(0);
        self.load_selected_plan();
    }

    fn select_plan(&mut self, index: usize) {
        let len = self.plan.files.len();
        if len == 0 || index.min(len - 1) == self.plan.selected {
            return;
        }
        self.plan.selected = index.min(len - 1);
        self.load_selected_plan();
    }

    fn select_plan_path(&mut self, path: &Path) {
        if let Some(i) = self.plan.files.iter().position(|f| f == path) {
            self.plan.selected = i;
            self.load_selected_plan();
        }
    }

    fn load_selected_plan(&mut self) {
        self.plan.scroll = 0;
        let Some(path) = self.plan.selected_path().cloned() else {
            self.plan.content.clear();
            self.plan.error = None;
            return;
        };
        match plan::load_plan(&path) {
            Ok(content) => {
                self.plan.content = content;
                self.plan.error = None;
            }
            Err(e) => {
                self.plan.content.clear();
                self.plan.error = Some(format!("{e:#}"));
            }
        }
    }

    fn plan_announced(&mut self, path: PathBuf) {
        info!(event = "plan_announced", path = %path.display());
        self.plan.announced = Some(path.clone());
        self.reload_plans();
        self.select_plan_path(&path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.toast(format!("plan updated: {name}"), ToastKind::Info);
    }

    fn request_context(&mut self) -> Vec<Effect> {
        self.context.loading = true;
        vec![Effect::RefreshContext]
    }

    fn set_mode(&mut self, mode: ViewMode) -> Vec<Effect> {
        if mode == self.mode {
            return Vec::new();
        }
        debug!(event = "mode_switch", from = self.mode.label(), to = mode.label());
        self.mode = mode;
        match mode {
            ViewMode::History => Vec::new(),
            ViewMode::Prompts => {
                self.reload_prompts();
                Vec::new()
            }
            ViewMode::Ralph => {
                self.reload_ralph();
                Vec::new()
            }
            ViewMode::Plan => {
                self.reload_plans();
                Vec::new()
            }
            ViewMode::Context => self.request_context(),
        }
    }

    // ── Periodic ─────────────────────────────────────────────────────────────

    pub fn on_tick(&mut self, now: Instant) {
        self.now = now;
        self.toasts.purge(now);
    }

    // ── Events ───────────────────────────────────────────────────────────────

    pub fn apply_event(&mut self, event: AppEvent, now: Instant) -> Vec<Effect> {
        self.now = now;
        match event {
            AppEvent::Edit(parsed) => {
                if let Some(p) = parsed.plan_path {
                    self.plan_announced(PathBuf::from(p));
                }
                if let Some(record) = parsed.record {
                    self.append_record(record);
                }
            }
            AppEvent::DaemonHistory(Ok(records)) => {
                self.daemon.connected = true;
                self.merge_daemon_history(records);
                self.manual_daemon_reload = false;
            }
            AppEvent::DaemonHistory(Err(e)) => {
                debug!(event = "daemon_history_unavailable", error = %e);
                self.daemon.connected = false;
                if self.manual_daemon_reload {
                    self.toast(format!("daemon unavailable: {e}"), ToastKind::Warning);
                }
                self.manual_daemon_reload = false;
            }
            AppEvent::DaemonStatus(Ok(status)) => {
                self.daemon.connected = status.running;
                self.daemon.status = Some(status);
            }
            AppEvent::DaemonStatus(Err(e)) => {
                debug!(event = "daemon_status_unavailable", error = %e);
                self.daemon.connected = false;
                self.daemon.status = None;
            }
            AppEvent::LeaderTimeout(at) => {
                if self.leader.expire(at) {
                    debug!(event = "leader_timeout");
                }
            }
            AppEvent::PlanGenerated(result) => {
                self.plan.generating = false;
                match result {
                    Ok(path) => {
                        self.reload_plans();
                        self.select_plan_path(&path);
                        self.toast("plan generated", ToastKind::Success);
                    }
                    Err(e) => self.toast(format!("plan generation failed: {e}"), ToastKind::Error),
                }
            }
            AppEvent::PromptRefined(result) => {
                self.prompts.refining = false;
                match result {
                    Ok(path) => {
                        self.reload_prompts();
                        self.select_prompt_path(&path);
                        self.toast("prompt refined", ToastKind::Success);
                    }
                    Err(e) => self.toast(format!("refine failed: {e}"), ToastKind::Error),
                }
            }
            AppEvent::ClipboardDone(Ok(())) => self.toast("copied to clipboard", ToastKind::Success),
            AppEvent::ClipboardDone(Err(e)) => {
                self.toast(format!("clipboard: {e}"), ToastKind::Warning)
            }
            AppEvent::ContextLoaded(result) => {
                self.context.loading = false;
                match result {
                    Ok(info) => {
                        self.context.info = Some(info);
                        self.context.error = None;
                    }
                    Err(e) => self.context.error = Some(e),
                }
            }
            AppEvent::EditorExited { purpose, result } => {
                if let Err(e) = result {
                    self.toast(e, ToastKind::Error);
                }
                match purpose {
                    EditorPurpose::Edit => {}
                    EditorPurpose::Prompt => self.reload_prompts(),
                    EditorPurpose::RalphState => self.reload_ralph(),
                    EditorPurpose::Plan => self.reload_plans(),
                    EditorPurpose::ContextNotes => return self.request_context(),
                }
            }
        }
        Vec::new()
    }

    // ── Keys ─────────────────────────────────────────────────────────────────

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> Vec<Effect> {
        self.now = now;
        if key.kind != KeyEventKind::Press {
            return Vec::new();
        }
        if !matches!(self.overlay, Overlay::None) {
            return self.handle_overlay_key(key);
        }
        if self.leader.is_active() {
            return self.handle_leader_key(key);
        }
        if self.leader_key.matches(&key) {
            return vec![Effect::ScheduleLeaderTimeout(self.leader.arm(now))];
        }
        if let Some(effects) = self.handle_global_key(key) {
            return effects;
        }
        match self.mode {
            ViewMode::History => self.handle_history_key(key),
            ViewMode::Prompts => self.handle_prompts_key(key),
            ViewMode::Ralph => self.handle_ralph_key(key),
            ViewMode::Plan => self.handle_plan_key(key),
            ViewMode::Context => self.handle_context_key(key),
        }
    }

    fn handle_global_key(&mut self, key: KeyEvent) -> Option<Vec<Effect>> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return (key.code == KeyCode::Char('c')).then(|| vec![Effect::Quit]);
        }
        let effects = match key.code {
            KeyCode::Char('q') => vec![Effect::Quit],
            KeyCode::Tab => self.set_mode(self.mode.next()),
            KeyCode::BackTab => self.set_mode(self.mode.prev()),
            KeyCode::Char(c @ '1'..='5') => match ViewMode::from_digit(c) {
                Some(mode) => self.set_mode(mode),
                None => Vec::new(),
            },
            KeyCode::Char('[') => {
                self.pane_focus = PaneFocus::Left;
                Vec::new()
            }
            KeyCode::Char(']') => {
                self.pane_focus = PaneFocus::Right;
                Vec::new()
            }
            KeyCode::Char('?') => {
                self.overlay = Overlay::Help;
                Vec::new()
            }
            _ => return None,
        };
        Some(effects)
    }

    fn handle_leader_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if key.code == KeyCode::Esc {
            self.leader.disarm();
            return Vec::new();
        }
        if self.leader_key.matches(&key) {
            return vec![Effect::ScheduleLeaderTimeout(self.leader.arm(self.now))];
        }
        let KeyCode::Char(c) = key.code else {
            return Vec::new();
        };
        match leader::lookup(self.effective_focus(), self.mode, c) {
            Some(action) => {
                self.leader.disarm();
                self.run_leader_action(action)
            }
            // unbound keys are swallowed; the layer stays armed until timeout
            None => Vec::new(),
        }
    }

    fn run_leader_action(&mut self, action: LeaderAction) -> Vec<Effect> {
        debug!(event = "leader_action", action = ?action);
        match action {
            LeaderAction::OpenInEditor => match self.selected_record() {
                Some(r) => vec![Effect::OpenEditor {
                    path: PathBuf::from(&r.path),
                    line: Some(r.line_num),
                    purpose: EditorPurpose::Edit,
                }],
                None => Vec::new(),
            },
            LeaderAction::CopyPath => match self.selected_record() {
                Some(r) => vec![Effect::CopyToClipboard(r.path.clone())],
                None => Vec::new(),
            },
            LeaderAction::ToggleMinimap => {
                self.show_minimap = !self.show_minimap;
                Vec::new()
            }
            LeaderAction::ToggleLeftPane => {
                self.hide_left_pane = !self.hide_left_pane;
                Vec::new()
            }
            LeaderAction::ClearHistory => {
                if self.history.is_empty() {
                    self.toast("history is already empty", ToastKind::Info);
                } else {
                    self.overlay = Overlay::ConfirmClear;
                }
                Vec::new()
            }
            LeaderAction::ReloadDaemon => {
                self.manual_daemon_reload = true;
                self.toast("querying daemon", ToastKind::Info);
                vec![Effect::QueryDaemonHistory]
            }
            LeaderAction::NewPrompt => match prompts::create_prompt(&self.config.prompts_dir, Utc::now()) {
                Ok(path) => vec![Effect::OpenEditor {
                    path,
                    line: None,
                    purpose: EditorPurpose::Prompt,
                }],
                Err(e) => {
                    self.toast(format!("new prompt: {e:#}"), ToastKind::Error);
                    Vec::new()
                }
            },
            LeaderAction::EditPrompt => match self.prompts.selected_entry() {
                Some(p) => vec![Effect::OpenEditor {
                    path: p.path.clone(),
                    line: None,
                    purpose: EditorPurpose::Prompt,
                }],
                None => Vec::new(),
            },
            LeaderAction::RefinePrompt => {
                if self.prompts.refining {
                    self.toast("already refining a prompt", ToastKind::Info);
                    return Vec::new();
                }
                let Some(path) = self.prompts.selected_entry().map(|p| p.path.clone()) else {
                    return Vec::new();
                };
                self.prompts.refining = true;
                self.toast("refining prompt", ToastKind::Info);
                vec![Effect::RefinePrompt(path)]
            }
            LeaderAction::CopyPrompt => match self.prompts.selected_entry() {
                Some(p) => vec![Effect::CopyToClipboard(p.body.clone())],
                None => Vec::new(),
            },
            LeaderAction::ReloadPrompts => {
                self.reload_prompts();
                Vec::new()
            }
            LeaderAction::CancelRalph => {
                match ralph::cancel(&self.workspace) {
                    Ok(true) => self.toast("ralph loop cancelled", ToastKind::Success),
                    Ok(false) => self.toast("no active ralph loop", ToastKind::Info),
                    Err(e) => self.toast(format!("cancel failed: {e:#}"), ToastKind::Error),
                }
                self.reload_ralph();
                Vec::new()
            }
            LeaderAction::OpenRalphState => {
                let path = ralph::state_path(&self.workspace);
                if path.exists() {
                    vec![Effect::OpenEditor {
                        path,
                        line: None,
                        purpose: EditorPurpose::RalphState,
                    }]
                } else {
                    self.toast("no ralph state file", ToastKind::Info);
                    Vec::new()
                }
            }
            LeaderAction::ReloadRalph => {
                self.reload_ralph();
                Vec::new()
            }
            LeaderAction::GeneratePlan => {
                self.open_plan_input();
                Vec::new()
            }
            LeaderAction::OpenPlan => match self.plan.selected_path() {
                Some(path) => vec![Effect::OpenEditor {
                    path: path.clone(),
                    line: None,
                    purpose: EditorPurpose::Plan,
                }],
                None => Vec::new(),
            },
            LeaderAction::ReloadPlans => {
                self.reload_plans();
                Vec::new()
            }
            LeaderAction::OpenContextNotes => {
                let path = context::notes_path(&self.workspace);
                if let Some(parent) = path.parent() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        self.toast(format!("notes: {e}"), ToastKind::Error);
                        return Vec::new();
                    }
                }
                vec![Effect::OpenEditor {
                    path,
                    line: None,
                    purpose: EditorPurpose::ContextNotes,
                }]
            }
            LeaderAction::RefreshContext => self.request_context(),
            LeaderAction::ShowHelp => {
                self.overlay = Overlay::Help;
                Vec::new()
            }
            LeaderAction::Quit => vec![Effect::Quit],
        }
    }

    fn open_plan_input(&mut self) {
        if self.plan.generating {
            self.toast("a plan is already being generated", ToastKind::Info);
            return;
        }
        let mut textarea = TextArea::default();
        textarea.set_placeholder_text("describe the task, Enter to generate");
        self.overlay = Overlay::PlanInput(textarea);
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        match &mut self.overlay {
            Overlay::None => Vec::new(),
            Overlay::Help => {
                self.overlay = Overlay::None;
                Vec::new()
            }
            Overlay::ConfirmClear => {
                self.overlay = Overlay::None;
                if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                    self.clear_history();
                }
                Vec::new()
            }
            Overlay::PlanInput(textarea) => match key.code {
                KeyCode::Esc => {
                    self.overlay = Overlay::None;
                    Vec::new()
                }
                KeyCode::Enter if !key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) => {
                    let task = textarea.lines().join("\n").trim().to_string();
                    if task.is_empty() {
                        return Vec::new();
                    }
                    self.overlay = Overlay::None;
                    self.plan.generating = true;
                    self.toast("generating plan", ToastKind::Info);
                    vec![Effect::GeneratePlan(task)]
                }
                _ => {
                    textarea.input(key);
                    Vec::new()
                }
            },
        }
    }

    fn handle_history_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        match self.effective_focus() {
            PaneFocus::Left => match key.code {
                KeyCode::Down | KeyCode::Char('j') => self.select_older(1),
                KeyCode::Up | KeyCode::Char('k') => self.select_newer(1),
                KeyCode::PageDown => self.select_older(self.list_rows),
                KeyCode::PageUp => self.select_newer(self.list_rows),
                KeyCode::Home | KeyCode::Char('g') => self.select_history(self.history.len().saturating_sub(1)),
                KeyCode::End | KeyCode::Char('G') => self.select_history(0),
                KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => self.pane_focus = PaneFocus::Right,
                _ => {}
            },
            PaneFocus::Right => match key.code {
                KeyCode::Down | KeyCode::Char('j') => self.diff_scroll = self.diff_scroll.saturating_add(1),
                KeyCode::Up | KeyCode::Char('k') => self.diff_scroll = self.diff_scroll.saturating_sub(1),
                KeyCode::PageDown => self.diff_scroll = self.diff_scroll.saturating_add(self.detail_rows),
                KeyCode::PageUp => self.diff_scroll = self.diff_scroll.saturating_sub(self.detail_rows),
                KeyCode::Home | KeyCode::Char('g') => self.diff_scroll = 0,
                KeyCode::End | KeyCode::Char('G') => self.diff_scroll = usize::MAX,
                KeyCode::Left | KeyCode::Char('h') => {
                    self.horizontal_scroll = self.horizontal_scroll.saturating_sub(HSCROLL_STEP)
                }
                KeyCode::Right | KeyCode::Char('l') => {
                    self.horizontal_scroll = self.horizontal_scroll.saturating_add(HSCROLL_STEP)
                }
                KeyCode::Char('0') => self.horizontal_scroll = 0,
                KeyCode::Char('J') => self.select_older(1),
                KeyCode::Char('K') => self.select_newer(1),
                KeyCode::Esc => self.pane_focus = PaneFocus::Left,
                _ => {}
            },
        }
        self.clamp_diff_scroll();
        Vec::new()
    }

    fn handle_prompts_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        match self.effective_focus() {
            PaneFocus::Left => match key.code {
                KeyCode::Down | KeyCode::Char('j') => self.select_prompt(self.prompts.selected.saturating_add(1)),
                KeyCode::Up | KeyCode::Char('k') => self.select_prompt(self.prompts.selected.saturating_sub(1)),
                KeyCode::PageDown => self.select_prompt(self.prompts.selected.saturating_add(self.list_rows)),
                KeyCode::PageUp => self.select_prompt(self.prompts.selected.saturating_sub(self.list_rows)),
                KeyCode::Home | KeyCode::Char('g') => self.select_prompt(0),
                KeyCode::End | KeyCode::Char('G') => self.select_prompt(usize::MAX),
                KeyCode::Enter | KeyCode::Char('y') => return self.run_leader_action(LeaderAction::CopyPrompt),
                KeyCode::Char('e') => return self.run_leader_action(LeaderAction::EditPrompt),
                KeyCode::Right | KeyCode::Char('l') => self.pane_focus = PaneFocus::Right,
                _ => {}
            },
            PaneFocus::Right => {
                if key.code == KeyCode::Char('y') {
                    return self.run_leader_action(LeaderAction::CopyPrompt);
                }
                if key.code == KeyCode::Esc {
                    self.pane_focus = PaneFocus::Left;
                }
                scroll_text(&mut self.prompts.preview_scroll, &key, self.detail_rows);
            }
        }
        Vec::new()
    }

    fn handle_ralph_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if key.code == KeyCode::Char('r') {
            self.reload_ralph();
        } else {
            scroll_text(&mut self.ralph.scroll, &key, self.detail_rows);
        }
        Vec::new()
    }

    fn handle_plan_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if key.code == KeyCode::Char('g') {
            self.open_plan_input();
            return Vec::new();
        }
        match self.effective_focus() {
            PaneFocus::Left => match key.code {
                KeyCode::Down | KeyCode::Char('j') => self.select_plan(self.plan.selected.saturating_add(1)),
                KeyCode::Up | KeyCode::Char('k') => self.select_plan(self.plan.selected.saturating_sub(1)),
                KeyCode::Enter | KeyCode::Right | KeyCode::Char('l') => self.pane_focus = PaneFocus::Right,
                _ => {}
            },
            PaneFocus::Right => {
                if key.code == KeyCode::Esc {
                    self.pane_focus = PaneFocus::Left;
                }
                scroll_text(&mut self.plan.scroll, &key, self.detail_rows);
                let max = self.plan.content.lines().count().saturating_sub(self.detail_rows);
                self.plan.scroll = self.plan.scroll.min(max);
            }
        }
        Vec::new()
    }

    fn handle_context_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        if key.code == KeyCode::Char('r') {
            return self.request_context();
        }
        scroll_text(&mut self.context.scroll, &key, self.detail_rows);
        Vec::new()
    }
}

// ── Pure helpers ─────────────────────────────────────────────────────────────

/// Newest-first row of the record at `index`.
pub fn visual_pos(len: usize, index: usize) -> usize {
    len.saturating_sub(1).saturating_sub(index)
}

/// Window offset that keeps row `pos` visible in `rows` rows over `len`
/// items, never past the last full page.
pub fn clamp_offset(pos: usize, offset: usize, rows: usize, len: usize) -> usize {
    let rows = rows.max(1);
    let max_offset = len.saturating_sub(rows);
    let mut offset = offset.min(max_offset);
    if pos < offset {
        offset = pos;
    } else if pos >= offset + rows {
        offset = pos + 1 - rows;
    }
    offset.min(max_offset)
}

/// Vertical scrolling shared by the text panes. Returns false when the key
/// is not a scroll key.
fn scroll_text(offset: &mut usize, key: &KeyEvent, page: usize) -> bool {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => *offset = offset.saturating_add(1),
        KeyCode::Up | KeyCode::Char('k') => *offset = offset.saturating_sub(1),
        KeyCode::PageDown => *offset = offset.saturating_add(page),
        KeyCode::PageUp => *offset = offset.saturating_sub(page),
        KeyCode::Home => *offset = 0,
        _ => return false,
    }
    true
}

// ── Background work ──────────────────────────────────────────────────────────

/// Handles needed to run effects off the main task.
struct Services {
    tx: mpsc::UnboundedSender<AppEvent>,
    daemon: DaemonClient,
    workspace: PathBuf,
    history_limit: usize,
    ai_command: String,
    editor: Vec<String>,
}

impl Services {
    fn spawn_daemon_history(&self) {
        let tx = self.tx.clone();
        let client = self.daemon.clone();
        let workspace = self.workspace.clone();
        let limit = self.history_limit;
        tokio::spawn(async move {
            let result = client
                .workspace_history(&workspace, limit)
                .await
                .map_err(|e| format!("{e:#}"));
            let _ = tx.send(AppEvent::DaemonHistory(result));
        });
    }

    fn spawn_daemon_status(&self) {
        let tx = self.tx.clone();
        let client = self.daemon.clone();
        let workspace = self.workspace.clone();
        tokio::spawn(async move {
            let result = client.status(&workspace).await.map_err(|e| format!("{e:#}"));
            let _ = tx.send(AppEvent::DaemonStatus(result));
        });
    }

    fn spawn_clipboard(&self, text: String) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || external::copy_to_clipboard(&text)).await {
                Ok(r) => r.map_err(|e| format!("{e:#}")),
                Err(e) => Err(e.to_string()),
            };
            let _ = tx.send(AppEvent::ClipboardDone(result));
        });
    }

    fn spawn_plan(&self, task: String) {
        let tx = self.tx.clone();
        let ai = self.ai_command.clone();
        let workspace = self.workspace.clone();
        tokio::spawn(async move {
            let created_at = Utc::now().timestamp();
            let result = plan::generate_plan(&ai, &workspace, &task, created_at)
                .await
                .map_err(|e| format!("{e:#}"));
            let _ = tx.send(AppEvent::PlanGenerated(result));
        });
    }

    fn spawn_refine(&self, path: PathBuf) {
        let tx = self.tx.clone();
        let ai = self.ai_command.clone();
        tokio::spawn(async move {
            let result = prompts::refine_prompt(&ai, &path)
                .await
                .map_err(|e| format!("{e:#}"));
            let _ = tx.send(AppEvent::PromptRefined(result));
        });
    }

    fn spawn_context(&self, edited_paths: Vec<String>) {
        let tx = self.tx.clone();
        let workspace = self.workspace.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || context::gather(&workspace, &edited_paths))
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send(AppEvent::ContextLoaded(result));
        });
    }
}

// ── Terminal setup / teardown ─────────────────────────────────────────────────

type Term = Terminal<CrosstermBackend<io::Stdout>>;

fn setup_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(terminal: &mut Term) {
    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
}

/// Re-take the terminal after a foreground child (the editor) exits.
fn resume_terminal(terminal: &mut Term) -> Result<()> {
    enable_raw_mode()?;
    execute!(terminal.backend_mut(), EnterAlternateScreen)?;
    terminal.clear()?;
    Ok(())
}

fn redraw(terminal: &mut Term, state: &mut AppState) -> Result<()> {
    state.prepare_render();
    terminal.draw(|f| render::draw(f, state))?;
    Ok(())
}

// ── Main TUI run loop ─────────────────────────────────────────────────────────

pub async fn run(config: ResolvedConfig, workspace: PathBuf, server: IngressServer) -> Result<()> {
    let state = AppState::new(
        config,
        workspace,
        server.path().to_path_buf(),
        Instant::now(),
    );

    let mut terminal = setup_terminal()?;

    // Panic hook: restore terminal before printing panic
    let orig_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        orig_hook(info);
    }));

    let result = event_loop(&mut terminal, state, server).await;

    restore_terminal(&mut terminal);
    result
}

enum Flow {
    Continue,
    Quit,
}

async fn event_loop(terminal: &mut Term, mut state: AppState, server: IngressServer) -> Result<()> {
    let (app_tx, mut app_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (ingress_tx, ingress_rx) = mpsc::channel::<Vec<u8>>(INGRESS_QUEUE_CAPACITY);

    info!(event = "ingress_listening", socket = %server.path().display());
    let server_task = tokio::spawn(server.serve(ingress_tx));
    let consumer_task = tokio::spawn(ingress::run_consumer(
        ingress_rx,
        state.workspace.clone(),
        app_tx.clone(),
    ));

    let services = Services {
        tx: app_tx,
        daemon: DaemonClient::new(&state.config.daemon_socket),
        workspace: state.workspace.clone(),
        history_limit: state.config.daemon_history_limit,
        ai_command: state.config.ai_command.clone(),
        editor: state.config.editor.clone(),
    };
    services.spawn_daemon_history();
    services.spawn_daemon_status();

    if let Ok((w, h)) = crossterm::terminal::size() {
        state.resize(w, h);
    }

    let mut terminal_events = Some(EventStream::new());
    let mut toast_tick = tokio::time::interval(TOAST_TICK);
    let start = tokio::time::Instant::now();
    let mut status_tick = tokio::time::interval_at(start + STATUS_POLL, STATUS_POLL);
    let mut ralph_tick = tokio::time::interval_at(start + RALPH_POLL, RALPH_POLL);

    redraw(terminal, &mut state)?;

    let result = loop {
        let effects = tokio::select! {
            // ── Toast expiry ──────────────────────────────────────────────────
            _ = toast_tick.tick() => {
                state.on_tick(Instant::now());
                Vec::new()
            }

            // ── Daemon liveness ───────────────────────────────────────────────
            _ = status_tick.tick() => {
                services.spawn_daemon_status();
                Vec::new()
            }

            _ = ralph_tick.tick() => {
                state.poll_ralph();
                Vec::new()
            }

            // ── Results from background tasks ─────────────────────────────────
            Some(ev) = app_rx.recv() => state.apply_event(ev, Instant::now()),

            // ── Keyboard/resize events ────────────────────────────────────────
            Some(ev) = next_terminal_event(&mut terminal_events) => match ev {
                Ok(Event::Key(key)) => state.handle_key(key, Instant::now()),
                Ok(Event::Resize(w, h)) => {
                    state.resize(w, h);
                    Vec::new()
                }
                Ok(_) => Vec::new(),
                Err(e) => {
                    warn!(event = "terminal_event_error", error = %e);
                    Vec::new()
                }
            },
        };

        match run_effects(terminal, &mut state, &services, &mut terminal_events, effects).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break Ok(()),
            Err(e) => break Err(e),
        }
        if let Err(e) = redraw(terminal, &mut state) {
            break Err(e);
        }
    };

    // Dropping the server removes the socket file
    server_task.abort();
    let _ = server_task.await;
    consumer_task.abort();
    info!(event = "shutdown");
    result
}

async fn next_terminal_event(events: &mut Option<EventStream>) -> Option<io::Result<Event>> {
    match events.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn run_effects(
    terminal: &mut Term,
    state: &mut AppState,
    services: &Services,
    terminal_events: &mut Option<EventStream>,
    effects: Vec<Effect>,
) -> Result<Flow> {
    let mut queue: VecDeque<Effect> = effects.into();
    while let Some(effect) = queue.pop_front() {
        match effect {
            Effect::Quit => return Ok(Flow::Quit),
            Effect::ScheduleLeaderTimeout(at) => {
                let tx = services.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(LEADER_TIMEOUT).await;
                    let _ = tx.send(AppEvent::LeaderTimeout(at));
                });
            }
            Effect::OpenEditor { path, line, purpose } => {
                info!(event = "editor_open", path = %path.display(), line = ?line);
                // stop reading stdin so the editor gets every keystroke
                *terminal_events = None;
                restore_terminal(terminal);
                let result = external::run_editor(&services.editor, &path, line)
                    .await
                    .map_err(|e| format!("{e:#}"));
                resume_terminal(terminal)?;
                *terminal_events = Some(EventStream::new());
                queue.extend(state.apply_event(AppEvent::EditorExited { purpose, result }, Instant::now()));
            }
            Effect::CopyToClipboard(text) => services.spawn_clipboard(text),
            Effect::QueryDaemonHistory => services.spawn_daemon_history(),
            Effect::GeneratePlan(task) => services.spawn_plan(task),
            Effect::RefinePrompt(path) => services.spawn_refine(path),
            Effect::RefreshContext => services.spawn_context(state.edited_paths()),
        }
    }
    Ok(Flow::Continue)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
