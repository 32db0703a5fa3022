/// Plans: markdown implementation plans for the current workspace.
///
/// A plan is either announced by the assistant (a hook payload carrying
/// `plan_path`) or generated on demand by running the assistant CLI with a
/// planning prompt. Generated plans are persisted to
/// `.hookline/plans/{timestamp}-plan.md` so the newest one can be reopened.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::external;

// ── Plan persistence ──────────────────────────────────────────────────────────

/// Directory for saved plans: `.hookline/plans/` under the workspace.
pub fn plans_dir(workspace: &Path) -> PathBuf {
    workspace.join(".hookline").join("plans")
}

/// Saved plans, newest first (by modification time, then name).
pub fn list_plans(workspace: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(plans_dir(workspace)) else {
        return Vec::new();
    };
    let mut plans: Vec<(std::time::SystemTime, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .filter_map(|p| {
            let modified = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .collect();
    plans.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    plans.into_iter().map(|(_, p)| p).collect()
}

pub fn load_plan(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read plan {}", path.display()))
}

pub fn save_plan(workspace: &Path, created_at: i64, markdown: &str) -> Result<PathBuf> {
    let dir = plans_dir(workspace);
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{created_at}-plan.md"));
    fs::write(&path, markdown)?;
    Ok(path)
}

/// First level-1 heading, if any.
pub fn plan_title(markdown: &str) -> Option<&str> {
    markdown
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ── Plan generation ───────────────────────────────────────────────────────────

/// Prompt used for plan generation. Focused on producing a reviewable
/// markdown document, not on doing the work.
const PLAN_PROMPT: &str = r###"Produce an implementation plan for the task below. Do not modify any files.

Write the plan as markdown:
- Start with a single "# " title line
- A short "## Context" section naming the files and modules involved
- A numbered "## Steps" list; each step names the files it touches and what changes
- A "## Verification" section describing how to check the result

Respond with the markdown only, no preamble."###;

pub fn plan_prompt(task: &str) -> String {
    format!("{PLAN_PROMPT}\n\nTask: {}", task.trim())
}

/// Empty MCP server set, so plan generation cannot reach outside tools.
pub const EMPTY_MCP_CONFIG: &str = r#"{"mcpServers":{}}"#;

/// Run the assistant CLI headless on `task` and save its answer as a plan.
pub async fn generate_plan(ai_command: &str, workspace: &Path, task: &str, created_at: i64) -> Result<PathBuf> {
    if task.trim().is_empty() {
        bail!("empty task");
    }
    let mcp_config = std::env::temp_dir().join(format!(
        "{}-mcp-{}-{created_at}.json",
        crate::APP_NAME,
        std::process::id()
    ));
    fs::write(&mcp_config, EMPTY_MCP_CONFIG)
        .with_context(|| format!("cannot write {}", mcp_config.display()))?;

    let args = vec![
        "-p".to_string(),
        plan_prompt(task),
        "--mcp-config".to_string(),
        mcp_config.to_string_lossy().into_owned(),
    ];
    let result = external::run_ai(ai_command, &args, workspace).await;
    let _ = fs::remove_file(&mcp_config);

    let markdown = result?;
    let path = save_plan(workspace, created_at, &markdown)?;
    info!(event = "plan_generated", path = %path.display());
    Ok(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saved_plans_listed_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_plans(dir.path()).is_empty());
        let first = save_plan(dir.path(), 100, "# First\n").unwrap();
        assert!(first.ends_with(".hookline/plans/100-plan.md"));
        assert_eq!(list_plans(dir.path()).first().cloned(), Some(first.clone()));

        let second = save_plan(dir.path(), 200, "# Second\n").unwrap();
        // bump mtime so ordering does not depend on filesystem timestamp granularity
        let later = filetime::FileTime::from_unix_time(chrono::Utc::now().timestamp() + 60, 0);
        filetime::set_file_mtime(&second, later).unwrap();
        assert_eq!(list_plans(dir.path()).first().cloned(), Some(second.clone()));
        assert_eq!(list_plans(dir.path()), vec![second.clone(), first]);
        assert_eq!(load_plan(&second).unwrap(), "# Second\n");
    }

    #[test]
    fn test_non_markdown_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(plans_dir(dir.path())).unwrap();
        fs::write(plans_dir(dir.path()).join("notes.txt"), "x").unwrap();
        assert!(list_plans(dir.path()).is_empty());
    }

    #[test]
    fn test_plan_title() {
        assert_eq!(plan_title("intro\n# Add caching\n## Steps"), Some("Add caching"));
        assert_eq!(plan_title("## only h2"), None);
    }

    #[test]
    fn test_plan_prompt_includes_task() {
        let p = plan_prompt("  add retries  ");
        assert!(p.starts_with("Produce an implementation plan"));
        assert!(p.contains(r###"single "# " title line"###));
        assert!(p.contains(r###"numbered "## Steps" list"###));
        assert!(p.contains("no preamble.\n\nTask: add retries"));
        assert!(p.ends_with("Task: add retries"));
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_task() {
        let dir = tempfile::tempdir().unwrap();
        assert!(generate_plan("claude", dir.path(), "   ", 1).await.is_err());
    }
}
