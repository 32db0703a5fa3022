/// Prompt library: reusable markdown prompts with optional frontmatter
/// (`name`, `description`, `tags`). Files live in a flat directory; each
/// `*.md` file is one prompt.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::external;
use crate::frontmatter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptEntry {
    pub path: PathBuf,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub body: String,
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Build an entry from a file's contents. Malformed frontmatter is logged and
/// the whole file is used as the body, named after the file stem.
pub fn parse_prompt(path: &Path, raw: &str) -> PromptEntry {
    match frontmatter::split(raw) {
        Ok((fm, body)) => PromptEntry {
            path: path.to_path_buf(),
            name: fm
                .get("name")
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| stem(path)),
            description: fm.get("description").unwrap_or_default().to_string(),
            tags: fm.list("tags"),
            body: body.to_string(),
        },
        Err(err) => {
            warn!(event = "prompt_bad_frontmatter", path = %path.display(), error = %err);
            PromptEntry {
                path: path.to_path_buf(),
                name: stem(path),
                description: String::new(),
                tags: Vec::new(),
                body: raw.to_string(),
            }
        }
    }
}

/// All prompts in `dir`, sorted by name. A missing directory is empty.
pub fn list_prompts(dir: &Path) -> Result<Vec<PromptEntry>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("cannot list {}", dir.display())),
    };
    let mut prompts: Vec<PromptEntry> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
        .filter_map(|p| match fs::read_to_string(&p) {
            Ok(raw) => Some(parse_prompt(&p, &raw)),
            Err(err) => {
                debug!(event = "prompt_unreadable", path = %p.display(), error = %err);
                None
            }
        })
        .collect();
    prompts.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then_with(|| a.path.cmp(&b.path)));
    Ok(prompts)
}

/// Create an empty prompt from a template and return its path.
pub fn create_prompt(dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    let path = dir.join(format!("prompt-{}.md", now.format("%Y%m%d-%H%M%S")));
    let template = "---\nname: New prompt\ndescription: \ntags: []\n---\n\n";
    fs::write(&path, template).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

/// `<stem>.refined.md` next to the original.
pub fn refined_path(path: &Path) -> PathBuf {
    path.with_file_name(format!("{}.refined.md", stem(path)))
}

const REFINE_INSTRUCTION: &str = "Rewrite the following prompt so it is clearer and more specific \
for an AI coding assistant. Keep its intent. Respond with the improved prompt only.";

/// Ask the assistant CLI to improve a prompt and write the result beside it.
pub async fn refine_prompt(ai_command: &str, path: &Path) -> Result<PathBuf> {
    let raw = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let entry = parse_prompt(path, &raw);
    let request = format!("{REFINE_INSTRUCTION}\n\n{}", entry.body.trim());
    let cwd = path.parent().unwrap_or_else(|| Path::new("."));
    let refined = external::run_ai(ai_command, &["-p".to_string(), request], cwd).await?;
    let out = refined_path(path);
    fs::write(&out, refined).with_context(|| format!("cannot write {}", out.display()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_sorted_with_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("b.md"),
            "---\nname: Alpha\ndescription: first\ntags: [x, y]\n---\nDo alpha\n",
        )
        .unwrap();
        fs::write(dir.path().join("zeta.md"), "---\nbroken\n").unwrap();
        fs::write(dir.path().join("ignored.txt"), "nope").unwrap();

        let prompts = list_prompts(dir.path()).unwrap();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].name, "Alpha");
        assert_eq!(prompts[0].tags, vec!["x", "y"]);
        assert_eq!(prompts[0].body, "Do alpha\n");
        assert_eq!(prompts[1].name, "zeta");
        assert_eq!(prompts[1].body, "---\nbroken\n");
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_prompts(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_create_prompt_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        let prompts_dir = dir.path().join("prompts");
        let path = create_prompt(&prompts_dir, Utc::now()).unwrap();
        let listed = list_prompts(&prompts_dir).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, path);
        assert_eq!(listed[0].name, "New prompt");
    }

    #[test]
    fn test_refined_path() {
        assert_eq!(refined_path(Path::new("/p/review.md")), PathBuf::from("/p/review.refined.md"));
    }
}
