/// External programs the dashboard hands work to: the user's editor, the
/// system clipboard, and the assistant CLI.
use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use anyhow::{anyhow, bail, Context, Result};
use tokio::process::Command;

// ── Editor ────────────────────────────────────────────────────────────────────

/// `<editor args...> [+line] <path>`. `editor` must be non-empty.
pub fn editor_command(editor: &[String], path: &Path, line: Option<usize>) -> Command {
    let (program, base_args) = match editor.split_first() {
        Some((p, rest)) => (p.as_str(), rest),
        None => ("vi", &[][..]),
    };
    let mut cmd = Command::new(program);
    cmd.args(base_args);
    if let Some(line) = line {
        cmd.arg(format!("+{line}"));
    }
    cmd.arg(path);
    cmd
}

/// Run the editor in the foreground and wait for it to exit.
/// The caller must have released the terminal first.
pub async fn run_editor(editor: &[String], path: &Path, line: Option<usize>) -> Result<()> {
    let status = editor_command(editor, path, line)
        .status()
        .await
        .with_context(|| format!("failed to launch {}", editor.join(" ")))?;
    if !status.success() {
        bail!("editor exited with {status}");
    }
    Ok(())
}

// ── Clipboard ─────────────────────────────────────────────────────────────────

/// Clipboard writers to try, in order.
pub fn clipboard_candidates(macos: bool, wayland: bool) -> Vec<&'static [&'static str]> {
    if macos {
        return vec![&["pbcopy"][..]];
    }
    let mut out: Vec<&'static [&'static str]> = Vec::new();
    if wayland {
        out.push(&["wl-copy"]);
    }
    out.push(&["xclip", "-selection", "clipboard"]);
    out.push(&["xsel", "--clipboard", "--input"]);
    out
}

/// Pipe `text` into the first clipboard tool that runs. Blocking.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let macos = cfg!(target_os = "macos");
    let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
    for argv in clipboard_candidates(macos, wayland) {
        let Ok(mut child) = std::process::Command::new(argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        else {
            continue;
        };
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
        }
        let status = child.wait()?;
        if status.success() {
            return Ok(());
        }
    }
    Err(anyhow!("no clipboard tool available (tried pbcopy, wl-copy, xclip, xsel)"))
}

// ── Assistant CLI ─────────────────────────────────────────────────────────────

/// Run the assistant CLI non-interactively and return its stdout.
pub async fn run_ai(ai_command: &str, args: &[String], cwd: &Path) -> Result<String> {
    let output = Command::new(ai_command)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run {ai_command}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{ai_command} exited with {}: {}", output.status, stderr.trim());
    }
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if stdout.trim().is_empty() {
        bail!("{ai_command} produced no output");
    }
    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editor_command_args() {
        let editor = vec!["code".to_string(), "-w".to_string()];
        let cmd = editor_command(&editor, Path::new("/tmp/a.rs"), Some(42));
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "code");
        let args: Vec<_> = std_cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, vec!["-w", "+42", "/tmp/a.rs"]);

        let cmd = editor_command(&["vi".to_string()], Path::new("x"), None);
        assert_eq!(cmd.as_std().get_args().count(), 1);
    }

    #[test]
    fn test_clipboard_candidates() {
        assert_eq!(clipboard_candidates(true, true), vec![&["pbcopy"][..]]);
        let linux = clipboard_candidates(false, true);
        assert_eq!(linux[0], &["wl-copy"][..]);
        assert_eq!(linux.len(), 3);
        assert_eq!(clipboard_candidates(false, false)[0][0], "xclip");
    }

    #[tokio::test]
    async fn test_run_ai_reports_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_ai("hookline-no-such-binary", &[], dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("hookline-no-such-binary"));
    }
}
