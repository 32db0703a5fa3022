/// Diagnostic logging. The terminal belongs to the UI, so records go to a
/// file: `$XDG_STATE_HOME/hookline/hookline.log` (or `~/.local/state/...`).
///
/// Level: `HOOKLINE_LOG` (an EnvFilter directive) wins, then `--debug`, then
/// `info`.
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "HOOKLINE_LOG";

pub fn log_path() -> PathBuf {
    let state_home = std::env::var("XDG_STATE_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".local").join("state"))
        })
        .unwrap_or_else(std::env::temp_dir);
    state_home.join(crate::APP_NAME).join(format!("{}.log", crate::APP_NAME))
}

fn default_level(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

/// Install the global subscriber. Returns the log file path, or None when
/// the file could not be opened (logging is then discarded).
pub fn init(debug: bool) -> Option<PathBuf> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level(debug)));
    let path = log_path();
    let file = path
        .parent()
        .map(fs::create_dir_all)
        .transpose()
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
    match file {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init();
            Some(path)
        }
        Err(_) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::sink)
                .try_init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(true), "debug");
        assert_eq!(default_level(false), "info");
    }

    #[test]
    fn test_log_path_file_name() {
        let p = log_path();
        assert!(p.ends_with("hookline/hookline.log"));
    }
}
