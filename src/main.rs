mod config;
mod context;
mod daemon;
mod diff;
mod external;
mod frontmatter;
mod highlight;
mod history;
mod ingress;
mod logging;
mod parser;
mod plan;
mod prompts;
mod ralph;
mod tui;
mod vcs;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use config::{ConfigFile, ResolvedConfig};
use ingress::IngressServer;
use tracing::info;

pub const APP_NAME: &str = "hookline";

#[derive(Parser, Debug)]
#[command(
    name = "hookline",
    about = "Watch an AI coding assistant's file edits as they happen",
    long_about = None,
)]
struct Args {
    /// Workspace to watch (default: current directory)
    #[arg(short = 'C', long, value_name = "DIR")]
    workspace: Option<PathBuf>,

    /// Listen on this socket instead of the per-user, per-workspace default
    #[arg(long, env = "HOOKLINE_SOCKET", value_name = "PATH")]
    socket: Option<PathBuf>,

    /// History daemon socket (overrides the config file)
    #[arg(long, env = "HOOKLINE_DAEMON_SOCKET", value_name = "PATH")]
    daemon_socket: Option<PathBuf>,

    /// Print the ingress socket path for this workspace and exit
    #[arg(long)]
    print_socket: bool,

    /// Log at debug level (HOOKLINE_LOG overrides)
    #[arg(short, long)]
    debug: bool,

    /// Write a default config file to ~/.config/hookline/config.toml and exit
    #[arg(long)]
    init: bool,

    /// Generate shell completions and print to stdout (bash, zsh, fish, elvish)
    #[arg(long, value_name = "SHELL")]
    completions: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── --init ────────────────────────────────────────────────────────────────
    if args.init {
        let path = ConfigFile::write_default_if_missing()?;
        println!("Config written to: {}", path.display());
        println!("Edit it, then run: hookline");
        return Ok(());
    }

    // ── --completions ─────────────────────────────────────────────────────────
    if let Some(shell_name) = &args.completions {
        return generate_completions(shell_name);
    }

    let workspace = match &args.workspace {
        Some(dir) => dir
            .canonicalize()
            .with_context(|| format!("cannot open workspace {}", dir.display()))?,
        None => ingress::workspace_root()?,
    };
    let socket = args
        .socket
        .clone()
        .unwrap_or_else(|| ingress::socket_path_for(&workspace, &ingress::current_user()));

    // ── --print-socket ────────────────────────────────────────────────────────
    if args.print_socket {
        println!("{}", socket.display());
        return Ok(());
    }

    let file = ConfigFile::load()?;
    let mut resolved = ResolvedConfig::resolve(&file);
    if let Some(daemon_socket) = args.daemon_socket {
        resolved.daemon_socket = daemon_socket;
    }

    let log_file = logging::init(args.debug);
    info!(
        event = "startup",
        version = env!("CARGO_PKG_VERSION"),
        workspace = %workspace.display(),
        socket = %socket.display(),
        log = ?log_file,
    );

    let server = IngressServer::bind(&socket).context("cannot listen for hook events")?;
    tui::run(resolved, workspace, server).await
}

// ── Shell completions ─────────────────────────────────────────────────────────

fn generate_completions(shell_name: &str) -> Result<()> {
    use clap_complete::{Shell, generate};

    let shell: Shell = match shell_name.to_lowercase().as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "elvish" => Shell::Elvish,
        _ => {
            eprintln!("Unknown shell: {shell_name}");
            eprintln!("Supported: bash, zsh, fish, elvish");
            std::process::exit(1);
        }
    };

    let mut cmd = Args::command();
    generate(shell, &mut cmd, APP_NAME, &mut std::io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from(["hookline", "-C", "/tmp", "--debug"]).unwrap();
        assert_eq!(args.workspace, Some(PathBuf::from("/tmp")));
        assert!(args.debug);
        assert!(!args.print_socket);
    }

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }
}
