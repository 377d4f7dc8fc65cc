mod app;
mod config;
mod keys;
mod logging;
mod ui;

use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use app::App;
use config::Config;

/// Run several interactive agent sessions side by side, each in its own git worktree.
#[derive(Debug, Parser)]
#[command(name = "cwt", version)]
struct Cli {
    /// Repository to work in (defaults to the one containing the current directory).
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Config file (defaults to <config dir>/cwt/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Program to start in each tab, overriding the config.
    #[arg(long)]
    command: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    cwt_git::find_git_binary()?;
    let start = match &cli.repo {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let repo_root = find_repo_root(&start)?;

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(command) = cli.command {
        config.command = command;
    }
    ensure_on_path(&config.command)?;

    let log_path = logging::init(&repo_root)?;
    log::info!(
        "cwt {} starting in {} (log: {})",
        env!("CARGO_PKG_VERSION"),
        repo_root.display(),
        log_path.display()
    );

    let mut terminal = setup_terminal()?;
    let result = run(&mut terminal, &repo_root, &config);
    restore_terminal(&mut terminal)?;

    if let Err(e) = &result {
        log::error!("exiting with error: {e:#}");
    }
    result
}

fn run(terminal: &mut Terminal<CrosstermBackend<Stdout>>, repo_root: &Path, config: &Config) -> Result<()> {
    let size = terminal.size()?;
    let mut app = App::new(repo_root, config, size.height, size.width)?;
    let tick = Duration::from_millis(config.tick_ms);

    let result = event_loop(terminal, &mut app, tick);
    app.shutdown();
    result
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    tick: Duration,
) -> Result<()> {
    let mut dirty = true;
    while !app.should_quit {
        if dirty {
            terminal.draw(|frame| ui::render(app, frame))?;
        }

        dirty = app.tick();
        if event::poll(tick)? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                Event::Resize(cols, rows) => app.resize(rows, cols),
                Event::Paste(text) => app.paste(&text),
                _ => {}
            }
            dirty = true;
        }
    }
    Ok(())
}

/// Root of the repository containing `start`: git's answer if it has one,
/// otherwise `start` itself when it holds a `.git`.
fn find_repo_root(start: &Path) -> Result<PathBuf> {
    match cwt_git::show_toplevel(start) {
        Ok(root) => Ok(root),
        Err(e) if start.join(".git").exists() => {
            log::debug!("rev-parse failed ({e}), using {}", start.display());
            Ok(start.to_path_buf())
        }
        Err(e) => Err(e).with_context(|| format!("{} is not inside a git repository", start.display())),
    }
}

fn ensure_on_path(program: &str) -> Result<()> {
    let found = Command::new("which")
        .arg(program)
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !found {
        bail!("{program} not found on PATH");
    }
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, event::EnableBracketedPaste)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        event::DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    Ok(())
}
