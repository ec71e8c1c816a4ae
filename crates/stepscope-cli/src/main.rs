mod engine;
mod render;
mod ticker;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stepscope::protocol::parse_response;
use stepscope::{Config, Session, TickScheduler, VirtualClock};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::engine::CommandEngine;

#[derive(Parser)]
#[command(name = "stepscope")]
#[command(about = "Step through recorded program executions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one step of a saved engine response
    Show {
        /// Engine response (JSON)
        response: PathBuf,
        /// Step to show, starting at 1
        #[arg(long, default_value = "1")]
        step: usize,
    },
    /// Print the call tree of a saved engine response
    Tree {
        /// Engine response (JSON)
        response: PathBuf,
    },
    /// Autoplay a saved engine response to the end
    Play {
        /// Engine response (JSON)
        response: PathBuf,
        /// Autoplay cadence, overrides the configuration
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Step interactively. Commands: n (or empty line), b, p, r, g N, q
    Step {
        /// Engine response (JSON)
        response: PathBuf,
    },
    /// Run a source file through the engine and print the first step
    Run {
        /// Program to trace
        source: PathBuf,
        /// Engine command, overrides the configuration
        #[arg(long, num_args = 1.., allow_hyphen_values = true)]
        engine: Option<Vec<String>>,
    },
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_default_env().init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => Config::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Show { response, step } => show(&config, &response, step),
            Commands::Tree { response } => tree(&config, &response),
            Commands::Play {
                response,
                interval_ms,
            } => {
                if let Some(interval_ms) = interval_ms {
                    config.playback.interval_ms = interval_ms;
                }
                play(&config, &response).await
            }
            Commands::Step { response } => step_interactively(&config, &response).await,
            Commands::Run { source, engine } => {
                if let Some(command) = engine {
                    config.engine.command = command;
                }
                run(&config, &source).await
            }
        }
    })
}

/// Load a saved engine response into `session`. A failed run is not an
/// error here; it ends up in `session.error()`.
fn load<S: TickScheduler>(session: &mut Session<S>, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    session.begin_run();
    session.finish_run(parse_response(&text));
    Ok(())
}

/// Print the error panel if the last run failed.
fn report_failure<S: TickScheduler>(session: &Session<S>) -> Option<ExitCode> {
    let error = session.error()?;
    eprint!("{}", render::error_panel(error));
    Some(ExitCode::FAILURE)
}

fn print_current<S: TickScheduler>(session: &Session<S>) {
    match session.current_view() {
        Some(view) => println!("{}", render::step(&view)),
        None => println!("(empty trace)"),
    }
}

fn show(config: &Config, path: &Path, step: usize) -> Result<ExitCode> {
    let mut session = Session::new(VirtualClock::new(), config);
    load(&mut session, path)?;
    if let Some(code) = report_failure(&session) {
        return Ok(code);
    }
    session.playback_mut().set_step(step.saturating_sub(1));
    print_current(&session);
    Ok(ExitCode::SUCCESS)
}

fn tree(config: &Config, path: &Path) -> Result<ExitCode> {
    let mut session = Session::new(VirtualClock::new(), config);
    load(&mut session, path)?;
    if let Some(code) = report_failure(&session) {
        return Ok(code);
    }
    let tree = session.tree();
    if tree.roots().is_empty() {
        println!("(no calls)");
    } else {
        print!("{}", render::call_tree(&tree.view(None)));
    }
    if !session.recursive_funcs().is_empty() {
        println!("recursive: {}", session.recursive_funcs().join(", "));
    }
    Ok(ExitCode::SUCCESS)
}

async fn play(config: &Config, path: &Path) -> Result<ExitCode> {
    let (ticker, mut ticks) = ticker::channel();
    let mut session = Session::new(ticker, config);
    session
        .playback_mut()
        .subscribe(|change| log::debug!("playback: {change:?}"));
    load(&mut session, path)?;
    if let Some(code) = report_failure(&session) {
        return Ok(code);
    }

    print_current(&session);
    session.playback_mut().toggle_auto_play();
    while session.playback().auto_play() {
        let Some(token) = ticks.recv().await else {
            break;
        };
        let before = session.playback().current_step();
        session.playback_mut().on_tick(token);
        if session.playback().current_step() != before {
            print_current(&session);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn step_interactively(config: &Config, path: &Path) -> Result<ExitCode> {
    let (ticker, mut ticks) = ticker::channel();
    let mut session = Session::new(ticker, config);
    load(&mut session, path)?;
    if let Some(code) = report_failure(&session) {
        return Ok(code);
    }
    let log = session.playback().log().clone();

    print_current(&session);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let playback = session.playback_mut();
                let mut words = line.split_whitespace();
                match words.next() {
                    Some("n") | None => playback.step_forward(),
                    Some("b") => playback.step_backward(),
                    Some("p") => playback.toggle_auto_play(),
                    // Rewind: same log from the first step
                    Some("r") => playback.load_log(log.clone()),
                    Some("g") => match words.next().and_then(|n| n.parse::<usize>().ok()) {
                        Some(step) => playback.set_step(step.saturating_sub(1)),
                        None => {
                            eprintln!("usage: g <step>");
                            continue;
                        }
                    },
                    Some("q") => break,
                    Some(other) => {
                        eprintln!("unknown command {other:?} (n, b, p, r, g N, q)");
                        continue;
                    }
                }
                print_current(&session);
            }
            Some(token) = ticks.recv() => {
                let before = session.playback().current_step();
                session.playback_mut().on_tick(token);
                if session.playback().current_step() != before {
                    print_current(&session);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn run(config: &Config, path: &Path) -> Result<ExitCode> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let engine = CommandEngine::new(config.engine.command.clone());

    let mut session = Session::new(VirtualClock::new(), config);
    session.run(&engine, &source).await;
    if let Some(code) = report_failure(&session) {
        return Ok(code);
    }
    print_current(&session);
    Ok(ExitCode::SUCCESS)
}
