// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2025 Brian Hetro <whee@smaertness.net>

//! Command-line interface for cpturns.
//!
//! This binary provides the `cpturns` command for converting a GitHub
//! Copilot chat export into one Markdown file per conversation turn.

use chrono::Local;
use cpturns::config::{Mode, RenderConfig};
use cpturns::convert::{self, SessionPlan};
use cpturns::output::{self, OutputLayout};
use cpturns::parser;
use cpturns::paths::PathNormalizer;
use cpturns::session::ArchiveRecord;
use lexopt::prelude::*;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "CPTURNS_LOG";

/// Input read when none is given.
const DEFAULT_INPUT: &str = "chat.json";

struct Cli {
    input: PathBuf,
    output: PathBuf,
    mode: Mode,
    full_terminal: bool,
    heading_offset: u8,
    quiet: bool,
    dry_run: bool,
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to parse arguments: {source}"))]
    ParseArgs { source: lexopt::Error },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse {}: {source}", path.display()))]
    ParseFile {
        path: PathBuf,
        source: parser::ParseError,
    },

    #[snafu(display("{source}"))]
    Storage { source: output::StorageError },

    #[snafu(display("{count} turn file(s) could not be written"))]
    WriteTurns { count: usize },
}

fn print_help() {
    println!(
        "\
{name} {version}
Convert GitHub Copilot chat exports to per-turn Markdown

Usage: {name} [OPTIONS] [INPUT] [OUTPUT]

Arguments:
  [INPUT]   Copilot chat export (default: chat.json)
  [OUTPUT]  Base output path; turns are written next to it as
            <name>_turn_<N>.md (default: INPUT with .md extension)

Modes (pick one, default: agent):
      --agent               Flat Markdown, reasoning in code blocks, edit contents hidden
      --human               Folded reasoning and edits, timestamps shown
      --fullout             Like agent, with full edit contents and terminal output

Options:
      --full-terminal       Never truncate terminal output
      --heading-offset <N>  Shift heading levels by N (0-5, default: 0)
  -q, --quiet               Suppress progress messages
  -n, --dry-run             Show what would be written without touching files
  -h, --help                Print help
  -V, --version             Print version

Set {log_env} (e.g. {log_env}=debug) to see diagnostics.",
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        log_env = LOG_ENV,
    );
}

fn parse_args() -> Result<Cli, lexopt::Error> {
    let mut positional: Vec<PathBuf> = Vec::new();
    let mut mode: Option<Mode> = None;
    let mut full_terminal = false;
    let mut heading_offset: u8 = 0;
    let mut quiet = false;
    let mut dry_run = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Long("agent" | "human" | "fullout") => {
                let selected = match arg {
                    Long("human") => Mode::Human,
                    Long("fullout") => Mode::Fullout,
                    _ => Mode::Agent,
                };
                if mode.is_some_and(|m| m != selected) {
                    return Err("--agent, --human and --fullout are mutually exclusive".into());
                }
                mode = Some(selected);
            }
            Long("full-terminal" | "fullterminal") => full_terminal = true,
            Long("heading-offset") => {
                let val: u8 = parser
                    .value()?
                    .parse()
                    .map_err(|_| "heading-offset must be a number 0-5")?;
                if val > 5 {
                    return Err("heading-offset must be 0-5".into());
                }
                heading_offset = val;
            }
            Short('q') | Long("quiet") => quiet = true,
            Short('n') | Long("dry-run") => dry_run = true,
            Short('h') | Long("help") => {
                print_help();
                std::process::exit(0);
            }
            Short('V') | Long("version") => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            Value(val) if positional.len() < 2 => positional.push(val.into()),
            _ => return Err(arg.unexpected()),
        }
    }

    let mut positional = positional.into_iter();
    let input = positional
        .next()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT));
    let output = positional
        .next()
        .unwrap_or_else(|| input.with_extension("md"));

    Ok(Cli {
        input,
        output,
        mode: mode.unwrap_or_default(),
        full_terminal,
        heading_offset,
        quiet,
        dry_run,
    })
}

/// Builds the render configuration from CLI arguments.
fn make_render_config(cli: &Cli) -> RenderConfig {
    let config = RenderConfig::for_mode(cli.mode).with_heading_offset(cli.heading_offset);
    if cli.full_terminal {
        config.with_full_terminal()
    } else {
        config
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<(), Error> {
    let cli = parse_args().context(ParseArgsSnafu)?;
    init_logging();

    let json = std::fs::read_to_string(&cli.input).context(ReadFileSnafu { path: &cli.input })?;
    let chat = parser::parse_chat(&json).context(ParseFileSnafu { path: &cli.input })?;

    let layout = OutputLayout::from_output_path(&cli.output);
    let paths = PathNormalizer::detect(layout.dir());
    match paths.root() {
        Some(root) => info!(root = %root.display(), "project root detected"),
        None => info!("no project root found; paths stay absolute"),
    }

    let config = make_render_config(&cli);
    let plan = convert::plan_session(&chat, &layout, &Local::now());
    let turns = convert::render_chat(&chat, &config, &paths);

    if cli.dry_run {
        report_dry_run(&plan, &layout, &turns);
        return Ok(());
    }

    let report = convert::write_outputs(&plan, &turns, &layout).context(StorageSnafu)?;

    if !cli.quiet {
        if let Some(archived) = &report.archived {
            eprintln!(
                "New session detected; archived {} file(s) to {}",
                archived.files.len(),
                archived.dir.display()
            );
        }
        for path in &report.written {
            eprintln!("Wrote {}", path.display());
        }
        if turns.is_empty() {
            eprintln!("No requests found in {}", cli.input.display());
        }
    }

    for err in &report.failed {
        eprintln!("Error: {err}");
    }
    ensure!(
        report.failed.is_empty(),
        WriteTurnsSnafu {
            count: report.failed.len()
        }
    );
    Ok(())
}

fn report_dry_run(plan: &SessionPlan, layout: &OutputLayout, turns: &[convert::RenderedTurn]) {
    if let ArchiveRecord::Archive { dir_name } = &plan.archive {
        let existing = output::existing_turn_files(layout).unwrap_or_default();
        eprintln!(
            "Would archive {} file(s) to {}",
            existing.len(),
            layout.dir().join(dir_name).display()
        );
    }
    for turn in turns {
        eprintln!("Would write {}", layout.turn_path(&turn.label).display());
    }
}
