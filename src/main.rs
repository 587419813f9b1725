// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Pebble - runs JSON-serialized Pebble programs on the bytecode VM.

use anyhow::Context;
use clap::Parser;
use owo_colors::OwoColorize;
use pebble_vm::{AsyncEngine, Config, Diagnostic, Error};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "pebble",
    about = "Compile and run Pebble programs",
    version,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Program file (a JSON-serialized syntax tree)
    program: PathBuf,

    /// Print the bytecode listing instead of running
    #[arg(short = 'd', long)]
    disassemble: bool,

    /// Do not echo program output to the console
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of active call frames
    #[arg(long, value_name = "N")]
    max_call_depth: Option<usize>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Log every dispatched instruction
    #[arg(long)]
    trace: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.trace {
        "pebble=debug,pebble_vm=trace"
    } else if cli.verbose {
        "pebble=debug,pebble_vm=debug"
    } else {
        "pebble=warn,pebble_vm=error"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let trace = config.trace_instructions || cli.trace;
    config = config.with_echo(!cli.quiet).with_trace_instructions(trace);
    if let Some(depth) = cli.max_call_depth {
        config = config.with_max_call_depth(depth);
    }
    let engine = AsyncEngine::with_config(config);

    if cli.disassemble {
        let compiled = engine
            .compile_file(&cli.program)
            .await
            .with_context(|| format!("failed to compile {}", cli.program.display()))?;
        print!("{}", compiled.listing());
        return Ok(ExitCode::SUCCESS);
    }

    tracing::debug!(program = %cli.program.display(), "running");
    match engine.run_file(&cli.program).await {
        Ok(execution) => {
            print_diagnostics(&execution.diagnostics);
            Ok(ExitCode::SUCCESS)
        }
        Err(Error::Fatal { .. }) => {
            let diagnostics = engine
                .with_engine(|engine| engine.vm().diagnostics().to_vec())
                .await;
            print_diagnostics(&diagnostics);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        if diagnostic.is_fatal() {
            eprintln!("{}: {}", "Error".red().bold(), diagnostic);
        } else {
            eprintln!("{}: {}", "Warning".yellow().bold(), diagnostic);
        }
    }
}
