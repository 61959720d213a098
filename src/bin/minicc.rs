//! Command-line driver: reads a front-end AST, runs the pipeline, and
//! optionally dumps the intermediate IR and/or final assembly to disk.

use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
use minic_backend::{read_ast, run, OptLevel};

/// Compile a miniC AST (front-end JSON) to 32-bit x86 assembly.
#[derive(Debug, Parser)]
#[command(name = "minicc", version, about)]
struct Cli {
    /// Path to the front-end's AST, serialized as JSON.
    input: PathBuf,

    /// Write the optimized IR listing to this path.
    #[arg(long, value_name = "PATH")]
    emit_ir: Option<PathBuf>,

    /// Write the generated assembly to this path.
    #[arg(long, value_name = "PATH")]
    emit_asm: Option<PathBuf>,

    /// Optimization level: 0 disables the optimizer entirely, 1 runs it to
    /// a fixpoint.
    #[arg(long, value_name = "LEVEL", default_value_t = 1)]
    opt_level: u8,

    /// Increase log verbosity; repeatable (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn level_filter(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new().filter_level(level_filter(cli.verbose)).init();

    let opt_level = match cli.opt_level {
        0 => OptLevel::O0,
        _ => OptLevel::O1,
    };

    if let Err(err) = compile(&cli, opt_level) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

fn compile(cli: &Cli, opt_level: OptLevel) -> anyhow::Result<()> {
    let program = read_ast(&cli.input)?;
    let output = run(&program, opt_level)?;

    if let Some(path) = &cli.emit_ir {
        std::fs::write(path, output.module.to_string())?;
    }
    if let Some(path) = &cli.emit_asm {
        std::fs::write(path, &output.assembly)?;
    } else {
        print!("{}", output.assembly);
    }
    Ok(())
}
