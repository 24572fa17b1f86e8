//! Small Basic interpreter
//!
//! Runs a `.sb` program against the terminal. Program output goes to
//! stdout, diagnostics and logs go to stderr.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser as _;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use smallbasic::basic::{parser, Interpreter, StdConsole};

#[derive(Debug, clap::Parser)]
#[command(name = "smallbasic", version, about = "Run a Small Basic program")]
struct Cli {
    /// Program source file
    file: PathBuf,

    /// Arguments passed to the program (Program.GetArgument)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Milliseconds to sleep when every thread is waiting
    #[arg(long, default_value_t = 1)]
    tick_ms: u64,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{}: {}", cli.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let program = match parser::parse(&source) {
        Ok(program) => program,
        Err(errors) => {
            eprint!("{}", errors.annotate(&source));
            eprintln!("{}: {} syntax error(s)", cli.file.display(), errors.len());
            return ExitCode::FAILURE;
        }
    };
    debug!(statements = program.len(), "parsed {}", cli.file.display());

    let mut interpreter = Interpreter::new()
        .with_args(cli.args)
        .with_idle(Duration::from_millis(cli.tick_ms));
    let directory = cli
        .file
        .canonicalize()
        .ok()
        .and_then(|path| path.parent().map(|dir| dir.display().to_string()));
    if let Some(dir) = directory {
        interpreter = interpreter.with_directory(dir);
    }

    match interpreter.run(program, Box::new(StdConsole::new())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("run aborted: {}", e);
            eprintln!("runtime error: {}", e);
            ExitCode::FAILURE
        }
    }
}
