//! Purpose: `resolvent` CLI entry point; runs conformance manifests against the engine.
//! Role: Binary crate root; parses args, installs tracing, emits the run report on stdout.
//! Invariants: Stdout carries only the JSON report; diagnostics and logs go to stderr.
//! Invariants: Errors are emitted as JSON on stderr with an exit code from `to_exit_code`.
//! Invariants: A report with collected failures exits with the mismatch code.
use std::error::Error as StdError;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use resolvent::api::{Error, ErrorKind, to_exit_code};
use resolvent::conformance::{RunOptions, load_manifest, run_manifest};

const LOG_ENV: &str = "RESOLVENT_LOG";

#[derive(Parser)]
#[command(
    name = "resolvent",
    version,
    about = "Run promise resolution scenarios from JSON manifests",
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Tracing filter directive, e.g. `resolvent=debug` (default: $RESOLVENT_LOG or warn)"
    )]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Execute a conformance manifest and print the run report",
        after_help = r#"EXAMPLES
  $ resolvent run conformance/chaining.json
  $ resolvent run --keep-going --pretty conformance/assimilation.json
  $ RESOLVENT_LOG=resolvent=trace resolvent run conformance/progress.json"#
    )]
    Run {
        #[arg(value_hint = ValueHint::FilePath, help = "Path to the manifest JSON file")]
        manifest: PathBuf,
        #[arg(long, help = "Collect expectation mismatches instead of stopping at the first")]
        keep_going: bool,
        #[arg(long, help = "Pretty-print the report")]
        pretty: bool,
    },
}

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err)));
            }
        },
    };

    init_tracing(cli.log.as_deref());

    match cli.command {
        Command::Run {
            manifest,
            keep_going,
            pretty,
        } => {
            let options = if keep_going {
                RunOptions::new().keep_going()
            } else {
                RunOptions::new()
            };
            let loaded = load_manifest(&manifest)?;
            let report = run_manifest(&loaded, &options)?;
            tracing::info!(
                steps = report.steps_run,
                failures = report.failures.len(),
                "manifest finished"
            );
            let rendered = if pretty {
                serde_json::to_string_pretty(&report)
            } else {
                serde_json::to_string(&report)
            }
            .map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode report")
                    .with_source(err)
            })?;
            println!("{rendered}");
            if report.passed() {
                Ok(0)
            } else {
                Ok(to_exit_code(ErrorKind::Mismatch))
            }
        }
    }
}

fn init_tracing(directive: Option<&str>) {
    let env_filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert(
        "message".to_string(),
        json!(err.message().unwrap_or("unexpected error")),
    );
    if let Some(step) = err.step() {
        inner.insert("step".to_string(), json!(step));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn emit_error(err: &Error) {
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}
