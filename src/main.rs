//! Purpose: `dexaudit` CLI entry point.
//! Role: Binary crate root; parses args, initializes logging, runs one audit, prints the report.
//! Invariants: Reports go to stdout; logs and errors go to stderr.
//! Invariants: Errors are text on a terminal and a JSON envelope otherwise.
//! Invariants: Process exit code is derived from `core::error::to_exit_code`.
//! Invariants: A failed run prints no partial report.
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;

use clap::error::ErrorKind as ClapErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use clap_complete::aot::Shell;
use dexaudit::core::aggregate::Strategy;
use dexaudit::core::error::{Error, ErrorKind, to_exit_code};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run(std::env::args_os()) {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run<I>(args: I) -> Result<RunOutcome, Error>
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(args) {
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
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint(clap_error_hint(&err)));
            }
        },
    };

    let started = Instant::now();
    let outcome = command_dispatch::dispatch_command(cli.command)
        .map_err(add_corrupt_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)?;
    tracing::info!(elapsed = ?started.elapsed(), "done");
    Ok(outcome)
}

#[derive(Parser)]
#[command(
    name = "dexaudit",
    version,
    about = "Read-only audits of node and matcher stores",
    long_about = None,
    after_help = r#"EXAMPLES
  $ dexaudit unprocessed --node ~/node/data --matcher ~/matcher/data
  $ dexaudit stats --node ~/node/data
  $ dexaudit stats --node ~/node/data --prefix transaction-info --strategy scan
  $ dexaudit prefixes

Logs go to stderr; set RUST_LOG (e.g. RUST_LOG=debug) to change verbosity."#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Weekly count of matcher transactions missing from the node",
        long_about = r#"Scan the matcher's transactions and look each one up in the node's
transaction index. Prints one block per UTC week (Monday to Sunday) with
unprocessed and total counts and the unprocessed rate."#
    )]
    Unprocessed(UnprocessedArgs),
    #[command(
        about = "Per-record-type counts and key/value sizes of the node store",
        long_about = r#"Count records and sum key and value sizes for every node record type.
The parallel strategy runs one bounded scan per prefix on a worker pool;
the scan strategy reads the store once and also reports unknown prefixes."#
    )]
    Stats(StatsArgs),
    #[command(about = "List the node record types and their prefixes")]
    Prefixes {
        #[arg(long, help = "Emit JSON")]
        json: bool,
    },
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
struct UnprocessedArgs {
    #[arg(
        long,
        value_name = "PATH",
        help = "Path to the node's store directory",
        value_hint = ValueHint::DirPath
    )]
    node: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        help = "Path to the matcher's store directory",
        value_hint = ValueHint::DirPath
    )]
    matcher: PathBuf,
    #[arg(long, help = "Emit JSON")]
    json: bool,
}

#[derive(Args)]
struct StatsArgs {
    #[arg(
        long,
        value_name = "PATH",
        help = "Path to the node's store directory",
        value_hint = ValueHint::DirPath
    )]
    node: PathBuf,
    #[arg(long, value_name = "PREFIX", help = "Only this record type (number or name)")]
    prefix: Option<String>,
    #[arg(long, value_enum, default_value = "parallel", help = "Aggregation strategy")]
    strategy: StrategyCli,
    #[arg(
        long,
        value_name = "N",
        help = "Worker threads for the parallel strategy (default: CPU count)"
    )]
    workers: Option<NonZeroUsize>,
    #[arg(long, help = "Emit JSON")]
    json: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StrategyCli {
    Parallel,
    Scan,
}

impl From<StrategyCli> for Strategy {
    fn from(value: StrategyCli) -> Self {
        match value {
            StrategyCli::Parallel => Strategy::Parallel,
            StrategyCli::Scan => Strategy::Scan,
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_text(text: &str) -> Result<(), Error> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write report")
                .with_source(err)
        })
}

fn emit_json(value: Value) -> Result<(), Error> {
    let mut text = serde_json::to_string_pretty(&value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })?;
    text.push('\n');
    emit_text(&text)
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() || err.kind() != ErrorKind::Io {
        return err;
    }
    err.with_hint(
        "RocksDB could not read the store. Check directory permissions, and that the node or \
         matcher is not rewriting the MANIFEST (stop it or audit a copy of the directory).",
    )
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "RocksDB reported a corrupt block or table. Copy the directory aside and run \
         `ldb --db=<copy> repair` (or let the node rebuild its state) before auditing again.",
    )
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint("Aggregation lost a worker result. Retry with RUST_LOG=debug and --workers 1.")
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
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
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(String::from_utf8_lossy(key)));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(key) = err.key() {
        lines.push(format!("key: {}", bstr::BStr::new(key)));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

/// Carries clap's usage line so a missing flag still shows how to call the command.
fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let usage = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .map(str::trim);
    match usage {
        Some(usage) => format!("Usage: {usage}. Try `dexaudit --help`."),
        None => "Try `dexaudit --help`.".to_string(),
    }
}
