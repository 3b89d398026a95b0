//! Purpose: `student-registry` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs the server or client commands, emits JSON on stdout.
//! Invariants: Successful client commands print one JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};

mod serve;

use student_registry::api::{
    Error, ErrorKind, RegisterRequest, RemoteClient, StudentId, to_exit_code,
};

const DEFAULT_BIND: &str = "127.0.0.1:8000";
const DEFAULT_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_MAX_BODY_BYTES: u64 = 1024 * 1024;

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
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
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
                    .with_hint("Run `student-registry --help` for usage."));
            }
        },
    };

    dispatch_command(cli.command)
}

#[derive(Parser)]
#[command(
    name = "student-registry",
    version,
    about = "Register students and look them up over HTTP",
    long_about = None,
    after_help = r#"EXAMPLES
  $ student-registry serve
  $ student-registry register --name "Ada Lovelace" --email ada@example.edu --age 36 --course Analysis --course Mechanics
  $ student-registry show 1001 --include-grades --semester Fall2024"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve the registry over HTTP (loopback by default)",
        after_help = r#"EXAMPLES
  $ student-registry serve
  $ student-registry serve --bind 127.0.0.1:9000
  $ student-registry serve check

NOTES
  - Records live in memory and are lost when the server exits
  - Set RUST_LOG (e.g. RUST_LOG=debug) to adjust log verbosity"#
    )]
    Serve {
        #[command(subcommand)]
        subcommand: Option<ServeSubcommand>,
        #[command(flatten)]
        run: ServeRunArgs,
    },
    #[command(about = "Register a student with a running server")]
    Register(RegisterArgs),
    #[command(about = "Show a registered student")]
    Show(ShowArgs),
}

#[derive(Subcommand)]
enum ServeSubcommand {
    #[command(about = "Validate serve config and print it without starting")]
    Check,
}

#[derive(Args)]
struct ServeRunArgs {
    #[arg(
        long,
        default_value = DEFAULT_BIND,
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
    #[arg(
        long,
        help = "Allow non-loopback binds (no authentication is provided)",
        help_heading = "Safety"
    )]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_BODY_BYTES,
        help = "Max request body size in bytes",
        help_heading = "Safety"
    )]
    max_body_bytes: u64,
}

#[derive(Args)]
struct RegisterArgs {
    #[arg(long, default_value = DEFAULT_URL, help = "Server base URL")]
    url: String,
    #[arg(long, help = "Student name")]
    name: String,
    #[arg(long, help = "Student email address")]
    email: String,
    #[arg(long, allow_negative_numbers = true, help = "Student age")]
    age: i64,
    #[arg(
        long = "course",
        value_name = "COURSE",
        help = "Course to enroll in (repeatable, 1-5)"
    )]
    courses: Vec<String>,
}

#[derive(Args)]
struct ShowArgs {
    #[arg(long, default_value = DEFAULT_URL, help = "Server base URL")]
    url: String,
    #[arg(help = "Student ID returned by `register`")]
    student_id: StudentId,
    #[arg(long, help = "Include recorded grades")]
    include_grades: bool,
    #[arg(long, help = "Semester filter, e.g. Fall2024")]
    semester: Option<String>,
}

fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Serve { subcommand, run } => {
            let config = serve_config_from_run_args(run)?;
            match subcommand {
                Some(ServeSubcommand::Check) => {
                    serve::validate_config(&config)?;
                    emit_json(&json!({
                        "bind": config.bind.to_string(),
                        "base_url": format!("http://{}", config.bind),
                        "allow_non_loopback": config.allow_non_loopback,
                        "max_body_bytes": config.max_body_bytes,
                    }))?;
                    Ok(RunOutcome::ok())
                }
                None => {
                    let runtime = tokio::runtime::Builder::new_multi_thread()
                        .enable_all()
                        .build()
                        .map_err(|err| {
                            Error::new(ErrorKind::Internal)
                                .with_message("failed to start runtime")
                                .with_source(err)
                        })?;
                    runtime.block_on(serve::serve(config))?;
                    Ok(RunOutcome::ok())
                }
            }
        }
        Command::Register(args) => {
            let client = RemoteClient::new(args.url)?;
            let request = RegisterRequest {
                name: args.name,
                email: args.email,
                age: args.age,
                courses: args.courses,
            };
            let registration = client.register(&request).map_err(add_connect_hint)?;
            emit_json(&registration)?;
            Ok(RunOutcome::ok())
        }
        Command::Show(args) => {
            let client = RemoteClient::new(args.url)?;
            let info = client
                .lookup(args.student_id, args.include_grades, args.semester.as_deref())
                .map_err(add_connect_hint)?;
            emit_json(&info)?;
            Ok(RunOutcome::ok())
        }
    }
}

fn serve_config_from_run_args(run: ServeRunArgs) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = run.bind.parse().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid bind address '{}'", run.bind))
            .with_hint("Use host:port, e.g. 127.0.0.1:8000.")
            .with_source(err)
    })?;
    Ok(serve::ServeConfig {
        bind,
        allow_non_loopback: run.allow_non_loopback,
        max_body_bytes: run.max_body_bytes,
    })
}

fn add_connect_hint(err: Error) -> Error {
    if err.kind() == ErrorKind::Io && err.hint().is_none() {
        return err.with_hint("Is the server running? Start it with `student-registry serve`.");
    }
    err
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim_start_matches("error: ").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_json(value: &impl serde::Serialize) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode json")
            .with_source(err)
    })?;
    println!("{json}");
    Ok(())
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Validation => "validation failed".to_string(),
        ErrorKind::BadRequest => "bad request".to_string(),
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
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }
    if let Some(student_id) = err.student_id() {
        inner.insert("student_id".to_string(), json!(student_id));
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
    if let Some(field) = err.field() {
        lines.push(format!("field: {field}"));
    }
    if let Some(student_id) = err.student_id() {
        lines.push(format!("student_id: {student_id}"));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
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
