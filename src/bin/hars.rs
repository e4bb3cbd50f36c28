//! HARS CLI - Command-line interface for pattern-to-model matching
//!
//! Commands:
//! - match: Label an annotated stream with activity models and emit intervals
//! - validate-models: Check an activity model library
//! - prepare: Write the discovery tool's input and config files from raw events
//! - doctor: Diagnose installation and configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use hars::casas;
use hars::config::DEFAULT_MAX_MODELS;
use hars::export;
use hars::model::parse_model_specs;
use hars::{
    ActivityDiscoverer, ActivityInterval, ActivityModel, ConfigurationError, Event, InMemoryStore,
    MatchError, MatcherConfig, ModelLibrary, PreAnnotated, HARS_VERSION,
};

/// HARS - Human activity recognition by pattern-to-model matching
#[derive(Parser)]
#[command(name = "hars")]
#[command(version = HARS_VERSION)]
#[command(about = "Match discovered action patterns against expert activity models", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label an annotated event stream and emit activity intervals
    Match {
        /// Activity model library (JSON mapping of name to model)
        #[arg(short, long)]
        models: PathBuf,

        /// Annotated file from the discovery tool (use - for stdin)
        #[arg(short, long)]
        annotated: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Subject the stream belongs to
        #[arg(long, default_value = "subject")]
        subject: String,

        /// Pattern numbers rejected by the discovery tool (comma-separated)
        #[arg(long, value_delimiter = ',')]
        reject: Vec<u32>,

        /// Matcher configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Also write the labeled event stream as NDJSON
        #[arg(long)]
        audit: Option<PathBuf>,
    },

    /// Check an activity model library
    ValidateModels {
        /// Activity model library (use - for stdin)
        #[arg(short, long)]
        models: PathBuf,

        /// Maximum number of models
        #[arg(long, default_value_t = DEFAULT_MAX_MODELS)]
        max_models: usize,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the discovery tool's input and config files from raw events
    Prepare {
        /// Raw events as NDJSON (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Data file to write
        #[arg(long, default_value = "casas.csv")]
        data: PathBuf,

        /// Config file to write
        #[arg(long, default_value = "casas.config")]
        config: PathBuf,
    },

    /// Diagnose installation and configuration
    Doctor {
        /// Check a matcher configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one interval per line)
    Ndjson,
    /// JSON array of intervals
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, filtered by `HARS_LOG` (default `info`)
fn init_tracing() {
    let filter = EnvFilter::try_from_env("HARS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), HarsCliError> {
    match cli.command {
        Commands::Match {
            models,
            annotated,
            output,
            output_format,
            subject,
            reject,
            config,
            audit,
        } => cmd_match(MatchArgs {
            models: &models,
            annotated: &annotated,
            output: &output,
            output_format,
            subject: &subject,
            reject,
            config: config.as_deref(),
            audit: audit.as_deref(),
        }),

        Commands::ValidateModels {
            models,
            max_models,
            json,
        } => cmd_validate_models(&models, max_models, json),

        Commands::Prepare {
            input,
            data,
            config,
        } => cmd_prepare(&input, &data, &config),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

struct MatchArgs<'a> {
    models: &'a Path,
    annotated: &'a Path,
    output: &'a Path,
    output_format: OutputFormat,
    subject: &'a str,
    reject: Vec<u32>,
    config: Option<&'a Path>,
    audit: Option<&'a Path>,
}

fn cmd_match(args: MatchArgs<'_>) -> Result<(), HarsCliError> {
    let config = match args.config {
        Some(path) => MatcherConfig::from_json(&fs::read_to_string(path)?)?,
        None => MatcherConfig::default(),
    };
    let specs = parse_model_specs(&read_input(args.models)?).map_err(MatchError::from)?;
    let events = casas::parse_annotated(&read_input(args.annotated)?)?;

    let mut sink = InMemoryStore::new();
    let report = ActivityDiscoverer::new(config).run_stream(
        args.subject,
        events,
        specs,
        &PreAnnotated::new(args.reject),
        &mut sink,
    )?;

    if let Some(path) = args.audit {
        let mut file = fs::File::create(path)?;
        export::write_labeled_events(&mut file, &report.match_run.labeled_events)?;
    }

    let intervals = report.into_result()?;
    write_output(args.output, &format_output(&intervals, &args.output_format)?)
}

fn cmd_validate_models(models: &Path, max_models: usize, json: bool) -> Result<(), HarsCliError> {
    let specs = parse_model_specs(&read_input(models)?).map_err(MatchError::from)?;

    let mut entries = Vec::new();
    let mut valid = Vec::new();
    for (name, spec) in &specs {
        match ActivityModel::from_spec(name, spec) {
            Ok(model) => {
                entries.push(ModelCheck {
                    name: name.clone(),
                    error: None,
                });
                valid.push(model);
            }
            Err(e) => entries.push(ModelCheck {
                name: name.clone(),
                error: Some(e.to_string()),
            }),
        }
    }

    let library_error = ModelLibrary::new(valid, max_models)
        .err()
        .map(|e| e.to_string());
    let invalid = entries.iter().filter(|e| e.error.is_some()).count();

    let report = ModelReport {
        total_models: entries.len(),
        invalid_models: invalid,
        library_error,
        models: entries,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Model Library Report");
        println!("====================");
        println!("Total models:   {}", report.total_models);
        println!("Invalid models: {}", report.invalid_models);
        for check in &report.models {
            match &check.error {
                None => println!("  [OK]  {}", check.name),
                Some(error) => println!("  [ERR] {}: {}", check.name, error),
            }
        }
        if let Some(error) = &report.library_error {
            println!("\nLibrary: {}", error);
        }
    }

    if report.invalid_models > 0 || report.library_error.is_some() {
        Err(HarsCliError::ValidationFailed(
            report.invalid_models + usize::from(report.library_error.is_some()),
        ))
    } else {
        Ok(())
    }
}

fn cmd_prepare(input: &Path, data: &Path, config: &Path) -> Result<(), HarsCliError> {
    let events: Vec<Event> = export::read_ndjson(&read_input(input)?)?;
    if events.is_empty() {
        return Err(HarsCliError::NoEvents);
    }

    fs::write(data, casas::to_casas_input(&events))?;
    fs::write(
        config,
        casas::casas_config(&events, &data.to_string_lossy()),
    )?;

    tracing::info!(
        events = events.len(),
        data = %data.display(),
        config = %config.display(),
        "discovery tool input written"
    );
    Ok(())
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), HarsCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "hars_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("HARS version {}", HARS_VERSION),
    });

    let log_filter = std::env::var("HARS_LOG").unwrap_or_else(|_| "info (default)".to_string());
    checks.push(DoctorCheck {
        name: "log_filter".to_string(),
        status: CheckStatus::Ok,
        message: format!("HARS_LOG = {}", log_filter),
    });

    if let Some(config_path) = config {
        if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(content) => match MatcherConfig::from_json(&content) {
                    Ok(parsed) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid (weights a={} d={} s={} l={}, max {} models)",
                            parsed.weights.action,
                            parsed.weights.duration,
                            parsed.weights.start_time,
                            parsed.weights.location,
                            parsed.max_models
                        ),
                    }),
                    Err(e) => checks.push(DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid config: {}", e),
                    }),
                },
                Err(e) => checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                }),
            }
        } else {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "Config file does not exist".to_string(),
            });
        }
    }

    checks.push(stdin_input_check());

    let report = DoctorReport {
        version: HARS_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("HARS Doctor Report");
        println!("==================");
        println!("Version: {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(HarsCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

/// Whether `-` can stand for one of the file inputs (`--annotated`, `--models`, `--input`)
fn stdin_input_check() -> DoctorCheck {
    stdin_input_verdict(atty::is(atty::Stream::Stdin))
}

fn stdin_input_verdict(stdin_is_terminal: bool) -> DoctorCheck {
    let (status, message) = if stdin_is_terminal {
        (
            CheckStatus::Warning,
            "stdin is a terminal, so '-' inputs would wait for typed lines",
        )
    } else {
        (
            CheckStatus::Ok,
            "stdin is piped, one of --annotated, --models or --input can be '-'",
        )
    };
    DoctorCheck {
        name: "stdin_input".to_string(),
        status,
        message: message.to_string(),
    }
}

fn read_input(path: &Path) -> Result<String, HarsCliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn write_output(path: &Path, data: &str) -> Result<(), HarsCliError> {
    if path.to_string_lossy() == "-" {
        let mut stdout = io::stdout();
        stdout.write_all(data.as_bytes())?;
        stdout.flush()?;
    } else {
        fs::write(path, data)?;
    }
    Ok(())
}

fn format_output(
    intervals: &[ActivityInterval],
    format: &OutputFormat,
) -> Result<String, HarsCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut buffer = Vec::new();
            export::write_intervals(&mut buffer, intervals)?;
            String::from_utf8(buffer).map_err(|e| HarsCliError::ParseError(e.to_string()))
        }
        OutputFormat::Json => Ok(serde_json::to_string(intervals)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(intervals)?),
    }
}

// Error handling

#[derive(Debug)]
enum HarsCliError {
    Io(io::Error),
    Match(MatchError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
    ParseError(String),
}

impl From<io::Error> for HarsCliError {
    fn from(e: io::Error) -> Self {
        HarsCliError::Io(e)
    }
}

impl From<MatchError> for HarsCliError {
    fn from(e: MatchError) -> Self {
        HarsCliError::Match(e)
    }
}

impl From<serde_json::Error> for HarsCliError {
    fn from(e: serde_json::Error) -> Self {
        HarsCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<HarsCliError> for CliError {
    fn from(e: HarsCliError) -> Self {
        match e {
            HarsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            HarsCliError::Match(e) => {
                let (code, hint) = match &e {
                    MatchError::InvalidLibrary {
                        source: ConfigurationError::TooManyModels { .. },
                        ..
                    } => (
                        "MODEL_ERROR",
                        "Raise max_models in the matcher config (--config)",
                    ),
                    MatchError::Configuration(_) | MatchError::InvalidLibrary { .. } => (
                        "MODEL_ERROR",
                        "Run 'hars validate-models' for details",
                    ),
                    MatchError::Persistence { .. } => {
                        ("PERSISTENCE_ERROR", "Check the interval store")
                    }
                    MatchError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    MatchError::Io(_) => ("IO_ERROR", "Check file paths and permissions"),
                    _ => (
                        "PARSE_ERROR",
                        "Annotated lines need 7 tab-separated columns",
                    ),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            HarsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            HarsCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            HarsCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} problems in the model library", count),
                hint: Some("Fix the listed models and retry".to_string()),
            },
            HarsCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
            HarsCliError::ParseError(msg) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: msg,
                hint: Some("Check input format".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ModelReport {
    total_models: usize,
    invalid_models: usize,
    library_error: Option<String>,
    models: Vec<ModelCheck>,
}

#[derive(serde::Serialize)]
struct ModelCheck {
    name: String,
    error: Option<String>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Debug, serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Debug, serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
