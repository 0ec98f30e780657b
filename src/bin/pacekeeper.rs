//! Pacekeeper CLI - inspect plans and validate configuration
//!
//! Commands:
//! - motion: Plan a pointer trajectory between two points
//! - typing: Plan keystrokes for a piece of text
//! - scroll: Plan a stepped scroll
//! - schedule: Show the operating-window status at an instant
//! - doctor: Validate a configuration file

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pacekeeper::config::GovernorConfig;
use pacekeeper::logging::{init_tracing, LogFormat};
use pacekeeper::schedule::ScheduleWindow;
use pacekeeper::types::Point;
use pacekeeper::{GovernError, Governor, PACEKEEPER_VERSION};

/// Pacekeeper - behavioral pacing and adaptive governance engine
#[derive(Parser)]
#[command(name = "pacekeeper")]
#[command(version = PACEKEEPER_VERSION)]
#[command(about = "Plan humanlike input and check operating limits", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a pointer trajectory
    Motion {
        /// Start point as X,Y
        #[arg(long, value_parser = parse_point)]
        from: Point,

        /// Target point as X,Y
        #[arg(long, value_parser = parse_point)]
        to: Point,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Plan keystrokes for a piece of text
    Typing {
        /// Text to type
        #[arg(long)]
        text: String,

        /// Fixed words-per-minute rate (random within the configured range when omitted)
        #[arg(long)]
        wpm: Option<u32>,

        /// Use neighbouring-key typos with visible self-correction
        #[arg(long)]
        corrections: bool,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Plan a stepped scroll
    Scroll {
        /// Distance in pixels
        #[arg(long)]
        distance: u32,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the operating-window status
    Schedule {
        /// Instant to evaluate (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Validate configuration and environment
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

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

fn run(cli: Cli) -> Result<(), PacekeeperCliError> {
    if let Commands::Doctor { json } = cli.command {
        return cmd_doctor(cli.config.as_deref(), json);
    }

    let config = load_config(cli.config.as_deref())?;
    let format = config.logging.format.unwrap_or_else(|| {
        if atty::is(atty::Stream::Stderr) {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    });
    init_tracing(&config.logging.level, format)?;

    match cli.command {
        Commands::Motion { from, to, seed } => {
            let mut governor = governor_with_seed(config, seed)?;
            print_json(&governor.plan_motion(from, to))
        }

        Commands::Typing {
            text,
            wpm,
            corrections,
            seed,
        } => {
            let mut governor = governor_with_seed(config, seed)?;
            let plan = if corrections {
                governor.plan_with_corrections(&text)
            } else {
                governor.plan_typing_at(&text, wpm.unwrap_or(0))
            };
            print_json(&plan)
        }

        Commands::Scroll { distance, seed } => {
            let mut governor = governor_with_seed(config, seed)?;
            print_json(&governor.plan_scroll(distance))
        }

        Commands::Schedule { at } => cmd_schedule(&config, at.as_deref()),

        Commands::Doctor { .. } => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> Result<GovernorConfig, PacekeeperCliError> {
    match path {
        Some(path) => Ok(GovernorConfig::from_path(path)?),
        None => Ok(GovernorConfig::default()),
    }
}

fn governor_with_seed(
    mut config: GovernorConfig,
    seed: Option<u64>,
) -> Result<Governor, PacekeeperCliError> {
    if seed.is_some() {
        config.seed = seed;
    }
    Ok(Governor::new(config)?)
}

fn cmd_schedule(config: &GovernorConfig, at: Option<&str>) -> Result<(), PacekeeperCliError> {
    let now = match at {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map_err(|e| PacekeeperCliError::InvalidArgument(format!("--at {raw:?}: {e}")))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let window = ScheduleWindow::from_config(&config.schedule)?;
    let report = ScheduleReport {
        at: now,
        timezone: window.timezone().name().to_string(),
        status: window.status(now),
        next_opening: window.next_opening(now),
        poll_delay_secs: window.next_poll_delay(now).as_secs(),
    };
    print_json(&report)
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), PacekeeperCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Pacekeeper version {}", PACEKEEPER_VERSION),
    });

    let config = match config_path {
        Some(path) if !path.exists() => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Config file {} does not exist", path.display()),
            });
            None
        }
        Some(path) => match GovernorConfig::from_path(path) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Loaded {}", path.display()),
                });
                Some(config)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot load config: {}", e),
                });
                None
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "No config file given, using defaults".to_string(),
            });
            Some(GovernorConfig::default())
        }
    };

    if let Some(config) = &config {
        let problems = config.problems();
        if problems.is_empty() {
            checks.push(DoctorCheck {
                name: "validation".to_string(),
                status: CheckStatus::Ok,
                message: "All sections valid".to_string(),
            });
        }
        for problem in problems {
            checks.push(DoctorCheck {
                name: "validation".to_string(),
                status: CheckStatus::Error,
                message: problem.to_string(),
            });
        }

        if config.seed.is_some() {
            checks.push(DoctorCheck {
                name: "seed".to_string(),
                status: CheckStatus::Warning,
                message: "Fixed seed configured; output is reproducible".to_string(),
            });
        }

        if let Ok(window) = ScheduleWindow::from_config(&config.schedule) {
            let now = Utc::now();
            checks.push(DoctorCheck {
                name: "schedule".to_string(),
                status: CheckStatus::Ok,
                message: match window.status(now) {
                    pacekeeper::ScheduleStatus::Operating => {
                        format!("Operating now ({})", window.timezone().name())
                    }
                    pacekeeper::ScheduleStatus::Idle { reason } => {
                        format!("Idle now: {} ({})", reason, window.timezone().name())
                    }
                },
            });
        }
    }

    let stderr_check = if atty::is(atty::Stream::Stderr) {
        DoctorCheck {
            name: "logging".to_string(),
            status: CheckStatus::Ok,
            message: "stderr is a TTY (text logs by default)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "logging".to_string(),
            status: CheckStatus::Ok,
            message: "stderr is redirected (JSON logs by default)".to_string(),
        }
    };
    checks.push(stderr_check);

    let report = DoctorReport {
        version: PACEKEEPER_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pacekeeper Doctor Report");
        println!("========================");
        println!("Version:  {}", report.version);
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
        Err(PacekeeperCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn parse_point(raw: &str) -> Result<Point, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got {raw:?}"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad X {x:?}: {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad Y {y:?}: {e}"))?;
    Ok(Point::new(x, y))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), PacekeeperCliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// Error types

#[derive(Debug)]
enum PacekeeperCliError {
    Io(io::Error),
    Govern(GovernError),
    Json(serde_json::Error),
    InvalidArgument(String),
    DoctorFailed,
}

impl From<io::Error> for PacekeeperCliError {
    fn from(e: io::Error) -> Self {
        PacekeeperCliError::Io(e)
    }
}

impl From<GovernError> for PacekeeperCliError {
    fn from(e: GovernError) -> Self {
        match e {
            GovernError::Io(e) => PacekeeperCliError::Io(e),
            GovernError::Json(e) => PacekeeperCliError::Json(e),
            other => PacekeeperCliError::Govern(other),
        }
    }
}

impl From<serde_json::Error> for PacekeeperCliError {
    fn from(e: serde_json::Error) -> Self {
        PacekeeperCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PacekeeperCliError> for CliError {
    fn from(e: PacekeeperCliError) -> Self {
        match e {
            PacekeeperCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PacekeeperCliError::Govern(e) if e.is_config_error() => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'pacekeeper doctor --config <file>' for details".to_string()),
            },
            PacekeeperCliError::Govern(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            PacekeeperCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PacekeeperCliError::InvalidArgument(msg) => CliError {
                code: "INVALID_ARGUMENT".to_string(),
                message: msg,
                hint: Some("Timestamps look like 2024-01-15T09:30:00Z".to_string()),
            },
            PacekeeperCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ScheduleReport {
    at: DateTime<Utc>,
    timezone: String,
    status: pacekeeper::ScheduleStatus,
    next_opening: Option<DateTime<Utc>>,
    poll_delay_secs: u64,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
