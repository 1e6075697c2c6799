use std::fmt;
use std::path::Path;

use exam_core::model::AttemptId;
use services::config::DRAFTS_DB_VAR;
use services::{AppServices, Clock, ExamClientConfig};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod console;

use console::Console;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingExam,
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingExam => write!(f, "--exam is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --drafts value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- --exam <attempt_id> [--drafts <sqlite_url>]");
    eprintln!();
    eprintln!("Environment (a .env file is read when present):");
    eprintln!("  EXAM_API_URL       (required) base URL of the exam service");
    eprintln!("  EXAM_API_TOKEN     bearer token");
    eprintln!("  {DRAFTS_DB_VAR}     sqlite URL for local answer drafts");
    eprintln!("  EXAM_TICK_MILLIS, EXAM_REQUEST_TIMEOUT_SECS, EXAM_AUTO_SUBMIT_ATTEMPTS");
    eprintln!("  RUST_LOG           log filter, default `info`");
}

struct Args {
    attempt_id: AttemptId,
    drafts_db: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut attempt_id = None;
        let mut drafts_db = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--exam" => {
                    let value = require_value(args, "--exam")?;
                    if !value.trim().is_empty() {
                        attempt_id = Some(AttemptId::new(value.trim()));
                    }
                }
                "--drafts" => drafts_db = Some(require_value(args, "--drafts")?),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            attempt_id: attempt_id.ok_or(ArgsError::MissingExam)?,
            drafts_db,
        })
    }
}

/// Resolve a `--drafts`/`EXAM_DRAFTS_DB` value to an absolute `sqlite://` URL.
///
/// Bare paths and `sqlite:` paths are taken relative to `cwd`; in-memory and
/// absolute `sqlite://` URLs pass through unchanged.
fn drafts_url(raw: &str, cwd: &Path) -> Result<String, ArgsError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ArgsError::InvalidDbUrl { raw: raw.to_owned() });
    }
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return Ok(raw.to_owned());
    }
    let path = Path::new(raw.strip_prefix("sqlite:").unwrap_or(raw));
    Ok(format!("sqlite://{}", cwd.join(path).display()))
}

/// `SQLite` will not create a missing database file on its own.
fn ensure_database_file(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(rest) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    if query.contains("mode=memory") {
        return Ok(());
    }
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: url.to_owned(),
        }
        .into());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let mut config = ExamClientConfig::from_env()?;
    if let Some(raw) = parsed.drafts_db.or_else(|| config.drafts_db.take()) {
        let url = drafts_url(&raw, &std::env::current_dir()?)?;
        ensure_database_file(&url)?;
        config.drafts_db = Some(url);
    }
    info!(?config, "configuration loaded");

    let services = AppServices::from_config(&config, Clock::default_clock()).await?;
    let sessions = services.exam_sessions();

    let status = sessions.load(&parsed.attempt_id).await?;
    println!("attempt {} is {status}", parsed.attempt_id);

    Console::new(sessions).run().await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(&mut args.iter().map(|arg| (*arg).to_owned()))
    }

    #[test]
    fn exam_id_is_required() {
        assert!(matches!(parse(&[]), Err(ArgsError::MissingExam)));
        assert!(matches!(
            parse(&["--drafts"]),
            Err(ArgsError::MissingValue { flag: "--drafts" })
        ));
        let args = parse(&["--exam", " a1 ", "--drafts", "drafts.db"]).unwrap();
        assert_eq!(args.attempt_id.as_str(), "a1");
        assert_eq!(args.drafts_db.as_deref(), Some("drafts.db"));
    }

    #[test]
    fn drafts_paths_resolve_against_the_working_directory() {
        let cwd = Path::new("/srv/exam");
        assert_eq!(drafts_url("drafts.db", cwd).unwrap(), "sqlite:///srv/exam/drafts.db");
        assert_eq!(
            drafts_url("sqlite:data/drafts.db", cwd).unwrap(),
            "sqlite:///srv/exam/data/drafts.db"
        );
        assert_eq!(drafts_url("/tmp/d.db", cwd).unwrap(), "sqlite:///tmp/d.db");
        assert_eq!(
            drafts_url("sqlite:///var/d.db?mode=rwc", cwd).unwrap(),
            "sqlite:///var/d.db?mode=rwc"
        );
        assert_eq!(drafts_url("sqlite::memory:", cwd).unwrap(), "sqlite::memory:");
        assert!(matches!(
            drafts_url("  ", cwd),
            Err(ArgsError::InvalidDbUrl { .. })
        ));
    }

    #[test]
    fn in_memory_databases_need_no_file() {
        assert!(ensure_database_file("sqlite::memory:").is_ok());
        assert!(ensure_database_file("sqlite://file:memdb?mode=memory&cache=shared").is_ok());
    }
}
