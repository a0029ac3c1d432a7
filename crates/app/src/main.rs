use std::fmt;
use std::time::Duration;

use services::{Clock, SessionError, TutorService};
use tutor_core::model::{CourseId, SessionKey, UnderstandingLevel, UserId};
use tutor_core::progress::ProgressReport;

mod logging;
mod terminal;

use terminal::TerminalLearner;

const PERSISTENCE_RETRIES: usize = 3;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidLevel { raw: String },
    InvalidMinutes { raw: String },
    InvalidDbUrl { raw: String },
    MissingTopic,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidLevel { raw } => write!(f, "invalid --level value: {raw}"),
            ArgsError::InvalidMinutes { raw } => write!(f, "invalid --minutes value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingTopic => write!(f, "start requires --topic"),
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

fn parse_id(raw: String, flag: &'static str) -> Result<u64, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidId { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  tutor start    --topic <text> [--level <level>] [--minutes <n>] [common]");
    eprintln!("  tutor resume   [common]");
    eprintln!("  tutor progress [common]");
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --db <sqlite_url>   default sqlite:tutor.sqlite3");
    eprintln!("  --user <id>         default 1");
    eprintln!("  --course <id>       default 1");
    eprintln!();
    eprintln!("Levels: beginner, intermediate, advanced (default beginner)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TUTOR_DB_URL, TUTOR_USER_ID, TUTOR_COURSE_ID");
    eprintln!("  TUTOR_AI_API_KEY, TUTOR_AI_BASE_URL, TUTOR_AI_MODEL");
    eprintln!("  TUTOR_GENERATION_TIMEOUT_SECS, TUTOR_RNG_SEED, TUTOR_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Resume,
    Progress,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "start" => Some(Self::Start),
            "resume" => Some(Self::Resume),
            "progress" => Some(Self::Progress),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Args {
    db_url: String,
    key: SessionKey,
    topic: Option<String>,
    level: UnderstandingLevel,
    minutes: u32,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("TUTOR_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://tutor.sqlite3".into(), normalize_sqlite_url);
        let mut user = match std::env::var("TUTOR_USER_ID") {
            Ok(raw) => parse_id(raw, "TUTOR_USER_ID")?,
            Err(_) => 1,
        };
        let mut course = match std::env::var("TUTOR_COURSE_ID") {
            Ok(raw) => parse_id(raw, "TUTOR_COURSE_ID")?,
            Err(_) => 1,
        };
        let mut topic = None;
        let mut level = UnderstandingLevel::Beginner;
        let mut minutes = 30;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => user = parse_id(require_value(args, "--user")?, "--user")?,
                "--course" => course = parse_id(require_value(args, "--course")?, "--course")?,
                "--topic" => topic = Some(require_value(args, "--topic")?),
                "--level" => {
                    let value = require_value(args, "--level")?;
                    level = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidLevel { raw: value.clone() })?;
                }
                "--minutes" => {
                    let value = require_value(args, "--minutes")?;
                    minutes = value
                        .trim()
                        .parse()
                        .map_err(|_| ArgsError::InvalidMinutes { raw: value.clone() })?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            key: SessionKey::new(UserId::new(user), CourseId::new(course)),
            topic,
            level,
            minutes,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Drive the session to completion, re-sending a pending commit after
/// transient storage failures.
async fn tutor(service: &TutorService, key: SessionKey) -> Result<(), Box<dyn std::error::Error>> {
    let mut machine = service.open(key, TerminalLearner::new()).await?;
    let mut failures = 0;
    loop {
        match machine.run().await {
            Ok(_) => {
                println!("\nCourse complete.");
                return Ok(());
            }
            Err(SessionError::Persistence(err)) if failures < PERSISTENCE_RETRIES => {
                failures += 1;
                tracing::warn!(error = %err, attempt = failures, "retrying after storage failure");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(SessionError::Learner(err)) => {
                tracing::info!(error = %err, "learner left");
                println!("\nProgress saved. Continue later with `tutor resume`.");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn print_report(report: &ProgressReport) {
    println!("Session {} on {:?}", report.key, report.topic);
    println!("  phase: {} (revision {})", report.phase, report.revision);
    println!("  overall: {:.0}%", report.overall_percent());
    println!(
        "  background: {}/{} topics",
        report.background.mastered, report.background.total
    );
    for concept in &report.concepts {
        let note = if concept.skipped { " (skipped)" } else { "" };
        println!(
            "  {}: {:.0}% ({}/{} topics, {}/{} items){note}",
            concept.concept,
            concept.percent(),
            concept.mastered_topics,
            concept.total_topics,
            concept.retired_items,
            concept.total_items
        );
    }
    println!(
        "  connections: {}/{} topics",
        report.connections.mastered, report.connections.total
    );
    if !report.struggling.is_empty() {
        println!("  struggling:");
        for item in &report.struggling {
            let average = item
                .average_comprehension
                .map_or_else(|| "-".to_string(), |avg| format!("{avg:.1}"));
            println!(
                "    {} / {}: success {}, average {average}",
                item.concept, item.item, item.success_count
            );
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup.
    prepare_sqlite_file(&parsed.db_url)?;
    let service = TutorService::from_env_sqlite(&parsed.db_url, Clock::default()).await?;

    match cmd {
        Command::Start => {
            let topic = parsed.topic.as_deref().ok_or(ArgsError::MissingTopic)?;
            service
                .start_session(parsed.key, topic, parsed.level, parsed.minutes)
                .await?;
            tutor(&service, parsed.key).await
        }
        Command::Resume => tutor(&service, parsed.key).await,
        Command::Progress => {
            let report = service.progress().report(parsed.key).await?;
            print_report(&report);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> impl Iterator<Item = String> {
        items
            .iter()
            .map(|s| (*s).to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parses_start_flags() {
        let parsed = Args::parse(&mut args(&[
            "--db",
            "sqlite::memory:",
            "--user",
            "7",
            "--course",
            "3",
            "--topic",
            "Chemistry",
            "--level",
            "Advanced",
            "--minutes",
            "45",
        ]))
        .unwrap();
        assert_eq!(parsed.db_url, "sqlite::memory:");
        assert_eq!(parsed.key, SessionKey::new(UserId::new(7), CourseId::new(3)));
        assert_eq!(parsed.topic.as_deref(), Some("Chemistry"));
        assert_eq!(parsed.level, UnderstandingLevel::Advanced);
        assert_eq!(parsed.minutes, 45);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Args::parse(&mut args(&["--user", "abc"])),
            Err(ArgsError::InvalidId { flag: "--user", .. })
        ));
        assert!(matches!(
            Args::parse(&mut args(&["--level", "expert"])),
            Err(ArgsError::InvalidLevel { .. })
        ));
        assert!(matches!(
            Args::parse(&mut args(&["--minutes"])),
            Err(ArgsError::MissingValue { flag: "--minutes" })
        ));
        assert!(matches!(
            Args::parse(&mut args(&["--verbose"])),
            Err(ArgsError::UnknownArg(_))
        ));
    }

    #[test]
    fn relative_sqlite_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/tutor.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/tutor.sqlite3"));
    }
}
