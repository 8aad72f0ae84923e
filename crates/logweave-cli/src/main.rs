mod check;
mod input;

use anyhow::{bail, Result};
use clap::Parser;
use input::InputRecord;
use logweave_core::config::LogFormat;
use logweave_core::{fields_from_json, Config, UnitKind};
use logweave_pipeline::LogPipeline;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// LogWeave - correlated, sanitized structured logging
#[derive(Parser, Debug)]
#[command(name = "logweave")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format: text or json (overrides config)
    #[arg(short, long)]
    format: Option<String>,

    /// Minimum level to emit (overrides config)
    #[arg(short, long)]
    level: Option<String>,

    /// Enable verbose diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Check that the configuration can log, then exit
    #[arg(long)]
    check: bool,

    /// With --check, also write a test entry
    #[arg(long, requires = "check")]
    test: bool,

    /// Treat stdin as a background job rather than a console command
    #[arg(long)]
    job: bool,

    /// Name of the unit of work, e.g. the command or job being run
    #[arg(long, default_value = "stdin")]
    name: String,

    /// Category for plain-text input lines
    #[arg(long, default_value = "STDIN")]
    category: String,
}

fn parse_format(format: &str) -> Result<LogFormat> {
    match format.to_lowercase().as_str() {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => bail!("Unknown format '{}', expected text or json", other),
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(ref config_path) = args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    config.apply_overrides(|key| std::env::var(key).ok());

    // CLI flags win over file and environment
    if let Some(ref format) = args.format {
        config.format = parse_format(format)?;
    }
    if let Some(ref level) = args.level {
        config.level = level.clone();
    }

    Ok(config)
}

async fn run_check(config: Config, write_test_entry: bool) -> Result<()> {
    let results = check::run_checks(&config);
    for result in &results {
        println!("{}", result.render());
    }

    let mut passed = results.iter().all(|r| r.passed);

    if passed && write_test_entry {
        let pipeline = Arc::new(LogPipeline::from_config(config)?);
        let mut logger = pipeline.begin_unit();
        logger.initialize_non_http(UnitKind::Console, "logweave --check");
        let written = logger
            .info(
                "CHECK",
                "LogWeave test entry",
                fields_from_json(json!({"source": "logweave --check"})),
            )
            .is_some();
        pipeline.shutdown().await;

        if written {
            println!("✓ test entry: written with trace {}", logger.trace_id());
        } else {
            println!("✗ test entry: not written, check the level setting");
            passed = false;
        }
    }

    if !passed {
        bail!("Some checks failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        let config = Config::default();
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    // Pipeline diagnostics are fail-open warnings, so keep them visible
    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    if args.check {
        return run_check(config, args.test).await;
    }

    info!(channel = %config.channel, "Starting LogWeave");
    let pipeline = Arc::new(LogPipeline::from_config(config)?);
    info!(
        processors = ?pipeline.processor_names(),
        "Pipeline initialized with {} processor(s)",
        pipeline.processor_count()
    );

    let kind = if args.job {
        UnitKind::Job
    } else {
        UnitKind::Console
    };
    let mut logger = pipeline.begin_unit();
    logger.initialize_non_http(kind, &args.name);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut emitted: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let record = InputRecord::parse(&line, &args.category);
        let logged = logger.log(
            record.level,
            &record.category,
            record.message,
            record.context,
            record.metrics,
        );
        if logged.is_some() {
            emitted += 1;
        }
    }

    pipeline.shutdown().await;
    info!(emitted, trace_id = %logger.trace_id(), "Processing complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("TEXT").unwrap(), LogFormat::Text);
        assert_eq!(parse_format("json").unwrap(), LogFormat::Json);
        assert!(parse_format("pretty").is_err());
    }

    #[test]
    fn test_cli_flags_override_config() {
        let args = Args::parse_from(["logweave", "--format", "text", "--level", "error"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "error");
    }

    #[test]
    fn test_test_flag_requires_check() {
        assert!(Args::try_parse_from(["logweave", "--test"]).is_err());
        assert!(Args::try_parse_from(["logweave", "--check", "--test"]).is_ok());
    }
}
