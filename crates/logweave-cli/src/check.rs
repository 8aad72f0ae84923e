//! Self-check: is this configuration able to log?

use logweave_core::config::OutputTarget;
use logweave_core::Config;
use std::fs;
use std::path::{Path, PathBuf};

const PROBE_FILE: &str = ".logweave-write-probe";

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: detail.into(),
        }
    }

    /// One line of human output
    pub fn render(&self) -> String {
        let mark = if self.passed { "✓" } else { "✗" };
        format!("{} {}: {}", mark, self.name, self.detail)
    }
}

/// Run every configuration check. The output directory may be created.
pub fn run_checks(config: &Config) -> Vec<CheckResult> {
    let mut results = vec![
        check_valid(config),
        check_channel(config),
        check_enabled(config),
        check_output(config),
    ];

    if config.async_shipping.enabled {
        results.push(CheckResult::pass(
            "shipping",
            format!("{} external handler(s)", config.external_handlers.len()),
        ));
    }

    results
}

fn check_valid(config: &Config) -> CheckResult {
    match config.validate() {
        Ok(()) => CheckResult::pass("configuration", "valid"),
        Err(e) => CheckResult::fail("configuration", e.to_string()),
    }
}

fn check_channel(config: &Config) -> CheckResult {
    if config.channel.trim().is_empty() {
        CheckResult::fail("channel", "channel name is empty")
    } else {
        CheckResult::pass("channel", config.channel.clone())
    }
}

fn check_enabled(config: &Config) -> CheckResult {
    if config.enabled {
        CheckResult::pass("enabled", "logging is on")
    } else {
        CheckResult::fail("enabled", "logging is disabled")
    }
}

fn check_output(config: &Config) -> CheckResult {
    match config.output.target {
        OutputTarget::File => {
            let dir = log_directory(Path::new(&config.output.path));
            match probe_directory(&dir) {
                Ok(()) => CheckResult::pass("output", format!("{} is writable", dir.display())),
                Err(e) => {
                    CheckResult::fail("output", format!("{} is not writable: {}", dir.display(), e))
                }
            }
        }
        target => CheckResult::pass("output", format!("{:?}", target).to_lowercase()),
    }
}

fn log_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn probe_directory(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(PROBE_FILE);
    fs::write(&probe, b"")?;
    fs::remove_file(probe)
}
