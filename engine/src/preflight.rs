//! Environment checks run before any generation: credential present, media
//! tools installed.

use std::{fmt, io::ErrorKind};

use log::{debug, warn};
use tokio::process::Command;

use crate::config::API_KEY_VAR;

pub const TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

const MISSING_KEY_HINT: &str = indoc::indoc! {"
    Get an API key from the Model Studio console and export it before running:
        export DASHSCOPE_API_KEY=sk-...
"};

/// Hides all but the first 8 and last 4 characters of a key. Keys of 12
/// characters or fewer are hidden entirely.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 12))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok(String),
    Missing(String),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Report {
    pub checks: Vec<Check>,
}

impl Report {
    pub fn ready(&self) -> bool {
        self.checks.iter().all(|check| check.outcome.is_ok())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let (mark, detail) = match &check.outcome {
                Outcome::Ok(detail) => ("ok", detail),
                Outcome::Missing(detail) => ("MISSING", detail),
            };
            writeln!(f, "[{mark:>7}] {}: {detail}", check.name)?;
        }
        Ok(())
    }
}

pub fn check_api_key(value: Option<&str>) -> Check {
    let outcome = match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(key) => Outcome::Ok(mask_key(key)),
        None => Outcome::Missing(format!("{API_KEY_VAR} is not set\n{MISSING_KEY_HINT}")),
    };
    Check {
        name: API_KEY_VAR.to_string(),
        outcome,
    }
}

/// Runs `<tool> -version` and reports the first line of its output.
pub async fn check_tool(tool: &str) -> Check {
    let outcome = match Command::new(tool).arg("-version").output().await {
        Ok(out) if out.status.success() => {
            let stdout = String::from_utf8_lossy(&out.stdout);
            Outcome::Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
        }
        Ok(out) => Outcome::Missing(format!("`{tool} -version` exited with {}", out.status)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Outcome::Missing(format!("{tool} not found in PATH"))
        }
        Err(e) => Outcome::Missing(format!("couldn't run {tool}: {e}")),
    };
    debug!("{tool}: {outcome:?}");
    Check {
        name: tool.to_string(),
        outcome,
    }
}

pub async fn run() -> Report {
    let key = std::env::var(API_KEY_VAR).ok();
    let mut checks = vec![check_api_key(key.as_deref())];
    for tool in TOOLS {
        checks.push(check_tool(tool).await);
    }
    let report = Report { checks };
    if !report.ready() {
        warn!("Preflight failed:\n{report}");
    }
    report
}
