//! Setup/initialization module - handles application startup and shutdown tasks
//!
//! Includes:
//! - Logger initialization
//! - Temp folder initialization
//! - Stale artifact cleanup

use anstyle::{AnsiColor, Style};
use anyhow::{Context, Result};
use env_logger::{Builder, Env};
use log::kv::Key;
use log::{error, info};
use std::fs::{self, DirEntry};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::common::{ARTIFACT_EXTENSION, ARTIFACT_PREFIX, BOOT_ID};
use crate::config::AppConfig;

// ────────────────────────────────────────────────────────────────
// Logger Initialization
// ────────────────────────────────────────────────────────────────

/// Initialize the global logger. `RUST_LOG` overrides the defaults.
pub fn initialize_logger() {
    let dim = Style::new().fg_color(Some(AnsiColor::BrightBlack.into()));
    let cyan = Style::new().fg_color(Some(AnsiColor::Cyan.into()));

    Builder::new()
        .format(move |buf, record| {
            let level_style = buf.default_level_style(record.level());

            // Extract raw duration and format to 2 decimal places
            let dur_raw = record
                .key_values()
                .get(Key::from("duration"))
                .map(|v| {
                    let s = format!("{}", v);
                    if let Some(idx) = s.find(|c: char| c.is_alphabetic()) {
                        let (num, unit) = (&s[..idx], &s[idx..]);
                        if let Ok(val) = num.parse::<f32>() {
                            return format!("{:.2} {}", val, unit);
                        }
                    }
                    s
                })
                .unwrap_or_default();

            let dur = if dur_raw.is_empty() {
                " ".repeat(10)
            } else {
                format!("{}{:>10}{}", cyan.render(), dur_raw, cyan.render_reset())
            };

            writeln!(
                buf,
                "{}{}{} {}{}{} {}{}{}",
                dim.render(),
                buf.timestamp(),
                dim.render_reset(),
                level_style.render(),
                record.level(),
                level_style.render_reset(),
                dim.render(),
                record.target(),
                dim.render_reset(),
            )?;

            let message = format!("{}", record.args());
            let subsequent_indent = " ".repeat(11);
            let mut lines = message.lines();

            if let Some(first_line) = lines.next() {
                writeln!(buf, "{} {}", dur, first_line)?;
            }
            for line in lines {
                writeln!(buf, "{}{}", subsequent_indent, line)?;
            }

            Ok(())
        })
        // Only show INFO+ globally, WARN+ for Rocket
        .filter(None, log::LevelFilter::Info)
        .filter(Some("rocket"), log::LevelFilter::Warn)
        .parse_env(Env::default())
        .init();
}

// ────────────────────────────────────────────────────────────────
// Folder Initialization
// ────────────────────────────────────────────────────────────────

pub fn initialize_folder(config: &AppConfig) -> Result<()> {
    fs::create_dir_all(&config.tmp_dir).context(format!(
        "Failed to create temp folder {:?}",
        config.tmp_dir
    ))
}

// ────────────────────────────────────────────────────────────────
// Stale Artifact Cleanup
// ────────────────────────────────────────────────────────────────

fn is_artifact_name(name: &str) -> bool {
    name.starts_with(ARTIFACT_PREFIX)
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION))
}

/// Which artifacts a sweep may remove. The temp folder can be shared with
/// other instances, so a sweep never takes every artifact it sees.
#[derive(Debug, Clone, Copy)]
pub enum SweepScope<'a> {
    /// Artifacts named by the given boot ID, whatever their age.
    Boot(&'a str),
    /// Artifacts of any boot last modified longer ago than this.
    OlderThan(Duration),
}

impl SweepScope<'_> {
    fn covers(&self, name: &str, entry: &DirEntry) -> bool {
        match self {
            SweepScope::Boot(boot_id) => name
                .strip_prefix(ARTIFACT_PREFIX)
                .and_then(|rest| rest.strip_prefix(*boot_id))
                .is_some_and(|rest| rest.starts_with('.')),
            SweepScope::OlderThan(age) => entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .ok()
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .is_some_and(|elapsed| elapsed > *age),
        }
    }
}

/// Remove artifacts in `dir` covered by `scope`. Returns how many files
/// were removed.
pub fn sweep_stale_artifacts(dir: &Path, scope: SweepScope<'_>) -> Result<usize> {
    let entries = fs::read_dir(dir).context(format!("Failed to read temp folder {:?}", dir))?;

    let mut removed = 0;
    for entry in entries {
        let entry = entry.context(format!("Failed to list temp folder {:?}", dir))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().filter(|name| is_artifact_name(name)) else {
            continue;
        };
        if !entry.file_type().is_ok_and(|t| t.is_file()) || !scope.covers(name, &entry) {
            continue;
        }
        match fs::remove_file(entry.path()) {
            Ok(_) => removed += 1,
            Err(err) => error!("Fail to delete stale artifact {:?}: {}", entry.path(), err),
        }
    }
    Ok(removed)
}

fn sweep_and_report(config: &AppConfig, scope: SweepScope<'_>) {
    match sweep_stale_artifacts(&config.tmp_dir, scope) {
        Ok(0) => {}
        Ok(removed) => info!("Cleared {} stale artifact(s) from {:?}", removed, config.tmp_dir),
        Err(err) => error!("{:?}", err),
    }
}

/// Create the temp folder and clear out artifacts a crashed instance left
/// behind. Recent artifacts may belong to a live instance and are kept.
pub fn initialize(config: &AppConfig) -> Result<()> {
    initialize_folder(config)?;
    sweep_and_report(config, SweepScope::OlderThan(config.stale_artifact_age()));
    Ok(())
}

pub fn teardown(config: &AppConfig) {
    sweep_and_report(config, SweepScope::Boot(&BOOT_ID));
    info!("Server stopped");
}
