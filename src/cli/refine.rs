//! `folio refine`: run the convergence loop over one text file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::args::{OutputFormat, RefineArgs};
use super::{Runtime, print_json, stderr_progress};
use crate::core::convergence::{ConvergenceSummary, LoopConfig, QualityConvergenceLoop};
use crate::core::models::{Acceptance, ContentUnit};
use crate::error::{FolioError, Result};

#[derive(Debug, Serialize)]
struct RefineJson<'a> {
    unit: &'a str,
    acceptance: &'static str,
    reason: Option<&'a str>,
    checks: u32,
    rewrites: u32,
    expansions: u32,
    words: usize,
    originality_score: Option<u8>,
    risk: Option<&'static str>,
    output: Option<String>,
}

/// Unit id and default title from a file path.
#[must_use]
pub fn unit_identity(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map_or_else(|| "unit".to_string(), |s| s.to_string_lossy().into_owned());
    let title = stem.replace(['_', '-'], " ");
    (stem, title)
}

/// Apply command-line overrides to the configured loop settings.
#[must_use]
pub fn loop_config(args: &RefineArgs, base: LoopConfig) -> LoopConfig {
    LoopConfig {
        min_words: args.min_words.unwrap_or(base.min_words),
        max_attempts: args.max_attempts.unwrap_or(base.max_attempts),
        ..base
    }
}

const fn acceptance_label(acceptance: &Acceptance) -> &'static str {
    match acceptance {
        Acceptance::Earned => "earned",
        Acceptance::Relaxed => "relaxed",
        Acceptance::Forced { .. } => "forced",
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Write the refined body where the arguments ask for it. Returns the path
/// written, or `None` for stdout.
fn write_result(args: &RefineArgs, body: &str) -> Result<Option<PathBuf>> {
    if args.in_place {
        fs::copy(&args.file, backup_path(&args.file))?;
        fs::write(&args.file, body)?;
        return Ok(Some(args.file.clone()));
    }
    if let Some(output) = &args.output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, body)?;
        return Ok(Some(output.clone()));
    }
    Ok(None)
}

/// Execute the refine command.
///
/// The loop always ends with an accepted unit, so this only fails on I/O or
/// setup errors.
///
/// # Errors
///
/// Returns an error if the input cannot be read or the output written.
pub async fn execute(
    args: &RefineArgs,
    runtime: &Runtime,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let body = fs::read_to_string(&args.file)?;
    if body.trim().is_empty() {
        return Err(FolioError::InvalidRequest(format!(
            "{} is empty",
            args.file.display()
        )));
    }

    let (id, default_title) = unit_identity(&args.file);
    let title = args.title.clone().unwrap_or(default_title);
    let mut unit = ContentUnit::new(id, title, body);

    let progress = stderr_progress(format);
    let dispatcher = Arc::new(runtime.dispatcher(progress.clone())?);
    let mut refiner =
        QualityConvergenceLoop::new(dispatcher, loop_config(args, runtime.config.loop_config()));
    if let Some(progress) = progress {
        refiner = refiner.with_progress(progress);
    }

    let summary = refiner.run(&mut unit).await;
    let written = write_result(args, &unit.body)?;
    info!(
        unit = %summary.unit_id,
        acceptance = acceptance_label(&summary.acceptance),
        output = ?written,
        "Refine finished"
    );

    match format {
        OutputFormat::Human => {
            if written.is_none() {
                println!("{}", unit.body);
            }
            eprintln!("{}", describe(&summary));
        }
        OutputFormat::Json => print_json(&summary_json(&summary, written), pretty)?,
    }
    Ok(())
}

fn summary_json(summary: &ConvergenceSummary, written: Option<PathBuf>) -> RefineJson<'_> {
    let reason = match &summary.acceptance {
        Acceptance::Forced { reason } => Some(reason.as_str()),
        _ => None,
    };
    RefineJson {
        unit: &summary.unit_id,
        acceptance: acceptance_label(&summary.acceptance),
        reason,
        checks: summary.checks,
        rewrites: summary.rewrites,
        expansions: summary.expansions,
        words: summary.final_words,
        originality_score: summary.final_report.as_ref().map(|r| r.originality_score),
        risk: summary.final_report.as_ref().map(|r| r.risk.as_str()),
        output: written.map(|p| p.display().to_string()),
    }
}

fn describe(summary: &ConvergenceSummary) -> String {
    let quality = summary.final_report.as_ref().map_or_else(
        || "unchecked".to_string(),
        |r| format!("score {}/10, {} risk", r.originality_score, r.risk),
    );
    let mut line = format!(
        "{}: {} after {} check(s), {} rewrite(s), {} expansion(s); {} words, {quality}",
        summary.unit_id,
        acceptance_label(&summary.acceptance),
        summary.checks,
        summary.rewrites,
        summary.expansions,
        summary.final_words,
    );
    if let Acceptance::Forced { reason } = &summary.acceptance {
        line.push_str(&format!(" (degraded quality: {reason})"));
    }
    line
}
