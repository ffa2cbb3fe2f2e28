//! Content-quality convergence loop.
//!
//! Drives one [`ContentUnit`] to acceptance through an explicit state machine:
//!
//! ```text
//! Draft -> Checking -> Accepted
//!                   -> NeedsRewrite -> Rewriting -> (Expanding)* -> Checking
//!                                   -> Accepted (forced, budget spent)
//! ```
//!
//! Every transition that changes the body spends either a rewrite attempt or
//! an expansion attempt, and both budgets are finite, so the loop terminates
//! within `max_attempts + max_expansion_attempts` mutating iterations. The
//! loop never fails: when quality cannot be verified or improved the unit is
//! force-accepted and a degraded-quality warning is logged.

use std::sync::Arc;

use tracing::{info, warn};

use super::dispatcher::Dispatcher;
use super::models::{
    Acceptance, ContentUnit, MAX_TEMPERATURE, QualityReport, Request, RiskLevel, TaskType,
    UnitStatus,
};
use super::progress::{ProgressCallback, ProgressEvent};
use super::quality::{parse_report, report_schema};
use crate::error::Result;
use crate::util::word_count;

/// Tunables for the convergence loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Minimum words for an earned acceptance.
    pub min_words: usize,
    /// Rewrite budget per unit.
    pub max_attempts: u32,
    /// Score accepted after `relaxed_after` rewrites even with issues.
    pub relaxed_threshold: u8,
    pub relaxed_after: u32,
    /// Expansion budget per unit, independent of rewrites.
    pub max_expansion_attempts: u32,
    pub base_temperature: f32,
    /// Added per rewrite attempt.
    pub temperature_step: f32,
    pub check_temperature: f32,
    pub check_max_tokens: u32,
    pub rewrite_max_tokens: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            min_words: 2200,
            max_attempts: 5,
            relaxed_threshold: 7,
            relaxed_after: 2,
            max_expansion_attempts: 3,
            base_temperature: 0.7,
            temperature_step: 0.1,
            check_temperature: 0.1,
            check_max_tokens: 1024,
            rewrite_max_tokens: 8192,
        }
    }
}

impl LoopConfig {
    /// Temperature for rewrite number `attempt` (1-based).
    #[must_use]
    pub fn rewrite_temperature(&self, attempt: u32) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let escalation = self.temperature_step * attempt as f32;
        (self.base_temperature + escalation).clamp(0.0, MAX_TEMPERATURE)
    }
}

/// States of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Draft,
    Checking,
    NeedsRewrite,
    Rewriting,
    Expanding,
    Accepted,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Checking => "checking",
            Self::NeedsRewrite => "needs_rewrite",
            Self::Rewriting => "rewriting",
            Self::Expanding => "expanding",
            Self::Accepted => "accepted",
        }
    }
}

/// What happened to one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceSummary {
    pub unit_id: String,
    pub acceptance: Acceptance,
    pub checks: u32,
    pub rewrites: u32,
    pub expansions: u32,
    pub final_words: usize,
    pub final_report: Option<QualityReport>,
}

/// Best body seen so far, ranked by its report.
struct BestSeen {
    report: QualityReport,
    body: String,
}

/// Runs the convergence state machine over content units.
#[derive(Clone)]
pub struct QualityConvergenceLoop {
    dispatcher: Arc<Dispatcher>,
    config: LoopConfig,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for QualityConvergenceLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityConvergenceLoop")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QualityConvergenceLoop {
    #[must_use]
    pub const fn new(dispatcher: Arc<Dispatcher>, config: LoopConfig) -> Self {
        Self {
            dispatcher,
            config,
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Refine several units in order. A unit that ends force-accepted does
    /// not stop the rest.
    pub async fn run_all(&self, units: &mut [ContentUnit]) -> Vec<ConvergenceSummary> {
        let mut summaries = Vec::with_capacity(units.len());
        for unit in units.iter_mut() {
            summaries.push(self.run(unit).await);
        }
        summaries
    }

    /// Drive `unit` to `Accepted`.
    pub async fn run(&self, unit: &mut ContentUnit) -> ConvergenceSummary {
        let mut phase = Phase::Draft;
        let mut best: Option<BestSeen> = None;
        let mut checks = 0;

        info!(
            unit = %unit.id,
            words = word_count(&unit.body),
            min_words = self.config.min_words,
            "Starting convergence loop"
        );

        while phase != Phase::Accepted {
            self.emit(unit, phase);
            phase = match phase {
                Phase::Draft => {
                    unit.status = UnitStatus::Draft;
                    Phase::Checking
                }
                Phase::Checking => {
                    checks += 1;
                    self.check_phase(unit, &mut best).await
                }
                Phase::NeedsRewrite => {
                    if unit.rewrite_attempts < self.config.max_attempts {
                        Phase::Rewriting
                    } else {
                        let reason = format!(
                            "rewrite budget of {} attempts exhausted",
                            self.config.max_attempts
                        );
                        self.force_accept(unit, best.take(), reason);
                        Phase::Accepted
                    }
                }
                Phase::Rewriting => self.rewrite_phase(unit).await,
                Phase::Expanding => self.expand_phase(unit).await,
                Phase::Accepted => Phase::Accepted,
            };
        }
        self.emit(unit, Phase::Accepted);

        ConvergenceSummary {
            unit_id: unit.id.clone(),
            acceptance: unit
                .acceptance
                .clone()
                .unwrap_or(Acceptance::Forced {
                    reason: "no acceptance recorded".to_string(),
                }),
            checks,
            rewrites: unit.rewrite_attempts,
            expansions: unit.expansion_attempts,
            final_words: word_count(&unit.body),
            final_report: unit.last_report.clone(),
        }
    }

    fn emit(&self, unit: &ContentUnit, phase: Phase) {
        if let Some(progress) = &self.progress {
            progress(&ProgressEvent::Unit {
                unit: unit.id.clone(),
                phase: phase.as_str(),
                detail: format!(
                    "{} words, {} rewrites, {} expansions",
                    word_count(&unit.body),
                    unit.rewrite_attempts,
                    unit.expansion_attempts
                ),
            });
        }
    }

    fn is_earned(&self, report: &QualityReport) -> bool {
        report.risk != RiskLevel::High
            && !report.issues_found
            && report.word_count >= self.config.min_words
    }

    fn is_relaxed(&self, unit: &ContentUnit, report: &QualityReport) -> bool {
        unit.rewrite_attempts >= self.config.relaxed_after
            && report.originality_score >= self.config.relaxed_threshold
    }

    fn under_minimum(&self, unit: &ContentUnit) -> bool {
        word_count(&unit.body) < self.config.min_words
    }

    async fn check_phase(&self, unit: &mut ContentUnit, best: &mut Option<BestSeen>) -> Phase {
        let report = match self.check(unit).await {
            Ok(report) => report,
            Err(e) => {
                warn!(unit = %unit.id, error = %e, "Quality check failed");
                let reason = format!("quality check unavailable: {e}");
                self.force_accept(unit, best.take(), reason);
                return Phase::Accepted;
            }
        };

        info!(
            unit = %unit.id,
            score = report.originality_score,
            risk = %report.risk,
            words = report.word_count,
            issues_found = report.issues_found,
            "Quality check complete"
        );

        unit.status = UnitStatus::Checked;
        if best.as_ref().is_none_or(|b| report.rank() < b.report.rank()) {
            *best = Some(BestSeen {
                report: report.clone(),
                body: unit.body.clone(),
            });
        }
        unit.last_report = Some(report.clone());

        if self.is_earned(&report) {
            self.accept(unit, Acceptance::Earned);
            Phase::Accepted
        } else if self.is_relaxed(unit, &report) {
            self.accept(unit, Acceptance::Relaxed);
            Phase::Accepted
        } else {
            Phase::NeedsRewrite
        }
    }

    async fn rewrite_phase(&self, unit: &mut ContentUnit) -> Phase {
        unit.status = UnitStatus::Rewriting;
        unit.rewrite_attempts += 1;
        let attempt = unit.rewrite_attempts;

        let request = Request::new(TaskType::ChapterRewrite, self.rewrite_prompt(unit))
            .with_system(REWRITE_SYSTEM)
            .with_temperature(self.config.rewrite_temperature(attempt))
            .with_max_tokens(self.config.rewrite_max_tokens);

        match self.dispatcher.dispatch(&request).await {
            Ok(text) => {
                info!(
                    unit = %unit.id,
                    attempt,
                    words = word_count(&text),
                    "Rewrite complete"
                );
                unit.replace_body(text);
            }
            Err(e) => {
                // Body unchanged, so the last report still describes it.
                warn!(unit = %unit.id, attempt, error = %e, "Rewrite failed");
                return Phase::NeedsRewrite;
            }
        }

        if self.under_minimum(unit) && self.expansion_budget_left(unit) {
            Phase::Expanding
        } else {
            Phase::Checking
        }
    }

    fn expansion_budget_left(&self, unit: &ContentUnit) -> bool {
        unit.expansion_attempts < self.config.max_expansion_attempts
    }

    async fn expand_phase(&self, unit: &mut ContentUnit) -> Phase {
        unit.expansion_attempts += 1;
        let missing = self
            .config
            .min_words
            .saturating_sub(word_count(&unit.body));

        let request = Request::new(
            TaskType::ChapterExtension,
            expansion_prompt(&unit.title, &unit.body, missing),
        )
        .with_system(REWRITE_SYSTEM)
        .with_temperature(self.config.base_temperature)
        .with_max_tokens(self.config.rewrite_max_tokens);

        match self.dispatcher.dispatch(&request).await {
            Ok(text) => {
                let expanded = format!("{}\n\n{}", unit.body.trim_end(), text);
                info!(
                    unit = %unit.id,
                    expansion = unit.expansion_attempts,
                    added_words = word_count(&text),
                    "Expansion complete"
                );
                unit.replace_body(expanded);
            }
            Err(e) => {
                warn!(unit = %unit.id, error = %e, "Expansion failed");
                return Phase::Checking;
            }
        }

        if self.under_minimum(unit) && self.expansion_budget_left(unit) {
            Phase::Expanding
        } else {
            Phase::Checking
        }
    }

    async fn check(&self, unit: &ContentUnit) -> Result<QualityReport> {
        let request = Request::new(TaskType::PlagiarismCheck, check_prompt(&unit.title, &unit.body))
            .with_system(CHECK_SYSTEM)
            .with_temperature(self.config.check_temperature)
            .with_max_tokens(self.config.check_max_tokens)
            .with_json_schema(report_schema());

        let response = self.dispatcher.dispatch(&request).await?;
        parse_report(&response, &unit.body)
    }

    fn accept(&self, unit: &mut ContentUnit, acceptance: Acceptance) {
        info!(
            unit = %unit.id,
            acceptance = ?acceptance,
            rewrites = unit.rewrite_attempts,
            expansions = unit.expansion_attempts,
            "Content unit accepted"
        );
        unit.status = UnitStatus::Accepted;
        unit.acceptance = Some(acceptance);
    }

    fn force_accept(&self, unit: &mut ContentUnit, best: Option<BestSeen>, reason: String) {
        if let Some(best) = best {
            if best.body != unit.body {
                unit.replace_body(best.body);
            }
            unit.last_report = Some(best.report);
        }

        let (score, risk) = unit
            .last_report
            .as_ref()
            .map_or((None, None), |r| (Some(r.originality_score), Some(r.risk)));
        warn!(
            unit = %unit.id,
            reason = %reason,
            score = ?score,
            risk = ?risk,
            words = word_count(&unit.body),
            "Force-accepting content unit with degraded quality"
        );

        unit.status = UnitStatus::Accepted;
        unit.acceptance = Some(Acceptance::Forced { reason });
    }

    fn rewrite_prompt(&self, unit: &ContentUnit) -> String {
        let mut prompt = format!(
            "Rewrite the chapter \"{}\" so that it is entirely original in wording and structure \
             while keeping its plot, characters and facts.\n",
            unit.title
        );

        if let Some(report) = &unit.last_report {
            prompt.push_str(&format!(
                "\nThe previous version scored {}/10 for originality with {} risk.\n",
                report.originality_score, report.risk
            ));
            if !report.issues.is_empty() {
                prompt.push_str("Problems found:\n");
                for issue in &report.issues {
                    prompt.push_str(&format!("- {issue}\n"));
                }
            }
            if !report.suggestions.is_empty() {
                prompt.push_str("Suggestions:\n");
                for suggestion in &report.suggestions {
                    prompt.push_str(&format!("- {suggestion}\n"));
                }
            }
        }

        let words = word_count(&unit.body);
        if words < self.config.min_words {
            prompt.push_str(&format!(
                "\nThe current text has only {words} words. The rewrite must be at least {} words \
                 long; add scenes, dialogue and detail rather than padding.\n",
                self.config.min_words
            ));
        }

        prompt.push_str("\nReturn only the rewritten chapter text.\n\n---\n\n");
        prompt.push_str(&unit.body);
        prompt
    }
}

const CHECK_SYSTEM: &str = "You are a strict originality reviewer. Assess whether the text reads \
    as copied or closely paraphrased from existing published work. Respond with a JSON object only.";

const REWRITE_SYSTEM: &str =
    "You are a professional novelist. Output only the requested prose, with no commentary.";

fn check_prompt(title: &str, body: &str) -> String {
    format!(
        "Evaluate the originality of the chapter \"{title}\" below.\n\
         Respond in JSON with originality_score (1-10, 10 = fully original), \
         risk_level (LOW, MEDIUM or HIGH), issues_found (true/false), issues (list) \
         and suggestions (list).\n\n---\n\n{body}"
    )
}

fn expansion_prompt(title: &str, body: &str, missing_words: usize) -> String {
    format!(
        "Continue the chapter \"{title}\" from where it ends. Write about {missing_words} more \
         words that extend the scene naturally. Do not repeat or summarize earlier text and \
         return only the new passage.\n\n---\n\n{body}"
    )
}
