//! Multi-provider generation dispatcher.
//!
//! Turns one [`Request`] into normalized text by walking the registry's
//! candidate list for the request's task type:
//!
//! 1. Skip candidates excluded for this run, exhausted for the UTC day, or
//!    cooling down after a rate limit.
//! 2. Reserve a quota slot, waiting (up to a ceiling) for the window to free.
//! 3. Call the provider adapter and classify the outcome: rate limits start a
//!    cooldown and move on, transient errors back off and retry the same model,
//!    fatal errors exclude the model for the run.
//! 4. Normalize successful output; an empty result counts as transient.
//!
//! Every adapter call is recorded as an [`Attempt`] and emitted as a
//! `tracing` event.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use super::clock::Clock;
use super::cooldown::CooldownTracker;
use super::models::{Attempt, OutcomeKind, Request};
use super::normalize::ContentNormalizer;
use super::progress::{ProgressCallback, ProgressEvent};
use super::quota::{QuotaTracker, Reservation};
use super::registry::{ModelSpec, ProviderRegistry};
use super::retry::RetryPolicy;
use crate::error::{FolioError, Result};
use crate::providers::{AdapterMap, AdapterOutcome, GenerationCall};
use crate::storage::attempt_log::{AttemptRecorder, NullAttemptLog};
use crate::storage::state_store::{CooldownStore, QuotaStore, StateStore};
use crate::util::{format_wait, sha256_hex};

/// Longest the dispatcher waits for a full quota window to free a slot.
pub const DEFAULT_MAX_QUOTA_WAIT: Duration = Duration::from_secs(65);

/// Successful dispatch with its provenance.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Normalized text.
    pub text: String,
    /// Model that produced it.
    pub model: String,
    /// Every adapter call made for this request, in order.
    pub attempts: Vec<Attempt>,
}

/// How one candidate ended.
enum CandidateResult {
    Done { text: String },
    /// Passed over or failed; move to the next candidate.
    Failed { reason: String },
    /// Per-day limit reached.
    DailyExhausted,
}

enum Slot {
    Granted,
    Unavailable(String),
    DailyExhausted,
}

/// Routes requests across providers with quota, cooldown and retry handling.
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    adapters: AdapterMap,
    quota: QuotaTracker,
    cooldown: CooldownTracker,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    normalizer: ContentNormalizer,
    recorder: Arc<dyn AttemptRecorder>,
    progress: Option<ProgressCallback>,
    max_quota_wait: Duration,
    /// Models that returned a fatal error during this run.
    excluded: Mutex<HashSet<String>>,
    /// Models whose daily limit is spent, with the UTC day it applies to.
    exhausted: Mutex<HashMap<String, NaiveDate>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("models", &self.registry.models().len())
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("retry", &self.retry)
            .field("max_quota_wait", &self.max_quota_wait)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher sharing `store` for quota and cooldown state.
    #[must_use]
    pub fn new(
        registry: Arc<ProviderRegistry>,
        adapters: AdapterMap,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let quota_store: Arc<dyn QuotaStore> = store.clone();
        let cooldown_store: Arc<dyn CooldownStore> = store;
        Self {
            registry,
            adapters,
            quota: QuotaTracker::new(quota_store, clock.clone()),
            cooldown: CooldownTracker::new(cooldown_store, clock.clone()),
            retry: RetryPolicy::default(),
            clock,
            normalizer: ContentNormalizer::new(),
            recorder: Arc::new(NullAttemptLog),
            progress: None,
            max_quota_wait: DEFAULT_MAX_QUOTA_WAIT,
            excluded: Mutex::new(HashSet::new()),
            exhausted: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn AttemptRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, duration: Duration) -> Self {
        self.cooldown = self.cooldown.with_duration(duration);
        self
    }

    #[must_use]
    pub fn with_quota_window(mut self, window: Duration) -> Self {
        self.quota = self.quota.with_window(window);
        self
    }

    #[must_use]
    pub const fn with_max_quota_wait(mut self, wait: Duration) -> Self {
        self.max_quota_wait = wait;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    #[must_use]
    pub const fn cooldown(&self) -> &CooldownTracker {
        &self.cooldown
    }

    /// Forget models excluded by fatal errors so far.
    pub fn reset_run(&self) {
        self.excluded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Generate normalized text for `request`.
    ///
    /// # Errors
    ///
    /// - [`FolioError::InvalidRequest`] if the request fails validation
    /// - [`FolioError::DailyLimitExceeded`] if the forced model is spent for
    ///   the day and fallback is disabled
    /// - [`FolioError::AllProvidersFailed`] if no candidate produced text
    /// - a storage error if quota/cooldown state cannot be accessed
    pub async fn dispatch(&self, request: &Request) -> Result<String> {
        self.dispatch_detailed(request).await.map(|o| o.text)
    }

    /// Like [`dispatch`](Self::dispatch), also returning the model used and
    /// every attempt made.
    ///
    /// # Errors
    ///
    /// Same as [`dispatch`](Self::dispatch).
    pub async fn dispatch_detailed(&self, request: &Request) -> Result<DispatchOutcome> {
        request.validate()?;
        let candidates = self.candidates_for(request)?;
        let prompt_sha256 = sha256_hex(&request.prompt);

        tracing::debug!(
            request_id = %request.id,
            task = %request.task,
            candidates = candidates.len(),
            "Dispatching request"
        );

        let mut attempts = Vec::new();
        let mut last_error = "no candidate model available".to_string();
        let mut forced_exhausted = false;

        for model in candidates {
            match self
                .try_candidate(request, model, &prompt_sha256, &mut attempts)
                .await?
            {
                CandidateResult::Done { text } => {
                    return Ok(DispatchOutcome {
                        text,
                        model: model.id.clone(),
                        attempts,
                    });
                }
                CandidateResult::Failed { reason } => {
                    last_error = format!("{}: {reason}", model.id);
                }
                CandidateResult::DailyExhausted => {
                    if request.forced_model.as_deref() == Some(model.id.as_str()) {
                        forced_exhausted = true;
                    }
                    last_error = format!("{}: daily limit exceeded", model.id);
                }
            }
        }

        if forced_exhausted && !request.allow_fallback {
            if let Some(model) = &request.forced_model {
                return Err(FolioError::DailyLimitExceeded {
                    model: model.clone(),
                });
            }
        }

        tracing::warn!(
            request_id = %request.id,
            task = %request.task,
            attempts = attempts.len(),
            last_error = %last_error,
            "All providers failed"
        );

        Err(FolioError::AllProvidersFailed {
            task: request.task.to_string(),
            attempts: attempts.len(),
            last_error,
        })
    }

    fn candidates_for(&self, request: &Request) -> Result<Vec<&ModelSpec>> {
        let Some(forced_id) = request.forced_model.as_deref() else {
            return Ok(self.registry.candidates(&request.task));
        };
        let forced = self
            .registry
            .model(forced_id)
            .ok_or_else(|| FolioError::InvalidRequest(format!("unknown model '{forced_id}'")))?;

        if !request.allow_fallback {
            return Ok(vec![forced]);
        }

        let mut candidates = vec![forced];
        candidates.extend(
            self.registry
                .candidates(&request.task)
                .into_iter()
                .filter(|m| m.id != forced.id),
        );
        Ok(candidates)
    }

    fn is_excluded(&self, model: &str) -> bool {
        self.excluded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(model)
    }

    fn exclude(&self, model: &str) {
        self.excluded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.to_string());
    }

    fn is_exhausted_today(&self, model: &str) -> bool {
        let today = self.clock.now().date_naive();
        self.exhausted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .is_some_and(|day| *day == today)
    }

    fn mark_exhausted(&self, model: &str) {
        let today = self.clock.now().date_naive();
        self.exhausted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.to_string(), today);
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }

    fn skip(&self, model: &ModelSpec, reason: String) -> CandidateResult {
        tracing::debug!(model = %model.id, reason = %reason, "Skipping candidate");
        self.emit(ProgressEvent::Skipped {
            model: model.id.clone(),
            reason: reason.clone(),
        });
        CandidateResult::Failed { reason }
    }

    async fn reserve_slot(&self, model: &ModelSpec) -> Result<Slot> {
        let wait = match self.quota.reserve(model)? {
            Reservation::Allowed => return Ok(Slot::Granted),
            Reservation::DailyLimitExceeded => return Ok(Slot::DailyExhausted),
            Reservation::Denied { wait } => wait,
        };

        if wait > self.max_quota_wait {
            return Ok(Slot::Unavailable(format!(
                "quota window full, next slot in {}",
                format_wait(wait)
            )));
        }

        tracing::info!(
            model = %model.id,
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "Waiting for quota slot"
        );
        self.emit(ProgressEvent::Waiting {
            model: model.id.clone(),
            wait,
        });
        self.clock.sleep(wait).await;

        Ok(match self.quota.reserve(model)? {
            Reservation::Allowed => Slot::Granted,
            Reservation::DailyLimitExceeded => Slot::DailyExhausted,
            Reservation::Denied { wait } => Slot::Unavailable(format!(
                "quota window still full after waiting, next slot in {}",
                format_wait(wait)
            )),
        })
    }

    async fn try_candidate(
        &self,
        request: &Request,
        model: &ModelSpec,
        prompt_sha256: &str,
        attempts: &mut Vec<Attempt>,
    ) -> Result<CandidateResult> {
        if self.is_excluded(&model.id) {
            return Ok(self.skip(model, "excluded for this run".to_string()));
        }
        if self.is_exhausted_today(&model.id) {
            self.emit(ProgressEvent::Skipped {
                model: model.id.clone(),
                reason: "daily limit exceeded".to_string(),
            });
            return Ok(CandidateResult::DailyExhausted);
        }
        let cooling_for = self.cooldown.remaining(&model.id)?;
        if !cooling_for.is_zero() {
            return Ok(self.skip(
                model,
                format!("cooling down, {} left", format_wait(cooling_for)),
            ));
        }
        let Some(adapter) = self.adapters.get(&model.provider) else {
            tracing::warn!(
                model = %model.id,
                provider = %model.provider,
                "No adapter registered for provider"
            );
            self.exclude(&model.id);
            return Ok(self.skip(
                model,
                format!("no adapter registered for {}", model.provider),
            ));
        };

        let call = GenerationCall::from_request(request);
        let mut retry_index = 0;

        loop {
            match self.reserve_slot(model).await? {
                Slot::Granted => {}
                Slot::Unavailable(reason) => return Ok(self.skip(model, reason)),
                Slot::DailyExhausted => {
                    tracing::info!(model = %model.id, "Daily limit exceeded");
                    self.mark_exhausted(&model.id);
                    return Ok(CandidateResult::DailyExhausted);
                }
            }

            self.emit(ProgressEvent::Attempting {
                task: request.task.clone(),
                model: model.id.clone(),
                retry_index,
            });

            let started_at = self.clock.now();
            let start = Instant::now();
            let outcome = adapter.generate(model, &call).await;
            let elapsed = start.elapsed();

            let mut attempt = Attempt {
                request_id: request.id.clone(),
                task: request.task.clone(),
                prompt_sha256: prompt_sha256.to_string(),
                model: model.id.clone(),
                provider: model.provider,
                outcome: outcome.kind(),
                raw_response: None,
                normalized: None,
                error: None,
                started_at,
                duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                retry_index,
            };

            let transient_reason = match outcome {
                AdapterOutcome::Success(raw) => {
                    let text = self.normalizer.normalize(&raw, Some(&request.prompt));
                    attempt.raw_response = Some(raw);
                    if text.is_empty() {
                        attempt.outcome = OutcomeKind::EmptyResponse;
                        attempt.error = Some("empty response after normalization".to_string());
                        self.finish_attempt(&attempt, elapsed, attempts);
                        "empty response after normalization".to_string()
                    } else {
                        attempt.normalized = Some(text.clone());
                        self.finish_attempt(&attempt, elapsed, attempts);
                        return Ok(CandidateResult::Done { text });
                    }
                }
                AdapterOutcome::RateLimited {
                    retry_after,
                    message,
                } => {
                    attempt.error = Some(message.clone());
                    self.finish_attempt(&attempt, elapsed, attempts);
                    self.cooldown.record_rate_limit(&model.id, retry_after)?;
                    return Ok(CandidateResult::Failed { reason: message });
                }
                AdapterOutcome::FatalError(message) => {
                    attempt.error = Some(message.clone());
                    self.finish_attempt(&attempt, elapsed, attempts);
                    self.exclude(&model.id);
                    return Ok(CandidateResult::Failed { reason: message });
                }
                AdapterOutcome::TransientError(message) => {
                    attempt.error = Some(message.clone());
                    self.finish_attempt(&attempt, elapsed, attempts);
                    message
                }
            };

            let Some(delay) = self.retry.delay_for(retry_index, request.retry_budget) else {
                return Ok(CandidateResult::Failed {
                    reason: transient_reason,
                });
            };
            tracing::debug!(
                model = %model.id,
                retry_index,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Backing off before retry"
            );
            self.emit(ProgressEvent::Waiting {
                model: model.id.clone(),
                wait: delay,
            });
            self.clock.sleep(delay).await;
            retry_index += 1;
        }
    }

    fn finish_attempt(&self, attempt: &Attempt, elapsed: Duration, attempts: &mut Vec<Attempt>) {
        match attempt.outcome {
            OutcomeKind::Success => tracing::info!(
                request_id = %attempt.request_id,
                task = %attempt.task,
                model = %attempt.model,
                outcome = attempt.outcome.as_str(),
                duration_ms = attempt.duration_ms,
                retry_index = attempt.retry_index,
                "Generation attempt succeeded"
            ),
            _ => tracing::warn!(
                request_id = %attempt.request_id,
                task = %attempt.task,
                model = %attempt.model,
                outcome = attempt.outcome.as_str(),
                duration_ms = attempt.duration_ms,
                retry_index = attempt.retry_index,
                error = attempt.error.as_deref().unwrap_or_default(),
                "Generation attempt failed"
            ),
        }

        if let Err(e) = self.recorder.record(attempt) {
            tracing::warn!(model = %attempt.model, error = %e, "Failed to record attempt");
        }
        self.emit(ProgressEvent::AttemptFinished {
            model: attempt.model.clone(),
            outcome: attempt.outcome,
            duration: elapsed,
        });
        attempts.push(attempt.clone());
    }
}
