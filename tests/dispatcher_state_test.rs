//! Dispatcher behavior over the file-backed state database.
//!
//! Quota, cooldown and attempt records must survive a process restart, which
//! here means dropping the dispatcher and reopening the database file.

mod common;

use std::sync::Arc;
use std::time::Duration;

use folio::core::convergence::{LoopConfig, QualityConvergenceLoop};
use folio::core::dispatcher::Dispatcher;
use folio::core::models::{Acceptance, ContentUnit, Request, TaskType, UnitStatus};
use folio::core::registry::{CostClass, ModelSpec, Provider, ProviderRegistry};
use folio::error::FolioError;
use folio::providers::AdapterOutcome;
use folio::storage::sqlite::SqliteStateStore;
use folio::test_utils::{ManualClock, ScriptedAdapter, TestDir, single_adapter, words};

use common::logger::TestLogger;

const PRIMARY: &str = "groq/primary";
const BACKUP: &str = "groq/backup";

fn registry() -> Arc<ProviderRegistry> {
    let models = vec![
        ModelSpec::new(Provider::Groq, "primary", 1, 2, CostClass::Fast, &[TaskType::Fast]),
        ModelSpec::new(Provider::Groq, "backup", 30, 1_000, CostClass::Standard, &[]),
    ];
    Arc::new(ProviderRegistry::new(models, Default::default()).unwrap())
}

fn dispatcher(
    store: Arc<SqliteStateStore>,
    adapter: Arc<ScriptedAdapter>,
    clock: Arc<ManualClock>,
) -> Dispatcher {
    Dispatcher::new(registry(), single_adapter(adapter), store.clone(), clock)
        .with_recorder(store)
        .with_max_quota_wait(Duration::from_secs(5))
}

fn rate_limited() -> AdapterOutcome {
    AdapterOutcome::RateLimited {
        retry_after: Some(Duration::from_secs(300)),
        message: "HTTP 429: slow down".to_string(),
    }
}

#[tokio::test]
async fn cooldown_survives_reopen() {
    let log = TestLogger::new("cooldown_survives_reopen");
    let dir = TestDir::new();
    let db = dir.file_path("state.sqlite");
    let clock = Arc::new(ManualClock::new());

    log.phase("first run");
    {
        let adapter = Arc::new(ScriptedAdapter::new(Provider::Groq));
        adapter.push(PRIMARY, rate_limited());
        adapter.push_text(BACKUP, "from backup");
        let store = Arc::new(SqliteStateStore::open(&db).unwrap());
        let d = dispatcher(store, adapter, clock.clone());
        assert_eq!(
            d.dispatch(&Request::new(TaskType::Fast, "q")).await.unwrap(),
            "from backup"
        );
    }

    log.phase("second run");
    let adapter = Arc::new(ScriptedAdapter::new(Provider::Groq));
    adapter.push_text(PRIMARY, "from primary");
    adapter.push_text(BACKUP, "from backup again");
    let store = Arc::new(SqliteStateStore::open(&db).unwrap());
    let d = dispatcher(store, adapter.clone(), clock.clone());

    clock.advance(Duration::from_secs(120));
    assert_eq!(
        d.dispatch(&Request::new(TaskType::Fast, "q")).await.unwrap(),
        "from backup again"
    );
    assert_eq!(adapter.calls(PRIMARY), 0);

    clock.advance(Duration::from_secs(181));
    assert_eq!(
        d.dispatch(&Request::new(TaskType::Fast, "q")).await.unwrap(),
        "from primary"
    );
    log.finish_ok();
}

#[tokio::test]
async fn full_window_persists_and_overlong_wait_skips_candidate() {
    let dir = TestDir::new();
    let db = dir.file_path("state.sqlite");
    let clock = Arc::new(ManualClock::new());
    let adapter = Arc::new(ScriptedAdapter::new(Provider::Groq));
    adapter.push_text(PRIMARY, "one");
    adapter.push_text(BACKUP, "two");

    {
        let store = Arc::new(SqliteStateStore::open(&db).unwrap());
        let d = dispatcher(store, adapter.clone(), clock.clone());
        d.dispatch(&Request::new(TaskType::Fast, "q")).await.unwrap();
    }

    // Primary allows one call per minute; the next slot is ~60s away, above
    // the 5s ceiling, so the reopened dispatcher moves on without waiting.
    clock.advance(Duration::from_secs(10));
    let store = Arc::new(SqliteStateStore::open(&db).unwrap());
    let d = dispatcher(store.clone(), adapter.clone(), clock.clone());
    let outcome = d
        .dispatch_detailed(&Request::new(TaskType::Fast, "q"))
        .await
        .unwrap();
    assert_eq!(outcome.model, BACKUP);
    assert!(clock.sleeps().is_empty());

    // The denied reservation still counts toward the day.
    let status = d.quota().status(registry().model(PRIMARY).unwrap()).unwrap();
    assert_eq!(status.used_in_window, 1);
    assert_eq!(status.used_today, 2);
}

#[tokio::test]
async fn forced_model_spent_for_the_day_reports_daily_limit() {
    let dir = TestDir::new();
    let db = dir.file_path("state.sqlite");
    let clock = Arc::new(ManualClock::new());
    let adapter = Arc::new(ScriptedAdapter::new(Provider::Groq).with_default(
        AdapterOutcome::Success("fine".to_string()),
    ));
    let store = Arc::new(SqliteStateStore::open(&db).unwrap());
    let d = dispatcher(store, adapter, clock.clone());

    let forced = Request::new(TaskType::Fast, "q")
        .with_forced_model(PRIMARY)
        .without_fallback();
    d.dispatch(&forced).await.unwrap();
    clock.advance(Duration::from_secs(61));
    d.dispatch(&forced).await.unwrap();
    clock.advance(Duration::from_secs(61));

    let err = d.dispatch(&forced).await.unwrap_err();
    assert!(matches!(err, FolioError::DailyLimitExceeded { ref model } if model == PRIMARY));

    // With fallback allowed the same request lands on the backup.
    let relaxed = Request::new(TaskType::Fast, "q").with_forced_model(PRIMARY);
    let outcome = d.dispatch_detailed(&relaxed).await.unwrap();
    assert_eq!(outcome.model, BACKUP);
}

#[tokio::test]
async fn attempts_are_recorded_without_prompt_text() {
    let dir = TestDir::new();
    let db = dir.file_path("state.sqlite");
    let clock = Arc::new(ManualClock::new());
    let adapter = Arc::new(ScriptedAdapter::new(Provider::Groq));
    adapter.push(PRIMARY, AdapterOutcome::FatalError("HTTP 404: no such model".to_string()));
    adapter.push_text(BACKUP, "answer");

    let store = Arc::new(SqliteStateStore::open(&db).unwrap());
    let d = dispatcher(store.clone(), adapter, clock);
    d.dispatch(&Request::new(TaskType::Fast, "a secret prompt"))
        .await
        .unwrap();

    let attempts = store.recent_attempts(10).unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].model, BACKUP);
    assert_eq!(attempts[0].outcome, "success");
    assert_eq!(attempts[1].outcome, "fatal_error");
    assert!(attempts[1].error.as_deref().unwrap().contains("404"));
    assert_eq!(attempts[0].request_id, attempts[1].request_id);

    let raw = std::fs::read(&db).unwrap();
    let needle = b"a secret prompt";
    assert!(!raw.windows(needle.len()).any(|w| w == needle));
}

#[tokio::test]
async fn every_model_spent_for_the_day_fails_dispatch_but_not_the_run() {
    let log = TestLogger::new("every_model_spent_for_the_day_fails_dispatch_but_not_the_run");
    let dir = TestDir::new();
    let clock = Arc::new(ManualClock::new());
    let models = vec![
        ModelSpec::new(Provider::Groq, "primary", 10, 1, CostClass::Fast, &[]),
        ModelSpec::new(Provider::Groq, "backup", 10, 1, CostClass::Standard, &[]),
    ];
    let registry = Arc::new(ProviderRegistry::new(models, Default::default()).unwrap());
    let adapter = Arc::new(
        ScriptedAdapter::new(Provider::Groq)
            .with_default(AdapterOutcome::Success("fine".to_string())),
    );
    let store = Arc::new(SqliteStateStore::open(&dir.file_path("state.sqlite")).unwrap());
    let d = Dispatcher::new(registry, single_adapter(adapter.clone()), store.clone(), clock)
        .with_recorder(store);

    log.phase("spend daily limits");
    let request = Request::new(TaskType::General, "q");
    assert_eq!(d.dispatch_detailed(&request).await.unwrap().model, PRIMARY);
    assert_eq!(d.dispatch_detailed(&request).await.unwrap().model, BACKUP);

    let err = d.dispatch(&request).await.unwrap_err();
    assert!(
        matches!(err, FolioError::AllProvidersFailed { attempts: 0, .. }),
        "unexpected error: {err:?}"
    );
    assert_eq!(adapter.recorded().len(), 2);

    log.phase("refine");
    let refiner = QualityConvergenceLoop::new(
        Arc::new(d),
        LoopConfig {
            min_words: 50,
            ..LoopConfig::default()
        },
    );
    let mut units = vec![
        ContentUnit::new("one", "One", words(80)),
        ContentUnit::new("two", "Two", words(80)),
    ];
    let originals: Vec<String> = units.iter().map(|u| u.body.clone()).collect();
    let summaries = refiner.run_all(&mut units).await;

    assert_eq!(summaries.len(), 2);
    for (unit, original) in units.iter().zip(&originals) {
        assert_eq!(unit.status, UnitStatus::Accepted);
        assert_eq!(&unit.body, original);
        assert!(matches!(unit.acceptance, Some(Acceptance::Forced { .. })));
    }
    assert_eq!(adapter.recorded().len(), 2);
    log.finish_ok();
}
