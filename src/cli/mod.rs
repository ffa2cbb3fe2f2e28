//! CLI argument parsing and command execution.

pub mod args;
pub mod dispatch;
pub mod doctor;
pub mod models;
pub mod quota;
pub mod refine;

use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

pub use args::{Cli, Commands, OutputFormat};

use crate::core::clock::{Clock, SystemClock};
use crate::core::dispatcher::Dispatcher;
use crate::core::http::default_client;
use crate::core::progress::{ProgressCallback, ProgressEvent};
use crate::core::registry::{Provider, ProviderRegistry};
use crate::error::{FolioError, Result};
use crate::providers::{AdapterMap, adapter_for};
use crate::storage::config::Config;
use crate::storage::sqlite::SqliteStateStore;
use crate::util::format_wait;

/// Everything a command needs to talk to providers.
pub struct Runtime {
    pub config: Config,
    pub registry: Arc<ProviderRegistry>,
    pub store: Arc<SqliteStateStore>,
    pub clock: Arc<dyn Clock>,
}

impl Runtime {
    /// Open the state database and build the registry from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry is inconsistent or the state
    /// database cannot be opened.
    pub fn open(config: Config) -> Result<Self> {
        let registry = Arc::new(config.build_registry()?);
        let path = config.state_db_path();
        debug!(path = %path.display(), "Opening state database");
        let store = Arc::new(SqliteStateStore::open(&path)?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        match store.cleanup_attempts(config.dispatch.attempt_retention_days, clock.now()) {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Pruned old attempts"),
            Err(e) => warn!(error = %e, "Attempt log cleanup failed"),
        }

        Ok(Self {
            config,
            registry,
            store,
            clock,
        })
    }

    /// Adapters for every enabled provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn adapters(&self) -> Result<AdapterMap> {
        let client = default_client()?;
        let mut adapters: AdapterMap = HashMap::new();
        for &provider in Provider::ALL {
            if self.registry.is_enabled(provider) {
                adapters.insert(
                    provider,
                    adapter_for(provider, self.config.endpoint(provider), client.clone()),
                );
            }
        }
        Ok(adapters)
    }

    /// Dispatcher wired to the state database and config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn dispatcher(&self, progress: Option<ProgressCallback>) -> Result<Dispatcher> {
        let mut dispatcher = Dispatcher::new(
            self.registry.clone(),
            self.adapters()?,
            self.store.clone(),
            self.clock.clone(),
        )
        .with_recorder(self.store.clone())
        .with_retry_policy(self.config.retry_policy())
        .with_cooldown(self.config.cooldown())
        .with_quota_window(self.config.quota_window())
        .with_max_quota_wait(self.config.max_quota_wait());

        if let Some(progress) = progress {
            dispatcher = dispatcher.with_progress(progress);
        }
        Ok(dispatcher)
    }
}

/// Progress lines on stderr, only for interactive human output.
#[must_use]
pub fn stderr_progress(format: OutputFormat) -> Option<ProgressCallback> {
    if format != OutputFormat::Human || !std::io::stderr().is_terminal() {
        return None;
    }
    Some(Arc::new(|event: &ProgressEvent| {
        if let Some(line) = progress_line(event) {
            eprintln!("{line}");
        }
    }))
}

fn progress_line(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::Attempting {
            model, retry_index, ..
        } => Some(if *retry_index == 0 {
            format!("-> {model}")
        } else {
            format!("-> {model} (retry {retry_index})")
        }),
        ProgressEvent::Waiting { model, wait } => {
            Some(format!("   waiting {} for {model}", format_wait(*wait)))
        }
        ProgressEvent::Skipped { model, reason } => Some(format!("   skip {model}: {reason}")),
        ProgressEvent::Unit {
            unit,
            phase,
            detail,
        } => Some(format!("[{unit}] {phase}: {detail}")),
        ProgressEvent::AttemptFinished { .. } => None,
    }
}

/// Serialize `value` as JSON on stdout.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(FolioError::Json)?;
    println!("{json}");
    Ok(())
}
