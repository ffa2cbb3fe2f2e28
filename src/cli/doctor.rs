//! Doctor command implementation.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use crate::cli::args::{DoctorArgs, OutputFormat};
use crate::cli::print_json;
use crate::core::doctor::checks::{check_all_providers, disabled_health};
use crate::core::doctor::{CheckStatus, DiagnosticCheck, DoctorReport, ProviderHealth};
use crate::core::http::build_client;
use crate::core::registry::Provider;
use crate::error::{FolioError, Result};
use crate::storage::config::Config;
use crate::storage::sqlite::SqliteStateStore;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute the doctor command.
///
/// `config` is the load result, so a broken config file is reported rather
/// than aborting the run. Returns whether at least one provider is usable.
///
/// # Errors
///
/// Returns an error for an unknown `--provider` name or if output fails.
pub async fn execute(
    args: &DoctorArgs,
    config: Result<Config>,
    format: OutputFormat,
    pretty: bool,
) -> Result<bool> {
    let start = Instant::now();
    tracing::debug!(?args.provider, "Starting doctor checks");

    let providers = match &args.provider {
        Some(names) => names
            .iter()
            .map(|name| Provider::from_cli_name(name))
            .collect::<Result<Vec<_>>>()?,
        None => Provider::ALL.to_vec(),
    };

    let config_status = check_config(config.as_ref());
    let config = config.unwrap_or_default();
    let state_db = check_state_db(&config);
    let providers = check_providers(&providers, &config).await?;

    let report = DoctorReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_status,
        state_db,
        providers,
        total_duration: start.elapsed(),
    };

    match format {
        OutputFormat::Human => print!("{}", render_human(&report)),
        OutputFormat::Json => print_json(&report, pretty)?,
    }
    Ok(report.any_provider_ready())
}

async fn check_providers(providers: &[Provider], config: &Config) -> Result<Vec<ProviderHealth>> {
    let disabled = config.disabled_providers();
    let targets: Vec<_> = providers
        .iter()
        .filter(|p| !disabled.contains(p))
        .map(|&p| (p, config.endpoint(p)))
        .collect();

    let client = build_client(PROBE_TIMEOUT)?;
    let mut checked = check_all_providers(&targets, &client).await;

    let mut health = Vec::with_capacity(providers.len());
    for &provider in providers {
        if disabled.contains(&provider) {
            health.push(disabled_health(provider));
        } else if let Some(pos) = checked.iter().position(|h| h.provider == provider) {
            health.push(checked.remove(pos));
        }
    }
    Ok(health)
}

fn check_config(loaded: std::result::Result<&Config, &FolioError>) -> DiagnosticCheck {
    let start = Instant::now();
    let status = match loaded {
        Ok(_) => {
            let path = Config::config_path();
            let details = if path.exists() {
                path.display().to_string()
            } else {
                "using defaults".to_string()
            };
            CheckStatus::Pass {
                details: Some(details),
            }
        }
        Err(e) => CheckStatus::Fail {
            reason: format!("failed to load: {e}"),
            suggestion: Some(format!("check {}", Config::config_path().display())),
        },
    };
    DiagnosticCheck::new("Config", status).with_duration(start.elapsed())
}

fn check_state_db(config: &Config) -> DiagnosticCheck {
    let start = Instant::now();
    let path = config.state_db_path();
    let status = match SqliteStateStore::open(&path) {
        Ok(store) => {
            let models = store.known_models().map_or(0, |m| m.len());
            CheckStatus::Pass {
                details: Some(format!("{} ({models} model(s) tracked)", path.display())),
            }
        }
        Err(e) => CheckStatus::Fail {
            reason: e.to_string(),
            suggestion: Some("set FOLIO_STATE_DB to a writable path".to_string()),
        },
    };
    DiagnosticCheck::new("State database", status).with_duration(start.elapsed())
}

fn render_check(out: &mut String, check: &DiagnosticCheck) {
    let _ = write!(out, "  [{:<7}] {}: {}", check.status.label(), check.name, check.status);
    if let Some(duration) = check.duration {
        let _ = write!(out, " ({}ms)", duration.as_millis());
    }
    out.push('\n');
}

/// Plain-text report.
#[must_use]
pub fn render_human(report: &DoctorReport) -> String {
    let mut out = format!("folio {}\n\n", report.version);
    render_check(&mut out, &report.config_status);
    render_check(&mut out, &report.state_db);

    for health in &report.providers {
        let _ = writeln!(out, "\n{}", health.provider.display_name());
        render_check(&mut out, &health.credentials);
        render_check(&mut out, &health.reachable);
    }

    let (ready, attention) = report.summary();
    let _ = writeln!(
        out,
        "\n{ready} provider(s) ready, {attention} item(s) need attention ({}ms)",
        report.total_duration.as_millis()
    );
    if !report.any_provider_ready() {
        out.push_str("No provider can serve requests.\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_config_fails_check() {
        let err = FolioError::ConfigParse {
            path: "/tmp/folio.toml".to_string(),
            message: "expected `=`".to_string(),
        };
        let check = check_config(Err(&err));
        assert_eq!(check.name, "Config");
        assert!(matches!(check.status, CheckStatus::Fail { .. }));
        assert!(check.duration.is_some());
    }

    #[test]
    fn state_db_check_opens_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.dispatch.state_db = Some(dir.path().join("state.sqlite"));

        let check = check_state_db(&config);
        assert!(check.status.is_ready());
        assert!(check.status.to_string().contains("0 model(s) tracked"));
    }

    #[tokio::test]
    async fn disabled_providers_are_skipped_in_order() {
        let mut config = Config::default();
        config.providers.groq.enabled = false;
        config.providers.openrouter.enabled = false;

        let health = check_providers(&[Provider::OpenRouter, Provider::Groq], &config)
            .await
            .unwrap();
        assert_eq!(health.len(), 2);
        assert_eq!(health[0].provider, Provider::OpenRouter);
        assert!(matches!(
            health[1].reachable.status,
            CheckStatus::Skipped { .. }
        ));
    }

    #[test]
    fn report_without_ready_provider_says_so() {
        let ok = DiagnosticCheck::new("Config", CheckStatus::Pass { details: None });
        let report = DoctorReport {
            version: "0.1.0".to_string(),
            config_status: ok.clone(),
            state_db: ok,
            providers: vec![disabled_health(Provider::Gemini)],
            total_duration: Duration::from_millis(3),
        };
        let text = render_human(&report);
        assert!(text.contains("Gemini"));
        assert!(text.contains("No provider can serve requests."));
    }
}
