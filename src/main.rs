//! folio - multi-provider text generation dispatcher
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use folio::cli::{Cli, Commands, Runtime};
use folio::core::logging::{self, LogSettings};
use folio::error::FolioError;
use folio::storage::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    let config_level = config
        .as_ref()
        .ok()
        .and_then(|c| c.general.log_level.clone());
    logging::init(&LogSettings::resolve(
        cli.log_level.as_deref(),
        config_level.as_deref(),
        cli.json_output,
        cli.verbose,
    ));

    match run(cli, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("error[{}]: {e}", e.error_code());
            if let Some(wait) = e.retry_after() {
                eprintln!("hint: retry in {}", folio::util::format_wait(wait));
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Run the selected command. `Ok(false)` means the command finished but
/// reports an unhealthy state.
async fn run(cli: Cli, config: Result<Config, FolioError>) -> folio::Result<bool> {
    let format = cli.effective_format();
    let pretty = cli.pretty;

    match cli.command {
        Commands::Doctor(args) => folio::cli::doctor::execute(&args, config, format, pretty).await,

        Commands::Models(args) => {
            let registry = config?.build_registry()?;
            folio::cli::models::execute(&args, &registry, format, pretty)?;
            Ok(true)
        }

        Commands::Dispatch(args) => {
            let runtime = Runtime::open(config?)?;
            folio::cli::dispatch::execute(&args, &runtime, format, pretty).await?;
            Ok(true)
        }

        Commands::Refine(args) => {
            let runtime = Runtime::open(config?)?;
            folio::cli::refine::execute(&args, &runtime, format, pretty).await?;
            Ok(true)
        }

        Commands::Quota(args) => {
            let runtime = Runtime::open(config?)?;
            folio::cli::quota::execute(&args, &runtime, format, pretty)?;
            Ok(true)
        }
    }
}
