//! `folio dispatch`: one request through the failover chain.

use std::io::Read;

use serde::Serialize;

use super::args::{DispatchArgs, OutputFormat};
use super::{Runtime, print_json, stderr_progress};
use crate::core::models::{Request, TaskType};
use crate::error::{FolioError, Result};

#[derive(Debug, Serialize)]
struct DispatchJson<'a> {
    model: &'a str,
    task: &'a str,
    attempts: usize,
    text: &'a str,
}

/// Build the request from arguments and the prompt text.
///
/// # Errors
///
/// Returns an error if the schema file cannot be read or is not JSON.
pub fn build_request(args: &DispatchArgs, prompt: String, retry_budget: u32) -> Result<Request> {
    let mut request = Request::new(TaskType::parse(&args.task), prompt)
        .with_retry_budget(args.retry_budget.unwrap_or(retry_budget));

    if let Some(system) = &args.system {
        request = request.with_system(system.clone());
    }
    if let Some(temperature) = args.temperature {
        request = request.with_temperature(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(model) = &args.model {
        request = request.with_forced_model(model.clone());
        if args.no_fallback {
            request = request.without_fallback();
        }
    }
    if let Some(path) = &args.schema {
        let raw = std::fs::read_to_string(path)?;
        let schema: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            FolioError::InvalidRequest(format!("schema {} is not JSON: {e}", path.display()))
        })?;
        request = request.with_json_schema(schema);
    }
    Ok(request)
}

fn read_prompt(arg: Option<&str>) -> Result<String> {
    match arg {
        Some(prompt) if prompt != "-" => Ok(prompt.to_string()),
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Execute the dispatch command.
///
/// # Errors
///
/// Returns the dispatcher's error when no model produced text.
pub async fn execute(
    args: &DispatchArgs,
    runtime: &Runtime,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let prompt = read_prompt(args.prompt.as_deref())?;
    let request = build_request(args, prompt, runtime.config.dispatch.retry_budget)?;
    let dispatcher = runtime.dispatcher(stderr_progress(format))?;

    tracing::debug!(
        request_id = %request.id,
        task = %request.task,
        forced = ?request.forced_model,
        "Dispatching"
    );
    let outcome = dispatcher.dispatch_detailed(&request).await?;

    match format {
        OutputFormat::Human => println!("{}", outcome.text),
        OutputFormat::Json => print_json(
            &DispatchJson {
                model: &outcome.model,
                task: request.task.as_str(),
                attempts: outcome.attempts.len(),
                text: &outcome.text,
            },
            pretty,
        )?,
    }
    Ok(())
}
