//! `folio models`: show the model table or one task's candidate order.

use serde::Serialize;

use super::args::{ModelsArgs, OutputFormat};
use super::print_json;
use crate::core::models::TaskType;
use crate::core::registry::{ModelSpec, ProviderRegistry};
use crate::error::Result;

#[derive(Debug, Serialize)]
struct ModelRow<'a> {
    rank: usize,
    id: &'a str,
    class: &'static str,
    per_minute_limit: u32,
    per_day_limit: u32,
    tags: Vec<&'a str>,
}

fn rows<'a>(models: &[&'a ModelSpec]) -> Vec<ModelRow<'a>> {
    models
        .iter()
        .enumerate()
        .map(|(i, m)| ModelRow {
            rank: i + 1,
            id: &m.id,
            class: m.class.as_str(),
            per_minute_limit: m.per_minute_limit,
            per_day_limit: m.per_day_limit,
            tags: m.tags.iter().map(TaskType::as_str).collect(),
        })
        .collect()
}

/// Models to list: candidates for `task`, or every enabled model.
#[must_use]
pub fn selection<'a>(registry: &'a ProviderRegistry, task: Option<&str>) -> Vec<&'a ModelSpec> {
    match task {
        Some(task) => registry.candidates(&TaskType::parse(task)),
        None => registry
            .models()
            .iter()
            .filter(|m| registry.is_enabled(m.provider))
            .collect(),
    }
}

/// Render rows as an aligned table.
#[must_use]
pub fn render_table(models: &[&ModelSpec]) -> String {
    let width = models.iter().map(|m| m.id.len()).max().unwrap_or(5).max(5);
    let mut out = format!(
        "{:>3}  {:<width$}  {:<8}  {:>5}  {:>7}  tags\n",
        "#", "model", "class", "rpm", "rpd"
    );
    for row in rows(models) {
        out.push_str(&format!(
            "{:>3}  {:<width$}  {:<8}  {:>5}  {:>7}  {}\n",
            row.rank,
            row.id,
            row.class,
            row.per_minute_limit,
            row.per_day_limit,
            row.tags.join(", ")
        ));
    }
    out
}

/// Execute the models command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(
    args: &ModelsArgs,
    registry: &ProviderRegistry,
    format: OutputFormat,
    pretty: bool,
) -> Result<()> {
    let models = selection(registry, args.task.as_deref());
    match format {
        OutputFormat::Human => {
            if let Some(task) = &args.task {
                println!("Candidates for task '{}':", TaskType::parse(task));
            }
            print!("{}", render_table(&models));
        }
        OutputFormat::Json => print_json(&rows(&models), pretty)?,
    }
    Ok(())
}
