//! Request command - one signed business call

use anyhow::Context;
use colored::*;
use serde_json::Value;

use bunqlink_client::{BunqError, Method, RequestOptions, SessionOrchestrator};

use crate::display;

/// Send a request with the stored session, setting one up if needed
pub async fn send(
    orchestrator: &SessionOrchestrator,
    method: Method,
    path: &str,
    data: Option<&str>,
) -> anyhow::Result<()> {
    crate::require_valid(orchestrator.config())?;
    let body = data.map(parse_body).transpose()?;

    let options = RequestOptions::new().cancellable(super::interrupt());
    let result = orchestrator
        .request_with(method, path, body.as_ref(), options)
        .await;

    let envelope = match result {
        Ok(envelope) => envelope,
        Err(err @ BunqError::Api { .. }) => {
            for translated in err.translated_messages() {
                if !translated.is_empty() && translated != err.to_string() {
                    display::info(translated);
                }
            }
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    };

    display::success(&format!("{} {} ({} items)", method, path, envelope.len()));
    for item in &envelope.items {
        println!();
        println!("{}", item.type_name.bright_white().bold());
        println!("{}", serde_json::to_string_pretty(&item.value)?);
    }
    if let Some(pagination) = &envelope.pagination {
        println!();
        println!("{}", "Pagination".bright_black());
        println!("{}", serde_json::to_string_pretty(pagination)?);
    }
    println!();
    Ok(())
}

/// Inline JSON, or `@path` to read it from a file
fn parse_body(data: &str) -> anyhow::Result<Value> {
    let text = match data.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("Reading {}", path))?,
        None => data.to_string(),
    };
    serde_json::from_str(&text).context("Request body is not valid JSON")
}
