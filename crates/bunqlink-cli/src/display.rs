//! Display utilities for the CLI

use bunqlink_client::{BunqConfig, InstallationRecord, SessionState};
use colored::*;

/// Print the one-line header shown before every command
pub fn banner(config: &BunqConfig) {
    println!();
    println!(
        "{} {} {}",
        "bunqlink".bright_white().bold(),
        "·".bright_black(),
        match config.environment {
            bunqlink_client::Environment::Production => config.environment.to_string().bright_red(),
            bunqlink_client::Environment::Sandbox => config.environment.to_string().bright_cyan(),
        }
    );
    println!("{}", config.base_url().bright_black());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", "━".repeat(60).bright_black());
    println!(" {}", title.bright_white().bold());
    println!("{}", "━".repeat(60).bright_black());
}

/// Print a success message
pub fn success(message: &str) {
    println!("  {} {}", "✓".bright_green(), message);
}

/// Print an error message
pub fn error(message: &str) {
    println!("  {} {}", "✗".bright_red(), message.bright_red());
}

/// Print an info message
pub fn info(message: &str) {
    println!("  {} {}", "→".bright_blue(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("  {} {}", "⚠".yellow(), message.yellow());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("      {}: {}", key, value.bright_cyan());
}

pub fn state(state: SessionState) {
    let label = state.to_string();
    let styled = match state {
        SessionState::SessionActive => label.bright_green(),
        SessionState::Uninitialized => label.yellow(),
        _ => label.bright_cyan(),
    };
    println!("  {}: {}", "State".bright_white(), styled);
}

/// Print the non-secret parts of a stored record
pub fn record(record: &InstallationRecord) {
    kv("Installation token", &redact(&record.installation_token));
    kv(
        "Server public key",
        if record.server_public_key.is_empty() { "not provided" } else { "stored" },
    );
    kv(
        "Device ID",
        &record.device_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
    );
    match &record.session {
        Some(session) => {
            kv("Session token", &redact(&session.token));
            kv("User ID", &session.user_id.to_string());
            if let Some(id) = session.session_id {
                kv("Session ID", &id.to_string());
            }
        }
        None => kv("Session", "none"),
    }
}

/// First few characters of a token, enough to tell two apart
fn redact(token: &str) -> String {
    let visible: String = token.chars().take(6).collect();
    if visible.len() < token.len() {
        format!("{}…", visible)
    } else {
        visible
    }
}
