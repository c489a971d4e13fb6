//! Session commands - setup, refresh, status, logout

use std::path::Path;

use bunqlink_client::crypto::api_key_fingerprint;
use bunqlink_client::SessionOrchestrator;

use crate::display;

/// Run the full handshake, replacing whatever is stored
pub async fn setup(orchestrator: &SessionOrchestrator) -> anyhow::Result<()> {
    crate::require_valid(orchestrator.config())?;
    display::section("Setting up bunq API access");
    display::info("Generating key pair, installing, registering device, opening session...");

    let record = orchestrator.perform_full_setup_with(super::interrupt()).await?;

    display::success("Installation, device and session ready");
    display::record(&record);
    println!();
    Ok(())
}

/// Open a fresh session, or run setup if no installation is stored
pub async fn refresh(orchestrator: &SessionOrchestrator) -> anyhow::Result<()> {
    crate::require_valid(orchestrator.config())?;
    display::section("Refreshing session");

    let record = orchestrator.refresh_session_with(super::interrupt()).await?;

    display::success("Session refreshed");
    display::record(&record);
    println!();
    Ok(())
}

/// Describe the stored credentials
pub async fn status(orchestrator: &SessionOrchestrator, store_path: &Path) -> anyhow::Result<()> {
    display::section("Status");
    display::kv("Credential file", &store_path.display().to_string());

    let record = orchestrator.vault().load().await?;
    display::state(bunqlink_client::SessionState::of(record.as_ref()));

    let Some(record) = record else {
        display::info("Run `bunqlink setup` to connect");
        println!();
        return Ok(());
    };
    display::record(&record);

    match (orchestrator.config().api_key(), record.api_key_fingerprint.as_deref()) {
        (None, _) => display::warning("BUNQ_API_KEY is not set"),
        (Some(key), Some(stored)) if api_key_fingerprint(key) != stored => {
            display::warning("BUNQ_API_KEY differs from the key used at setup; the next call starts over")
        }
        _ => {}
    }
    println!();
    Ok(())
}

/// Forget everything, deleting the remote session first when possible
pub async fn logout(orchestrator: &SessionOrchestrator) -> anyhow::Result<()> {
    display::section("Logging out");
    orchestrator.logout().await?;
    display::success("Stored credentials removed");
    println!();
    Ok(())
}
