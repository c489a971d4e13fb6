//! CLI commands

pub mod request;
pub mod session;

use bunqlink_client::Cancellation;

/// Cancellation that fires on Ctrl-C
pub fn interrupt() -> Cancellation {
    let cancel = Cancellation::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, abandoning in-flight request");
            trigger.cancel();
        }
    });
    cancel
}
