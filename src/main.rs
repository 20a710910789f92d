use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use storefront_tracker::{FileStore, FlushOutcome, HttpTransport, Tracker, TrackerConfig, UserId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STORE_DIR_VAR: &str = "STOREFRONT_TRACKER_STORE_DIR";
const ENDPOINT_VAR: &str = "STOREFRONT_TRACKER_ENDPOINT";
const USER_ID_VAR: &str = "STOREFRONT_TRACKER_USER_ID";

/// Drains an offline event backlog: loads the persisted queue from a file
/// store and sends it to the tracking backend in one batch.
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_tracker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store_dir = env_nonempty(STORE_DIR_VAR);
    let endpoint = env_nonempty(ENDPOINT_VAR);
    let (Some(store_dir), Some(endpoint)) = (store_dir, endpoint) else {
        tracing::error!("{STORE_DIR_VAR} and {ENDPOINT_VAR} must both be set");
        return ExitCode::FAILURE;
    };

    let store = match FileStore::open(PathBuf::from(&store_dir)) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, dir = %store_dir, "Failed to open store");
            return ExitCode::FAILURE;
        }
    };
    let transport = match HttpTransport::new(&endpoint) {
        Ok(transport) => transport,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };
    let tracker = match Tracker::new(TrackerConfig::from_env(), Arc::new(store), transport) {
        Ok(tracker) => tracker,
        Err(e) => {
            tracing::error!(error = %e, "Invalid tracker configuration");
            return ExitCode::FAILURE;
        }
    };

    tracker.identify(env_nonempty(USER_ID_VAR).map(UserId::new));
    tracker.start();

    match tracker.shutdown().await {
        FlushOutcome::Empty => tracing::info!("No queued events"),
        FlushOutcome::Sent { count } => tracing::info!(count, "Backlog delivered"),
        FlushOutcome::Requeued { count, reason } => {
            tracing::warn!(count, %reason, "Backlog kept for a later run");
        }
    }
    ExitCode::SUCCESS
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
