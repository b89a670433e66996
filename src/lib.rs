mod app_state;
pub mod constants;
pub mod tracker;

use std::path::PathBuf;

use crate::app_state::build_state;
use crate::constants::{DATA_DIR_ENV, PASSWORD_ENV};
use crate::tracker::gateway::serve;

pub async fn run() -> anyhow::Result<()> {
    let data_dir = std::env::var(DATA_DIR_ENV)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./user-data"));
    let password = std::env::var(PASSWORD_ENV).ok();

    let state = build_state(data_dir, password.as_deref())?;
    log::info!(
        "data dir {}, config {}",
        state.data_dir.display(),
        state.config_path.display()
    );

    // Warm the rate cache so the first listing does not wait on the remote.
    let rates = state.gateway.rates.clone();
    tokio::spawn(async move {
        let snap = rates.get().await;
        log::info!("exchange rates ready ({})", snap.status.as_str());
    });

    serve(state.gateway).await
}
