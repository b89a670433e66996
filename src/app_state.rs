use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::tracker::config::AppConfig;
use crate::tracker::gateway::GatewayState;
use crate::tracker::rates::RateCache;
use crate::tracker::secrets::SecretStore;
use crate::tracker::store::open_store_dir;

pub struct AppState {
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    pub gateway: GatewayState,
}

pub fn load_or_init_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        let txt = std::fs::read_to_string(path)?;
        let cfg: AppConfig = toml::from_str(&txt)?;
        return Ok(cfg);
    }
    let cfg = AppConfig::default_config();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(&cfg)?)?;
    Ok(cfg)
}

/// Opens everything under `data_dir`. A non-empty `password` replaces the stored login password.
pub fn build_state(data_dir: PathBuf, password: Option<&str>) -> anyhow::Result<AppState> {
    std::fs::create_dir_all(&data_dir)?;
    let config_path = data_dir.join("config.toml");
    let cfg = load_or_init_config(&config_path)?;

    let secrets = SecretStore::new(data_dir.join("secrets.json"));
    match password.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => secrets
            .set_login_password(p)
            .map_err(|e| anyhow::anyhow!("failed to store login password: {e}"))?,
        None if !secrets.has_login_password() => {
            log::warn!("no login password configured; every login will be rejected");
        }
        None => {}
    }

    let store = open_store_dir(&data_dir)?;
    let rates = RateCache::new(cfg.rates.clone(), &data_dir)?;

    let gateway = GatewayState {
        cfg: Arc::new(RwLock::new(cfg)),
        store,
        secrets,
        rates,
    };
    Ok(AppState {
        config_path,
        data_dir,
        gateway,
    })
}
