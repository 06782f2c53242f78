pub mod config_cmd;
pub mod export;
pub mod knowledge;
pub mod sweep;

use sidechat_config::AppConfig;
use sidechat_core::store::BranchStore;
use std::sync::Arc;

/// Load the configuration and open the store it names.
pub async fn open_configured_store()
-> Result<(AppConfig, Arc<dyn BranchStore>), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let store = sidechat_store::open_store(&config.store).await?;
    Ok((config, store))
}
