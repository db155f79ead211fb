pub mod describe;
pub mod list;
pub mod run;
pub mod status;
pub mod validate;

use std::path::Path;

use color_eyre::Result;

use hunt_service::EngineConfig;

/// Load and validate the engine config
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = EngineConfig::load(path)?;
    tracing::debug!(?config, "engine config loaded");
    Ok(config)
}
