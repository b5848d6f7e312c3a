use config::{Config, Environment, File, FileFormat};
use std::path::Path;
use tracing::{debug, info};

use super::settings::ForecastConfig;
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "forecast.toml";
pub const ENV_PREFIX: &str = "FORECAST";

/// Load configuration from built-in defaults, then the TOML file at `path`
/// (optional when absent), then `FORECAST__*` environment variables.
pub fn load_config(path: &Path) -> Result<ForecastConfig, ConfigError> {
    let required = path != Path::new(DEFAULT_CONFIG_FILE);
    if path.exists() {
        info!(path = %path.display(), "loading configuration file");
    } else {
        debug!(path = %path.display(), "configuration file not found, using defaults");
    }
    let file = File::from(path).format(FileFormat::Toml).required(required);
    layered(Some(file), true)
}

/// Parse configuration from an in-memory TOML document layered over defaults.
pub fn load_config_str(toml: &str) -> Result<ForecastConfig, ConfigError> {
    layered(Some(File::from_str(toml, FileFormat::Toml)), false)
}

fn layered<S>(file: Option<S>, with_env: bool) -> Result<ForecastConfig, ConfigError>
where
    S: config::Source + Send + Sync + 'static,
{
    let defaults = Config::try_from(&ForecastConfig::default())?;
    let mut builder = Config::builder().add_source(defaults);
    if let Some(file) = file {
        builder = builder.add_source(file);
    }
    if with_env {
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("universe")
                .with_list_parse_key("feature_windows")
                .try_parsing(true),
        );
    }

    let config: ForecastConfig = builder.build()?.try_deserialize()?;
    Ok(config)
}

/// Render the effective configuration as TOML.
pub fn render_toml(config: &ForecastConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}
