use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment prefix for nested overrides, e.g. `ROUNDNOTE_DISPATCHER__MAX_CONCURRENT_JOBS`.
const ENV_PREFIX: &str = "ROUNDNOTE_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    extract(Figment::new().merge(Toml::file(path)))
}

/// Load configuration from defaults and environment variables only
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    extract(Figment::from(Serialized::defaults(Config::default())))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn extract(base: Figment) -> Result<Config, ConfigError> {
    base.merge(Env::prefixed(ENV_PREFIX).split("__"))
        // Plain TOKEN, as most deployments provide it.
        .merge(Env::raw().only(&["TOKEN"]).map(|_| "telegram.token".into()))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}
