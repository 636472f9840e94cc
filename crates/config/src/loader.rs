use std::path::{Path, PathBuf};

use {
    thiserror::Error,
    tracing::{debug, info, warn},
};

use crate::schema::PushConfig;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PUSHSUB_CONFIG";
pub const CONFIG_FILE_NAME: &str = "pushsub.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-user configuration directory, if the platform exposes one.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "pushsub", "pushsub")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn parse_toml_str(raw: &str) -> Result<PushConfig, ConfigError> {
    let config: PushConfig = toml::from_str(raw)?;
    config.validate().map_err(ConfigError::Invalid)?;
    Ok(config)
}

pub fn load_from_path(path: &Path) -> Result<PushConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_toml_str(&raw)?;
    debug!(path = %path.display(), "loaded push config");
    Ok(config)
}

/// Load `$PUSHSUB_CONFIG`, else `<config_dir>/pushsub.toml`, else defaults.
///
/// A file that exists but fails to load is reported and replaced by
/// defaults; the client stays usable and can still be configured in code.
pub fn discover_and_load() -> PushConfig {
    let explicit = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
    discover_from(explicit, config_dir())
}

fn discover_from(explicit: Option<PathBuf>, dir: Option<PathBuf>) -> PushConfig {
    let candidate = explicit.or_else(|| dir.map(|dir| dir.join(CONFIG_FILE_NAME)));
    let Some(path) = candidate else {
        info!("no config directory available, using default push config");
        return PushConfig::default();
    };
    if !path.is_file() {
        debug!(path = %path.display(), "push config not found, using defaults");
        return PushConfig::default();
    }
    match load_from_path(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "push config unusable, using defaults");
            PushConfig::default()
        },
    }
}
