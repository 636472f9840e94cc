//! Configuration for the push subscription client: connection target,
//! registration policy and behaviour switches, loaded from TOML.

pub mod loader;
pub mod schema;

pub use {
    loader::{CONFIG_ENV_VAR, CONFIG_FILE_NAME, ConfigError, config_dir, discover_and_load, load_from_path, parse_toml_str},
    schema::{BehaviorConfig, ConnectionConfig, PushConfig, RegistrationConfig},
};
