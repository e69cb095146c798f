//! The `config` module loads service settings.
//!
//! Sources, later ones winning:
//! - built-in defaults (`Settings::default()`)
//! - an optional `config/default.{toml,yaml,json,…}` file
//! - environment variables prefixed `HUBCAST`, nested with `__`,
//!   e.g. `HUBCAST__SERVER__PORT=9000`

mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    AuthSettings, BusSettings, HubSettings, LogSettings, PartialSettings, PersistenceSettings,
    ServerSettings, Settings, generate_node_id,
};

const ENV_PREFIX: &str = "HUBCAST";

/// Loads the configuration from `config/default` and the environment.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Loads the configuration from the file `name` (extension optional) and the
/// environment, merged over the defaults.
pub fn load_config_from(name: &str) -> Result<Settings, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name(name).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge(Settings::default());
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.auth.enabled && settings.auth.secret.as_deref().is_none_or(str::is_empty) {
        return Err(ConfigError::Message(
            "auth.enabled requires auth.secret".to_string(),
        ));
    }
    if settings.hub.keepalive_interval_secs == 0 {
        return Err(ConfigError::Message(
            "hub.keepalive_interval_secs must be at least 1".to_string(),
        ));
    }
    if settings.bus.initial_backoff_ms == 0 {
        return Err(ConfigError::Message(
            "bus.initial_backoff_ms must be at least 1".to_string(),
        ));
    }
    if settings.hub.keepalive_timeout_secs <= settings.hub.keepalive_interval_secs {
        return Err(ConfigError::Message(
            "hub.keepalive_timeout_secs must exceed hub.keepalive_interval_secs".to_string(),
        ));
    }
    Ok(())
}
