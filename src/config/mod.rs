mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    ClientSettings, LogSettings, PartialSettings, ServerSettings, Settings, SourceSettings,
    StreamSettings, VariantSettings,
};

/// Default configuration file, relative to the working directory. Any format
/// the `config` crate understands works (`config/default.toml`, `.yaml`, ...).
pub const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Environment variables override the file, e.g.
/// `POLLCAST__STREAM__POLL_INTERVAL_SECS=5`.
pub const ENV_PREFIX: &str = "POLLCAST";

/// Loads the configuration from the default file and environment variables.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

/// Like [`load_config`] but reads the given file (which may be absent).
/// Values missing from every source keep their defaults.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("variants.hidden_fields")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge(Settings::default()))
}

#[cfg(test)]
mod tests;
