mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    BrokerSettings, LogSettings, ServerSettings, SessionSettings, Settings,
};

/// Prefix of environment overrides, e.g. `CHATBUS__SERVER__PORT=4000`.
pub const ENV_PREFIX: &str = "CHATBUS";

/// Loads the configuration from `config/default.*`, a `.env` file and
/// `CHATBUS__*` environment variables, in increasing order of precedence,
/// and merges the result over `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let _ = dotenvy::dotenv();

    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
