use crate::error::AppError;
use config::{Config as Cfg, Environment as EnvSource, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Deployment environment. Controls whether raw error causes reach clients.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Load a service configuration from an optional `configuration` file and
/// `<PREFIX>__SECTION__KEY` environment variables.
pub fn load<T: DeserializeOwned>(env_prefix: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(
            EnvSource::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(config.try_deserialize()?)
}
