//! Layered configuration loading.
//!
//! Sources, later overriding earlier:
//!  1. `/etc/contentful-bridge/service.yaml`
//!  2. `./config/service.yaml`
//!  3. The file named by `CB_CONFIG_FILE` (required when set)
//!  4. Environment variables prefixed `CB__` with `__` between keys,
//!     e.g. `CB__ANALYTICS__DATASET_ID=contentful`

use contentful_bridge_api::ServiceConfig;

#[cfg(test)]
#[path = "config_loader_tests.rs"]
mod tests;

/// Variable naming an operator-supplied configuration file
pub const CONFIG_FILE_VAR: &str = "CB_CONFIG_FILE";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "CB";

/// Operator-supplied configuration file, if `CB_CONFIG_FILE` is set and non-empty
pub fn explicit_config_path() -> Option<String> {
    std::env::var(CONFIG_FILE_VAR).ok().filter(|p| !p.is_empty())
}

/// Load configuration, reading the explicit file path from the environment
pub fn load_config() -> Result<ServiceConfig, config::ConfigError> {
    load_config_from(explicit_config_path().as_deref())
}

/// Load configuration with an optional explicit file
///
/// Missing default files are skipped. A malformed file, a missing explicit
/// file, or a value of the wrong type is an error.
pub fn load_config_from(explicit_path: Option<&str>) -> Result<ServiceConfig, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/contentful-bridge/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()
}
