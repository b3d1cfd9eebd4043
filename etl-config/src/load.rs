use std::path::Path;

use serde::de::DeserializeOwned;

use crate::environment::Environment;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Configuration file loaded for every environment.
const BASE_CONFIG_FILE: &str = "base.yaml";

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested keys, `APP_BATCH__MAX_ROWS` sets `batch.max_rows`.
const ENV_SEPARATOR: &str = "__";

const LIST_SEPARATOR: &str = ",";

/// Keys of a configuration type that must be parsed as comma separated lists when they come
/// from environment variables.
pub trait Config {
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Loads configuration from `./configuration` for the environment named by `APP_ENVIRONMENT`.
///
/// # Panics
/// Panics if the current directory cannot be determined or `APP_ENVIRONMENT` is invalid.
pub fn load_config<T>() -> Result<T, config::ConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let environment = Environment::load().expect("Failed to parse APP_ENVIRONMENT.");

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Loads configuration from `directory` in three layers, each overriding the previous one:
///
/// 1. `base.yaml`
/// 2. `{environment}.yaml`
/// 3. environment variables prefixed with `APP_`
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, config::ConfigError>
where
    T: Config + DeserializeOwned,
{
    let mut environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !<T as Config>::LIST_PARSE_KEYS.is_empty() {
        environment_source = environment_source
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);

        for key in <T as Config>::LIST_PARSE_KEYS {
            environment_source = environment_source.with_list_parse_key(key);
        }
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(directory.join(BASE_CONFIG_FILE)))
        .add_source(config::File::from(
            directory.join(format!("{environment}.yaml")),
        ))
        .add_source(environment_source)
        .build()?;

    settings.try_deserialize::<T>()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::shared::CopyConfig;

    #[test]
    fn environment_file_overrides_base_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("base.yaml"),
            "keyspace: commerce\nshard: \"-80\"\nmax_replication_lag_secs: 10\nbatch:\n  max_rows: 1000\n  max_bytes: 262144\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("dev.yaml"),
            "catchup_retry_ms: 250\nemit_copy_markers: true\n",
        )
        .unwrap();

        let config: CopyConfig = load_config_from(dir.path(), Environment::Dev).unwrap();

        assert_eq!(config.keyspace, "commerce");
        assert_eq!(config.shard, "-80");
        assert_eq!(config.catchup_retry_ms, 250);
        assert_eq!(config.max_replication_lag_secs, 10);
        assert_eq!(config.batch.max_rows, 1000);
        assert!(config.emit_copy_markers);
        config.validate().unwrap();
    }

    #[test]
    fn missing_environment_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("base.yaml"), "keyspace: commerce\n").unwrap();

        let result: Result<CopyConfig, _> = load_config_from(dir.path(), Environment::Staging);

        assert!(result.is_err());
    }
}
