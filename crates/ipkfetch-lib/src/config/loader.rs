use super::Config;
use crate::error::IpkFetchError;
use config::Config as ConfigBuilder;

const ENV_PREFIX: &str = "IPKFETCH";

pub fn load_config(config_path: &str) -> Result<Config, IpkFetchError> {
    let config_builder = ConfigBuilder::builder()
        .add_source(config::File::with_name(config_path))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let config: Config = config_builder.try_deserialize()?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), IpkFetchError> {
    if config.download.parallelism == 0 {
        return Err(IpkFetchError::ConfigValidation {
            details: "download.parallelism must be greater than 0".to_string(),
        });
    }
    if config.repository.cannot_be_a_base() {
        return Err(IpkFetchError::ConfigValidation {
            details: format!("repository {} is not a base URL", config.repository),
        });
    }
    Ok(())
}
