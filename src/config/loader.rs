use anyhow::Result;
use config::{Config, Environment, File};
use std::path::Path;
use tracing::{debug, info};

use super::runtime::ForecastConfig;
use crate::error::ForecastError;

/// Environment overrides look like `FORECAST__MODEL__EPOCHS=50`
pub const ENV_PREFIX: &str = "FORECAST";

impl ForecastConfig {
    /// Defaults, then the TOML file if present, then `FORECAST__*` env vars
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_prefix(path.as_ref(), ENV_PREFIX)
    }

    fn load_with_prefix(path: &Path, env_prefix: &str) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
        }

        let settings = Config::builder()
            .add_source(Config::try_from(&ForecastConfig::default())?)
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    // FORECAST__MODEL__HIDDEN_LAYERS=64,128,32
                    .list_separator(",")
                    .with_list_parse_key("model.hidden_layers"),
            )
            .build()?;

        let config: ForecastConfig = settings.try_deserialize()?;
        config.validate().map_err(ForecastError::InvalidConfig)?;

        info!(
            "Loaded config: layers={:?}, epochs={}, z-score={}",
            config.model.hidden_layers, config.model.epochs, config.filter.z_score_threshold
        );
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterField;
    use std::io::Write;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = ForecastConfig::load("does-not-exist.toml").unwrap();
        assert_eq!(config.model.hidden_layers, vec![64, 128, 32]);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("forecast-config-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[model]\nepochs = 5\nseed = 7\n\n[filter]\nfield = \"predict_close\"").unwrap();

        let config = ForecastConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.model.epochs, 5);
        assert_eq!(config.model.seed, Some(7));
        assert_eq!(config.model.batch_size, 32);
        assert_eq!(config.filter.field, FilterField::PredictClose);
    }

    #[test]
    fn test_to_toml_round_trips() {
        let rendered = ForecastConfig::default().to_toml().unwrap();
        let parsed: ForecastConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.model.epochs, 100);
    }

    #[test]
    fn test_invalid_file_reports_every_problem() {
        let path = std::env::temp_dir().join(format!("forecast-invalid-{}.toml", std::process::id()));
        std::fs::write(&path, "[model]\nepochs = 0\nbatch_size = 0\n").unwrap();

        let err = ForecastConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        match err.downcast_ref::<ForecastError>() {
            Some(ForecastError::InvalidConfig(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides_scalars_and_lists() {
        std::env::set_var("FORECAST_LOADER_TEST__MODEL__EPOCHS", "7");
        std::env::set_var("FORECAST_LOADER_TEST__MODEL__HIDDEN_LAYERS", "16,8");

        let config = ForecastConfig::load_with_prefix(Path::new("does-not-exist.toml"), "FORECAST_LOADER_TEST");
        std::env::remove_var("FORECAST_LOADER_TEST__MODEL__EPOCHS");
        std::env::remove_var("FORECAST_LOADER_TEST__MODEL__HIDDEN_LAYERS");

        let config = config.unwrap();
        assert_eq!(config.model.epochs, 7);
        assert_eq!(config.model.hidden_layers, vec![16, 8]);
        assert_eq!(config.model.batch_size, 32);
    }
}
