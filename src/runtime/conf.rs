use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

use crate::{collector::CollectorOptions, health::ApiOptions, metrics::opts::MetricsOptions};

use super::cli::Cli;

/// Aggregate configuration, assembled with the priority order
/// defaults < configuration file < environment variables < CLI arguments.
///
/// Unlike most long-running collectors, the configuration file is optional:
/// the service runs with nothing but an externally supplied listen port.
#[derive(Debug, Deserialize, Serialize)]
pub struct Conf {
    /// Path of the configuration file the values were read from, if any.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// The logging level for the application.
    #[serde(with = "super::serde_level")]
    pub log_level: Level,

    /// Connection-table locations.
    #[serde(default)]
    pub tables: CollectorOptions,

    /// Configuration for the Metrics server (Prometheus scraping).
    #[serde(default)]
    pub metrics: MetricsOptions,

    /// Configuration for the API server (health endpoints).
    #[serde(default)]
    pub api: ApiOptions,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            config_path: None,
            log_level: Level::INFO,
            tables: CollectorOptions::default(),
            metrics: MetricsOptions::default(),
            api: ApiOptions::default(),
        }
    }
}

impl Conf {
    /// Assemble the configuration from CLI arguments, environment
    /// variables, and the optional YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfError`] when extraction of the merged configuration
    /// fails (malformed file, type mismatches).
    pub fn new(cli: &Cli) -> Result<Self, ConfError> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(cli))
            .join(Env::prefixed("SOCKMON_"));

        if let Some(config_path) = &cli.config {
            // The file ranks below environment and CLI values; section
            // defaults fill whatever nobody set.
            figment = figment.join(Yaml::file(config_path));
        }

        let mut conf: Conf = figment.extract()?;
        conf.config_path = cli.config.clone();
        if let Some(port) = cli.port {
            conf.metrics.port = port;
        }
        Ok(conf)
    }
}

#[derive(Debug, Error)]
pub enum ConfError {
    #[error("configuration error: {0}")]
    Extraction(#[from] figment::Error),
}
