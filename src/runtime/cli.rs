use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::Level;

#[derive(Parser, Debug, Serialize, Deserialize)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Set the path to the configuration file (e.g., "sockmon.yaml").
    #[arg(short, long, value_name = "FILE", env = "SOCKMON_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Port for the Prometheus exposition endpoint; overrides the
    /// configuration file.
    #[arg(short, long, value_name = "PORT", env = "SOCKMON_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Set the application's log level (e.g., "debug", "warn").
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        env = "SOCKMON_LOG_LEVEL",
        default_value = "info"
    )]
    #[serde(with = "crate::runtime::serde_level")]
    pub log_level: Level,
}

#[cfg(test)]
mod tests {
    use std::{env, path::PathBuf};

    use clap::Parser as _;
    use serial_test::serial;
    use tracing::Level;

    use super::Cli;

    fn clear_env_vars() {
        // This helper ensures a clean slate before each test.
        unsafe {
            env::remove_var("SOCKMON_CONFIG_PATH");
            env::remove_var("SOCKMON_PORT");
            env::remove_var("SOCKMON_LOG_LEVEL");
        }
    }

    #[test]
    #[serial]
    fn parses_long_flags() {
        clear_env_vars();

        unsafe {
            // ensures that CLI args override env vars
            env::set_var("SOCKMON_CONFIG_PATH", "/tmp/sockmon.yaml");
            env::set_var("SOCKMON_PORT", "9999");
            env::set_var("SOCKMON_LOG_LEVEL", "debug");
        }

        let args = [
            "sockmon",
            "--config",
            "/path/to/conf.yaml",
            "--port",
            "9200",
            "--log-level",
            "warn",
        ];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/conf.yaml")));
        assert_eq!(cli.port, Some(9200));
        assert_eq!(cli.log_level, Level::WARN);
    }

    #[test]
    #[serial]
    fn parses_from_env_when_no_args() {
        clear_env_vars();

        unsafe {
            env::set_var("SOCKMON_CONFIG_PATH", "/tmp/sockmon.yaml");
            env::set_var("SOCKMON_PORT", "9200");
            env::set_var("SOCKMON_LOG_LEVEL", "debug");
        }

        let cli = Cli::parse_from(["sockmon"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/sockmon.yaml")));
        assert_eq!(cli.port, Some(9200));
        assert_eq!(cli.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn default_log_level_is_info() {
        clear_env_vars();
        let cli = Cli::parse_from(["sockmon"]);
        assert_eq!(cli.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn port_defaults_to_unset() {
        clear_env_vars();
        let cli = Cli::parse_from(["sockmon"]);
        assert_eq!(cli.port, None);
    }
}
