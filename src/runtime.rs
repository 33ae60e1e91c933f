//! Process runtime: CLI parsing and configuration assembly.

use clap::Parser;
use thiserror::Error;

use crate::runtime::{
    cli::Cli,
    conf::{Conf, ConfError},
};

pub mod cli;
pub mod conf;
pub mod serde_level;

pub struct Runtime {
    pub cli: Cli,
    pub conf: Conf,
}

impl Runtime {
    /// Parse the CLI and assemble the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when configuration extraction fails.
    pub fn new() -> Result<Self, RuntimeError> {
        let cli = Cli::parse();
        let conf = Conf::new(&cli)?;
        Ok(Runtime { cli, conf })
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Conf(#[from] ConfError),
}
