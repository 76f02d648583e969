//! CLI command implementations.

pub mod check;
pub mod history;
pub mod init;
pub mod status;

use memogarden_core::{Config, Coordinator, ENV_CORE_DB, ENV_SOIL_DB};
use std::error::Error;
use std::path::PathBuf;
use std::str::FromStr;

/// Store locations from flags layered over the environment.
#[derive(Debug, Clone)]
pub struct StorePaths {
    config: Config,
}

impl StorePaths {
    /// Applies `--soil`/`--core` over `MEMOGARDEN_*` variables.
    pub fn resolve(
        soil: Option<PathBuf>,
        core: Option<PathBuf>,
    ) -> Result<Self, Box<dyn Error>> {
        let mut config = Config::from_env()?;
        if let Some(path) = soil {
            config = config.soil_path(path);
        }
        if let Some(path) = core {
            config = config.core_path(path);
        }
        Ok(Self { config })
    }

    /// Opens the coordinator, which runs the startup consistency check.
    ///
    /// Missing files are created only when `create` is set.
    pub fn open(&self, create: bool) -> Result<Coordinator, Box<dyn Error>> {
        if self.config.soil.path().is_none() {
            return Err(format!("Soil database path required (--soil or {ENV_SOIL_DB})").into());
        }
        if self.config.core.path().is_none() {
            return Err(format!("Core database path required (--core or {ENV_CORE_DB})").into());
        }
        let config = self.config.clone().create_if_missing(create);
        Ok(Coordinator::open(config)?)
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable lines.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("Unknown format {other:?}; expected text or json")),
        }
    }
}
