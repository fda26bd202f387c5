//! Configuration.
//!
//! Values are layered, later sources overriding earlier ones:
//!
//! 1. built-in defaults,
//! 2. a TOML or YAML file (picked by extension),
//! 3. environment variables prefixed `DFIND_`, with `__` separating nested
//!    keys (`DFIND_SCAN__FOLLOW_SYMLINKS=true`).
//!
//! The result is an ordinary value passed into the constructors that need it.

pub mod error;

use crate::error::{ErrorKind, Result};
use dfind_scan::ScanOptions;
use dfind_storage::driver::DATABASE_FILENAME;
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "DFIND_";
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the database
    pub data_dir: PathBuf,
    pub verbose: bool,
    pub scan: ScanOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            verbose: false,
            scan: ScanOptions::default(),
        }
    }
}

impl Config {
    /// Load from the default locations: the platform config file (if there
    /// is one) and the environment.
    pub fn load() -> Result<Self> {
        let file = default_config_path().filter(|path| path.is_file());
        Self::extract(layered(file.as_deref(), ENV_PREFIX))
    }

    /// Load with an explicit configuration file, which must exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::Missing(path.to_path_buf()));
        }
        Self::extract(layered(Some(path), ENV_PREFIX))
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("data_dir"));
        }
        if self.scan.capacity == 0 {
            exn::bail!(ErrorKind::Invalid("scan.capacity"));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILENAME)
    }
}

fn layered(file: Option<&Path>, env_prefix: &str) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(path) = file {
        tracing::debug!(path = %path.display(), "Loading configuration file");
        figment = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            _ => figment.merge(Toml::file(path)),
        };
    }
    figment.merge(Env::prefixed(env_prefix).split("__"))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "dfind")
}

/// Platform data directory, or a directory under the system temp dir when
/// there is no home directory to put it in.
pub fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("dfind"))
}

pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}
