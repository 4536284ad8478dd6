//! Runtime configuration and git credentials.
//!
//! Resolution order: built-in defaults, then the YAML config file, then
//! explicit overrides (CLI flags). Every field in the file is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};
use crate::paths;
use crate::types::RepoAlias;

pub const DEFAULT_ADMIN_API_ENDPOINT: &str = "127.0.0.1:9650/ext/admin";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

pub const CORE_ALIAS: &str = "ava-labs/avalanche-plugins-core";
pub const CORE_URL: &str = "https://github.com/ava-labs/avalanche-plugins-core.git";
pub const CORE_BRANCH: &str = "master";

/// The repository every installation tracks and may not remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub alias: RepoAlias,
    pub url: String,
    pub branch: String,
}

impl RepositoryConfig {
    pub fn core() -> Result<Self, CoreError> {
        Ok(Self {
            alias: CORE_ALIAS.parse()?,
            url: CORE_URL.to_owned(),
            branch: CORE_BRANCH.to_owned(),
        })
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Root of plugman's own state: database, working trees, downloads.
    pub directory: PathBuf,
    /// Where installed VM binaries are placed.
    pub plugin_dir: PathBuf,
    pub credentials_file: Option<PathBuf>,
    pub admin_api_endpoint: String,
    pub http_timeout_secs: u64,
    pub default_repository: RepositoryConfig,
}

/// On-disk shape of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ConfigFile {
    directory: Option<PathBuf>,
    plugin_dir: Option<PathBuf>,
    credentials_file: Option<PathBuf>,
    admin_api_endpoint: Option<String>,
    http_timeout_secs: Option<u64>,
    default_repository: Option<RepositoryConfig>,
}

/// Values that take precedence over both defaults and the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub directory: Option<PathBuf>,
    pub plugin_dir: Option<PathBuf>,
    pub credentials_file: Option<PathBuf>,
    pub admin_api_endpoint: Option<String>,
}

impl Config {
    /// Defaults rooted at `home`.
    pub fn default_at(home: &Path) -> Result<Self, CoreError> {
        Ok(Self {
            directory: paths::plugman_root(home),
            plugin_dir: paths::default_plugin_dir(home),
            credentials_file: None,
            admin_api_endpoint: DEFAULT_ADMIN_API_ENDPOINT.to_owned(),
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            default_repository: RepositoryConfig::core()?,
        })
    }

    /// Resolve configuration for the current user.
    pub fn load(config_file: Option<&Path>, overrides: Overrides) -> Result<Self, CoreError> {
        let home = dirs::home_dir().ok_or(CoreError::HomeNotFound)?;
        Self::load_at(&home, config_file, overrides)
    }

    /// Like [`Config::load`] with an explicit home directory.
    ///
    /// With no explicit `config_file`, `<home>/.plugman/config.yaml` is read
    /// if it exists.
    pub fn load_at(
        home: &Path,
        config_file: Option<&Path>,
        overrides: Overrides,
    ) -> Result<Self, CoreError> {
        let mut config = Self::default_at(home)?;

        let file = match config_file {
            Some(path) => Some(read_config_file(path)?),
            None => {
                let path = paths::default_config_path(home);
                if path.exists() {
                    Some(read_config_file(&path)?)
                } else {
                    None
                }
            }
        };
        if let Some(file) = file {
            config.apply_file(file);
        }
        config.apply_overrides(overrides);

        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        if let Some(directory) = file.directory {
            self.directory = directory;
        }
        if let Some(plugin_dir) = file.plugin_dir {
            self.plugin_dir = plugin_dir;
        }
        if file.credentials_file.is_some() {
            self.credentials_file = file.credentials_file;
        }
        if let Some(endpoint) = file.admin_api_endpoint {
            self.admin_api_endpoint = endpoint;
        }
        if let Some(timeout) = file.http_timeout_secs {
            self.http_timeout_secs = timeout;
        }
        if let Some(repository) = file.default_repository {
            self.default_repository = repository;
        }
    }

    fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(directory) = overrides.directory {
            self.directory = directory;
        }
        if let Some(plugin_dir) = overrides.plugin_dir {
            self.plugin_dir = plugin_dir;
        }
        if overrides.credentials_file.is_some() {
            self.credentials_file = overrides.credentials_file;
        }
        if let Some(endpoint) = overrides.admin_api_endpoint {
            self.admin_api_endpoint = endpoint;
        }
    }

    pub fn db_dir(&self) -> PathBuf {
        paths::db_dir(&self.directory)
    }

    pub fn repositories_dir(&self) -> PathBuf {
        paths::repositories_dir(&self.directory)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        paths::tmp_dir(&self.directory)
    }

    /// Load git credentials from `credentials_file`, if one is configured.
    pub fn credentials(&self) -> Result<Option<Credentials>, CoreError> {
        self.credentials_file
            .as_deref()
            .map(Credentials::load)
            .transpose()
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, CoreError> {
    let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&content).map_err(|source| CoreError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Basic-auth credentials for private repositories. A personal access token
/// goes in `password`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        serde_yaml::from_str(&content).map_err(|source| CoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
