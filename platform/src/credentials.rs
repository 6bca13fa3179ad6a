//! Layered credential loading.
//!
//! Settings are resolved the way the platform's own tooling resolves them:
//! built-in defaults, then the `coiled` section of the dask YAML config,
//! then `DASK_COILED__*` environment variables.

use crate::config::PlatformConfig;
use crate::provider::{PlatformError, PlatformResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_SERVER: &str = "DASK_COILED__SERVER";
pub const ENV_TOKEN: &str = "DASK_COILED__TOKEN";
pub const ENV_ACCOUNT: &str = "DASK_COILED__ACCOUNT";
/// Overrides the dask config directory
pub const ENV_CONFIG_DIR: &str = "DASK_CONFIG";

const CONFIG_FILE_NAME: &str = "coiled.yaml";
const DEFAULT_CONFIG_HINT: &str = "~/.config/dask/coiled.yaml";

#[derive(Debug, Default, Deserialize)]
struct DaskConfigFile {
    #[serde(default)]
    coiled: Option<CoiledSection>,
}

#[derive(Debug, Default, Deserialize)]
struct CoiledSection {
    server: Option<String>,
    token: Option<String>,
    account: Option<String>,
}

/// Location of the YAML config file, whether or not it exists
pub fn config_file_path<F>(env: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = non_empty(env(ENV_CONFIG_DIR)) {
        return Some(PathBuf::from(dir).join(CONFIG_FILE_NAME));
    }
    dirs::home_dir().map(|home| home.join(".config").join("dask").join(CONFIG_FILE_NAME))
}

impl PlatformConfig {
    /// Load settings from the process environment and the default config file
    pub fn from_environment() -> PlatformResult<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    pub fn load_with<F>(env: F) -> PlatformResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = config_file_path(&env);
        Self::load_from(path.as_deref(), env)
    }

    /// Defaults, then `path` if it exists, then environment variables
    pub fn load_from<F>(path: Option<&Path>, env: F) -> PlatformResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = PlatformConfig::default();

        if let Some(path) = path {
            config.apply_file(path)?;
        }

        if let Some(server) = non_empty(env(ENV_SERVER)) {
            config.server = server;
        }
        if let Some(token) = non_empty(env(ENV_TOKEN)) {
            config.token = Some(token);
        }
        if let Some(account) = non_empty(env(ENV_ACCOUNT)) {
            config.account = Some(account);
        }

        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> PlatformResult<()> {
        if !path.exists() {
            debug!("No platform config at {}", path.display());
            return Ok(());
        }

        let content = std::fs::read_to_string(path).map_err(|e| PlatformError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if content.trim().is_empty() {
            return Ok(());
        }

        let file: DaskConfigFile =
            serde_yaml::from_str(&content).map_err(|e| PlatformError::ConfigFile {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        debug!("Loaded platform config from {}", path.display());

        if let Some(section) = file.coiled {
            if let Some(server) = non_empty(section.server) {
                self.server = server;
            }
            if let Some(token) = non_empty(section.token) {
                self.token = Some(token);
            }
            if let Some(account) = non_empty(section.account) {
                self.account = Some(account);
            }
        }

        Ok(())
    }

    /// The API token, or an error telling the operator where to put one
    pub fn require_token(&self) -> PlatformResult<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| PlatformError::MissingCredentials {
                path: DEFAULT_CONFIG_HINT.to_string(),
            })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
