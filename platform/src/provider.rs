use crate::types::{Build, SoftwareEnvironment, SoftwareEnvironmentSpec};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("No API token configured. Set DASK_COILED__TOKEN or add `coiled.token` to {path}")]
    MissingCredentials { path: String },

    #[error("Cannot read config file {}: {message}", path.display())]
    ConfigFile { path: PathBuf, message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    Authentication,

    #[error("Platform API error ({status}): {message}")]
    Api { status: u16, message: String },
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// A remote platform that can build named software environments
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    /// Register the environment and start its build
    async fn create_or_update_environment(
        &self,
        spec: &SoftwareEnvironmentSpec,
    ) -> PlatformResult<SoftwareEnvironment>;

    async fn build_status(&self, build_id: u64) -> PlatformResult<Build>;

    async fn health_check(&self) -> PlatformResult<()>;

    fn provider_name(&self) -> &'static str;
}
