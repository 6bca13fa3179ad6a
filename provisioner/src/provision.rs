use image_ref::ImageRefError;
use platform::{
    Build, BuildState, EnvironmentProvider, PlatformConfig, PlatformError, SoftwareEnvironment,
    SoftwareEnvironmentSpec,
};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Invalid container reference: {0}")]
    InvalidContainer(#[from] ImageRefError),

    #[error("Invalid environment request: {message}")]
    InvalidRequest { message: String },

    #[error("Build of software environment '{name}' failed: {reason}")]
    BuildFailed { name: String, reason: String },

    #[error("Build of software environment '{name}' did not finish within {waited:?}")]
    BuildTimedOut { name: String, waited: Duration },
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// How long to follow a remote build after it has been requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub build_timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::from(&PlatformConfig::default())
    }
}

impl From<&PlatformConfig> for WaitOptions {
    fn from(config: &PlatformConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            build_timeout: config.build_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    pub environment: SoftwareEnvironment,
    /// Final build; `None` when the platform reused an existing one
    pub build: Option<Build>,
    pub waited: Duration,
}

impl ProvisionOutcome {
    pub fn summary(&self) -> String {
        match &self.build {
            Some(build) => format!(
                "Software environment '{}' {} (build {}, {:.0?})",
                self.environment.name, build.state, build.id, self.waited
            ),
            None => format!(
                "Software environment '{}' is up to date",
                self.environment.name
            ),
        }
    }
}

/// Request the environment once, then follow its build to completion.
///
/// The create call is never repeated: a failure is returned as is and only
/// the build status is polled afterwards.
pub async fn provision(
    provider: &dyn EnvironmentProvider,
    spec: &SoftwareEnvironmentSpec,
    wait: &WaitOptions,
) -> ProvisionResult<ProvisionOutcome> {
    spec.validate()
        .map_err(|message| ProvisionError::InvalidRequest { message })?;

    info!(
        "Provisioning software environment '{}' on {} (container: {}, force_rebuild: {})",
        spec.name,
        provider.provider_name(),
        spec.container,
        spec.force_rebuild
    );

    let started = Instant::now();
    let environment = provider.create_or_update_environment(spec).await?;

    let build = match environment.build.clone() {
        Some(build) => Some(wait_for_build(provider, &environment.name, build, wait).await?),
        None => None,
    };

    Ok(ProvisionOutcome {
        environment,
        build,
        waited: started.elapsed(),
    })
}

async fn wait_for_build(
    provider: &dyn EnvironmentProvider,
    name: &str,
    mut build: Build,
    wait: &WaitOptions,
) -> ProvisionResult<Build> {
    let deadline = Instant::now() + wait.build_timeout;

    loop {
        match &build.state {
            BuildState::Built => {
                info!("Build {} of '{}' finished", build.id, name);
                return Ok(build);
            }
            BuildState::Error => {
                return Err(ProvisionError::BuildFailed {
                    name: name.to_string(),
                    reason: build
                        .reason
                        .unwrap_or_else(|| "no reason reported".to_string()),
                });
            }
            BuildState::Unknown(state) => {
                warn!("Build {} of '{}' reported unknown state '{}'", build.id, name, state)
            }
            BuildState::Queued | BuildState::Building => {
                debug!("Build {} of '{}' is {}", build.id, name, build.state)
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(ProvisionError::BuildTimedOut {
                name: name.to_string(),
                waited: wait.build_timeout,
            });
        }

        sleep(wait.poll_interval.min(deadline - now)).await;
        build = provider.build_status(build.id).await?;
    }
}
