pub mod coiled;
pub mod config;
pub mod credentials;
pub mod provider;
pub mod types;

pub use coiled::CoiledProvider;
pub use config::{PlatformConfig, DEFAULT_SERVER};
pub use credentials::{config_file_path, ENV_ACCOUNT, ENV_CONFIG_DIR, ENV_SERVER, ENV_TOKEN};
pub use image_ref::{ImageRefError, ImageReference};
pub use provider::{EnvironmentProvider, PlatformError, PlatformResult};
pub use types::{Build, BuildState, SoftwareEnvironment, SoftwareEnvironmentSpec, UserInfo};

pub mod prelude {
    pub use crate::coiled::*;
    pub use crate::config::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}
