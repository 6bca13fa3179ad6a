use image_ref::ImageReference;
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_NAME_LEN: usize = 128;

/// What to build: the environment name, its backing image and whether an
/// existing build must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareEnvironmentSpec {
    pub name: String,
    pub container: ImageReference,
    pub force_rebuild: bool,
}

impl SoftwareEnvironmentSpec {
    pub fn new(name: impl Into<String>, container: ImageReference) -> Self {
        Self {
            name: name.into(),
            container,
            force_rebuild: false,
        }
    }

    pub fn with_force_rebuild(mut self, force_rebuild: bool) -> Self {
        self.force_rebuild = force_rebuild;
        self
    }

    /// Environment names are lowercase alphanumerics and dashes, with no
    /// leading or trailing dash.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Environment name cannot be empty".to_string());
        }

        if self.name.len() > MAX_NAME_LEN {
            return Err(format!(
                "Environment name cannot exceed {} characters",
                MAX_NAME_LEN
            ));
        }

        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(format!(
                "Environment name '{}' may only contain lowercase letters, digits and '-'",
                self.name
            ));
        }

        if self.name.starts_with('-') || self.name.ends_with('-') {
            return Err(format!(
                "Environment name '{}' cannot start or end with '-'",
                self.name
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuildState {
    Queued,
    Building,
    Built,
    Error,
    Unknown(String),
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Built | BuildState::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            BuildState::Queued => "queued",
            BuildState::Building => "building",
            BuildState::Built => "built",
            BuildState::Error => "error",
            BuildState::Unknown(state) => state,
        }
    }
}

impl From<String> for BuildState {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "queued" | "pending" => BuildState::Queued,
            "building" | "started" => BuildState::Building,
            "built" | "success" => BuildState::Built,
            "error" | "failed" => BuildState::Error,
            _ => BuildState::Unknown(value),
        }
    }
}

impl From<BuildState> for String {
    fn from(value: BuildState) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: u64,
    pub state: BuildState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A software environment as registered on the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareEnvironment {
    pub id: u64,
    pub name: String,
    /// Absent when the platform reused an existing build
    #[serde(default, rename = "latest_build")]
    pub build: Option<Build>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    #[serde(default)]
    pub default_account: Option<String>,
}

impl UserInfo {
    /// The account environments are created under when none is configured
    pub fn account(&self) -> &str {
        self.default_account.as_deref().unwrap_or(&self.username)
    }
}
