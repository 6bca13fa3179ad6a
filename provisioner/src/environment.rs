use crate::provision::ProvisionResult;
use image_ref::ImageReference;
use platform::SoftwareEnvironmentSpec;

pub const ENV_NAME: &str = "cng-workshop";
pub const CONTAINER: &str = "public.ecr.aws/q2i2x3t4/e84-sandbox/coiled-demo";
pub const FORCE_REBUILD: bool = true;

/// The one environment this tool provisions
pub fn workshop_environment() -> ProvisionResult<SoftwareEnvironmentSpec> {
    let container = ImageReference::parse(CONTAINER)?;
    Ok(SoftwareEnvironmentSpec::new(ENV_NAME, container).with_force_rebuild(FORCE_REBUILD))
}
