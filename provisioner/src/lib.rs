pub mod environment;
pub mod provision;
pub mod report;

pub use environment::{workshop_environment, CONTAINER, ENV_NAME, FORCE_REBUILD};
pub use provision::{provision, ProvisionError, ProvisionOutcome, ProvisionResult, WaitOptions};
pub use report::{report, EXIT_FAILURE, EXIT_SUCCESS};
