//! Turning a provisioning result into the operator-facing line and exit status.

use crate::provision::{ProvisionOutcome, ProvisionResult};
use std::io::Write;
use tracing::{error, info};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Write the one-line result (success to `out`, failure to `err`) and
/// return the process exit status.
pub fn report(
    result: &ProvisionResult<ProvisionOutcome>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> u8 {
    match result {
        Ok(outcome) => {
            // Nothing left to tell the operator if stdout is gone
            let _ = writeln!(out, "✓ {}", outcome.summary());
            info!("Provisioning finished in {:?}", outcome.waited);
            EXIT_SUCCESS
        }
        Err(e) => {
            let _ = writeln!(err, "✗ {}", e);
            error!("Provisioning failed: {}", e);
            EXIT_FAILURE
        }
    }
}
