use clap::Parser;
use platform::prelude::*;
use provisioner::{
    provision, report, workshop_environment, ProvisionOutcome, ProvisionResult, WaitOptions,
};
use std::io;
use std::process::ExitCode;

/// Session settings come from `DASK_COILED__*` or the dask config file
#[derive(Parser)]
#[command(name = "create-software-env", version)]
#[command(about = "Create or rebuild the cng-workshop software environment")]
struct Cli {}

async fn provision_workshop() -> ProvisionResult<ProvisionOutcome> {
    let config = PlatformConfig::from_environment()?;
    let wait = WaitOptions::from(&config);
    let provider = CoiledProvider::new(config)?;
    let spec = workshop_environment()?;

    provision(&provider, &spec, &wait).await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    Cli::parse();

    let result = provision_workshop().await;
    ExitCode::from(report(&result, &mut io::stdout(), &mut io::stderr()))
}
