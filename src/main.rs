use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use sample_migration_verifier::{
    AsyncHttpClient, Cli, ConfigError, ConfigManager, ErrorReporter, MigrationError, MigrationRun,
    Output, RunContext, VerbosityLevel,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    let reporter = ErrorReporter::new(cli.verbosity());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if let Some(config_error) = error.downcast_ref::<ConfigError>() {
                reporter.report_config_error(config_error);
                ExitCode::from(2)
            } else if let Some(migration_error) = error.downcast_ref::<MigrationError>() {
                reporter.report_error(migration_error);
                ExitCode::from(1)
            } else {
                eprintln!("Error: {:#}", error);
                ExitCode::from(1)
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    cli.validate().map_err(ConfigError::Validation)?;
    let config = ConfigManager::load_config(&cli).await?;

    let verbosity = VerbosityLevel::from_flags(config.output.verbose, config.output.quiet);
    init_tracing(verbosity);

    let client = AsyncHttpClient::new(config.http_client_config())?;
    let context = RunContext::from_config(&config, Arc::new(client)).await?;
    let run = MigrationRun::new(context);

    let summary = run.run().await?;

    let rendered = Output::new(config.output.format, verbosity)
        .render(&summary)
        .context("Failed to render the run summary")?;
    print!("{}", rendered);
    if !rendered.is_empty() && !rendered.ends_with('\n') {
        println!();
    }

    Ok(())
}

fn init_tracing(verbosity: VerbosityLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
