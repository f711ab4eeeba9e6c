//! Hosting utilities command line entry point

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hosting_utilities::cli::{BackupSiteArgs, Cli, Commands};
use hosting_utilities::config::LogFormat;
use hosting_utilities::{build_provider, BackupOptions, BackupService, Config, Error};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // stdout may carry data, so logs go to stderr
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }

    let result = match cli.command {
        Commands::BackupSite(args) => backup_site(config, args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(err) = e.downcast_ref::<Error>() {
                error!(code = err.code(), kind = err.kind().as_str(), "{}", err);
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn backup_site(mut config: Config, args: BackupSiteArgs) -> anyhow::Result<()> {
    if let Some(timeout) = args.timeout {
        config.prompt_timeout_secs = timeout;
    }

    info!("Starting backup of site {}", args.site_name);
    let provider = build_provider(&config, &args.site_name, &args.vault_selection()).await?;
    let service = BackupService::new(provider, BackupOptions::from(&config));

    service.run_backup(&args.site_name).await?;
    Ok(())
}
