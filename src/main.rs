use clap::Parser;
use stakekeys::cli::Cli;
use stakekeys::cli::Commands;
use stakekeys::AppConfig;
use stakekeys::Result;
use stakekeys::StakeKeys;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;

    if cli.verbose {
        stakekeys::logging::init_logging_with_level("debug")?;
    } else {
        stakekeys::logging::init_logging_with_config(&config)?;
    }
    tracing::debug!("Configuration loaded successfully");

    // Printing the configuration never touches the database
    if matches!(cli.command, Commands::Config) {
        stakekeys::cli::handle_config_command(&config);
        return Ok(());
    }

    let stakekeys = StakeKeys::new(&config).await?;

    match cli.command {
        Commands::Init { force } => {
            stakekeys::cli::handle_init_command(&stakekeys, force).await?;
        }
        Commands::Reset { force } => {
            stakekeys::cli::handle_reset_command(&stakekeys, force).await?;
        }
        Commands::Sync(sync_command) => {
            stakekeys::cli::handle_sync_command(&stakekeys, &sync_command).await?;
        }
        Commands::Modules(modules_command) => {
            stakekeys::cli::handle_modules_command(&stakekeys, &modules_command).await?;
        }
        Commands::Meta => {
            stakekeys::cli::handle_meta_command(&stakekeys).await?;
        }
        Commands::Config => unreachable!("handled before connecting"),
    }

    Ok(())
}
