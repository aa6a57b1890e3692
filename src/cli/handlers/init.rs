//! Database initialization and reset handlers

use tracing::info;

use super::utils::confirm;
use crate::errors::Result;
use crate::StakeKeys;

/// Create the schema and record which chain this database belongs to
///
/// # Errors
/// - Database errors
/// - The database belongs to another chain and `force` is not set
pub async fn handle_init_command(stakekeys: &StakeKeys, force: bool) -> Result<()> {
    info!("Initializing database...");
    stakekeys.init_database().await?;

    let app_info = stakekeys.record_app_info(force).await?;
    println!(
        "✅ Database initialized for chain {} (locator {:#x})",
        app_info.chain_id, app_info.locator_address
    );
    Ok(())
}

/// Delete all synced rows and the worker lock file
///
/// # Errors
/// - A worker is still running
/// - Database or file system errors
pub async fn handle_reset_command(stakekeys: &StakeKeys, force: bool) -> Result<()> {
    if !force {
        println!("\n⚠️  This will delete ALL synchronized data:");
        println!("  - Staking modules and their nonces");
        println!("  - Node operators and signing keys");
        println!("  - EL / CL meta and stored validators");
        println!("\n⚠️  The next sync starts from scratch.\n");

        if !confirm("Continue?")? {
            println!("❌ Aborted");
            return Ok(());
        }
    }

    stakekeys.reset().await?;
    println!("✅ Reset complete");
    Ok(())
}
