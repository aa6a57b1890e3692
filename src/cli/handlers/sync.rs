//! Worker command handlers

use tracing::info;

use super::utils::format_timestamp;
use crate::cli::commands::SyncCommands;
use crate::errors::Result;
use crate::sync::lock_file::LoopProgress;
use crate::sync::ConsensusTick;
use crate::StakeKeys;

/// Handle worker commands
///
/// # Errors
/// - See the individual `StakeKeys` operations
pub async fn handle_sync_command(stakekeys: &StakeKeys, command: &SyncCommands) -> Result<()> {
    match command {
        SyncCommands::Start => {
            info!("Starting worker (Ctrl+C to stop)...");
            stakekeys.start_sync().await
        }
        SyncCommands::Once => handle_sync_once(stakekeys).await,
        SyncCommands::Status => handle_sync_status(stakekeys),
        SyncCommands::Stop { force } => {
            stakekeys.stop_sync(*force).await?;
            println!("✅ Stop requested");
            Ok(())
        }
    }
}

async fn handle_sync_once(stakekeys: &StakeKeys) -> Result<()> {
    let report = stakekeys.sync_once().await?;

    println!("⛓️  Execution layer: {}", report.execution);
    for failure in &report.execution.failures {
        println!(
            "   ❌ {:#x} ({:?}): {}",
            failure.module, failure.kind, failure.message
        );
    }
    if report.execution.meta_bumped {
        println!("   EL meta advanced to block {}", report.execution.block.number);
    }

    match report.consensus {
        ConsensusTick::Advanced { meta, validators } => {
            println!(
                "🔗 Consensus layer: epoch {} slot {} -> EL block {}",
                meta.epoch, meta.slot, meta.block_number
            );
            if let Some(count) = validators {
                println!("   {count} validators stored");
            }
        }
        ConsensusTick::Unchanged { slot } => {
            println!("🔗 Consensus layer: finalized slot {slot} unchanged");
        }
    }
    Ok(())
}

fn handle_sync_status(stakekeys: &StakeKeys) -> Result<()> {
    let Some(lock) = stakekeys.get_sync_status()? else {
        println!("💤 No worker running");
        return Ok(());
    };

    println!("📊 Worker status");
    println!("  PID:         {}", lock.pid);
    println!("  Status:      {:?}", lock.status);
    println!("  Started:     {}", format_timestamp(lock.start_time));
    println!(
        "  Last update: {} ({}s ago)",
        format_timestamp(lock.last_update),
        lock.age().as_secs()
    );
    print_loop("Execution", "block", &lock.progress.execution);
    print_loop("Consensus", "slot", &lock.progress.consensus);
    if let Some(error) = &lock.error_message {
        println!("  Error:       {error}");
    }
    Ok(())
}

fn print_loop(name: &str, unit: &str, progress: &LoopProgress) {
    let position = progress
        .last_position
        .map_or_else(|| "-".to_string(), |p| format!("{unit} {p}"));
    println!(
        "  {name:<11} {position}, {} ticks, {} consecutive failures",
        progress.ticks, progress.consecutive_failures
    );
    if let Some(error) = &progress.last_error {
        println!("              last error: {error}");
    }
}
