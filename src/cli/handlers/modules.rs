//! Module, operator and key query handlers

use alloy::primitives::Address;

use super::utils::abbreviate;
use super::utils::parse_address;
use crate::api::Served;
use crate::cli::commands::ModulesCommands;
use crate::errors::Result;
use crate::models::ElMeta;
use crate::models::KeyFilter;
use crate::StakeKeys;

/// Handle module query commands
///
/// # Errors
/// - Invalid address, unknown module or storage errors
pub async fn handle_modules_command(
    stakekeys: &StakeKeys,
    command: &ModulesCommands,
) -> Result<()> {
    match command {
        ModulesCommands::List => handle_modules_list(stakekeys).await,
        ModulesCommands::Keys {
            address,
            operator,
            used,
            unused,
            validators,
            json,
        } => {
            let filter = KeyFilter {
                operator_index: *operator,
                used: match (*used, *unused) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            let address = parse_address(address)?;
            if *validators {
                handle_module_validators(stakekeys, address, filter, *json).await
            } else {
                handle_module_keys(stakekeys, address, filter, *json).await
            }
        }
        ModulesCommands::Operators { address, json } => {
            handle_module_operators(stakekeys, parse_address(address)?, *json).await
        }
    }
}

async fn handle_modules_list(stakekeys: &StakeKeys) -> Result<()> {
    let modules = stakekeys.api().list_modules().await?;
    if modules.is_empty() {
        println!("No modules stored yet; run `stakekeys sync once`");
        return Ok(());
    }

    println!(
        "{:<4} {:<44} {:<22} {:<12} {:>8}  {:<16} {}",
        "ID", "ADDRESS", "TYPE", "STATUS", "NONCE", "BLOCK HASH", "NAME"
    );
    for module in modules {
        println!(
            "{:<4} {:<44} {:<22} {:<12} {:>8}  {:<16} {}",
            module.id,
            format!("{:#x}", module.address),
            module.module_type.as_str(),
            module.status.as_str(),
            module
                .nonce
                .map_or_else(|| "-".to_string(), |n| n.to_string()),
            module
                .last_changed_block_hash
                .map_or_else(|| "-".to_string(), |h| abbreviate(&format!("{h:#x}"))),
            module.name
        );
    }
    Ok(())
}

fn print_too_early() {
    println!("⏳ Too early: synchronized data is behind the consensus layer, retry later");
}

fn print_meta(meta: &ElMeta) {
    println!(
        "\nAs of EL block {} ({})",
        meta.block_number,
        abbreviate(&format!("{:#x}", meta.block_hash))
    );
}

async fn handle_module_keys(
    stakekeys: &StakeKeys,
    address: Address,
    filter: KeyFilter,
    json: bool,
) -> Result<()> {
    let served = stakekeys.api().get_module_keys(address, filter).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&served)?);
        return Ok(());
    }
    let Served::Data(data) = served else {
        print_too_early();
        return Ok(());
    };

    println!("🔑 {} keys in {}", data.keys.len(), data.module.name);
    println!("{:<8} {:<6} {:<16} {:<5} {:<6}", "OPERATOR", "INDEX", "PUBKEY", "USED", "VETTED");
    for key in &data.keys {
        println!(
            "{:<8} {:<6} {:<16} {:<5} {:<6}",
            key.operator_index,
            key.index,
            abbreviate(&key.key),
            key.used,
            key.vetted
        );
    }
    print_meta(&data.meta);
    Ok(())
}

async fn handle_module_validators(
    stakekeys: &StakeKeys,
    address: Address,
    filter: KeyFilter,
    json: bool,
) -> Result<()> {
    let served = stakekeys.api().get_module_validators(address, filter).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&served)?);
        return Ok(());
    }
    let Served::Data(data) = served else {
        print_too_early();
        return Ok(());
    };

    println!("🔑 {} keys in {}", data.keys.len(), data.module.name);
    println!(
        "{:<8} {:<6} {:<16} {:<10} {}",
        "OPERATOR", "INDEX", "PUBKEY", "VALIDATOR", "STATUS"
    );
    for entry in &data.keys {
        println!(
            "{:<8} {:<6} {:<16} {:<10} {}",
            entry.key.operator_index,
            entry.key.index,
            abbreviate(&entry.key.key),
            entry
                .validator_index
                .map_or_else(|| "-".to_string(), |i| i.to_string()),
            entry.validator_status.map_or("-", |s| s.as_str())
        );
    }
    print_meta(&data.el_meta);
    if let Some(cl) = data.cl_meta {
        println!("Validators as of slot {} (EL block {})", cl.slot, cl.block_number);
    }
    Ok(())
}

async fn handle_module_operators(
    stakekeys: &StakeKeys,
    address: Address,
    json: bool,
) -> Result<()> {
    let served = stakekeys.api().get_module_operators(address).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&served)?);
        return Ok(());
    }
    let Served::Data(data) = served else {
        print_too_early();
        return Ok(());
    };

    println!("👥 {} operators in {}", data.operators.len(), data.module.name);
    println!(
        "{:<6} {:<7} {:>8} {:>8} {:>8} {:>8}  {}",
        "INDEX", "ACTIVE", "TOTAL", "USED", "VETTED", "STOPPED", "NAME"
    );
    for op in &data.operators {
        println!(
            "{:<6} {:<7} {:>8} {:>8} {:>8} {:>8}  {}",
            op.index,
            op.active,
            op.total_signing_keys,
            op.used_signing_keys,
            op.vetted_signing_keys,
            op.stopped_validators,
            op.name
        );
    }
    print_meta(&data.meta);
    Ok(())
}
