//! Information display handlers

use super::utils::format_timestamp;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::StakeKeys;

/// Print both metas and the current consistency verdict
///
/// # Errors
/// - Storage errors
pub async fn handle_meta_command(stakekeys: &StakeKeys) -> Result<()> {
    let status = stakekeys.api().sync_status().await?;

    println!("📊 Sync meta");
    match status.el_meta {
        Some(el) => println!(
            "  EL: block {} {:#x} at {}",
            el.block_number,
            el.block_hash,
            format_timestamp(el.timestamp)
        ),
        None => println!("  EL: nothing synced yet"),
    }
    match status.cl_meta {
        Some(cl) => println!(
            "  CL: epoch {} slot {} -> EL block {} at {}",
            cl.epoch,
            cl.slot,
            cl.block_number,
            format_timestamp(cl.timestamp)
        ),
        None => println!("  CL: no finalized snapshot yet"),
    }
    println!(
        "  Boundary: {:?}",
        stakekeys.config().sync.too_early_boundary
    );
    if status.too_early {
        println!("  ⏳ Too early: EL data is behind the consensus layer");
    } else {
        println!("  ✅ Serving");
    }
    Ok(())
}

/// Print the effective configuration with the database password masked
pub fn handle_config_command(config: &AppConfig) {
    println!("📋 stakekeys configuration");
    println!("\n[database]");
    println!("  url: {}", mask_password(&config.database.url));
    println!("  max_connections: {}", config.database.max_connections);
    println!("  min_connections: {}", config.database.min_connections);
    println!("  connection_timeout: {}s", config.database.connection_timeout);

    println!("\n[chain]");
    println!("  chain_id: {}", config.chain.chain_id);
    println!("  locator_address: {:#x}", config.chain.locator_address);
    println!("  el_rpc_urls: {}", config.chain.el_rpc_urls.join(", "));
    println!("  cl_api_urls: {}", config.chain.cl_api_urls.join(", "));
    println!("  request_timeout: {}s", config.chain.request_timeout_secs);

    let sync = &config.sync;
    println!("\n[sync]");
    println!("  block_tag: {:?}", sync.block_tag);
    println!("  el_interval: {}s", sync.el_interval_secs);
    println!("  cl_interval: {}s", sync.cl_interval_secs);
    println!("  keys_batch_size: {}", sync.keys_batch_size);
    println!("  module_timeout: {}s", sync.module_timeout_secs);
    println!("  shutdown_grace: {}s", sync.shutdown_grace_secs);
    println!("  too_early_boundary: {:?}", sync.too_early_boundary);
    println!("  track_validators: {}", sync.track_validators);
    println!("  advance_meta_when_unchanged: {}", sync.advance_meta_when_unchanged);
    println!("  lock_file_path: {}", sync.lock_file_path);

    println!("\n[modules]");
    if config.modules.is_empty() {
        println!("  (discovered through the locator)");
    }
    for module in &config.modules {
        println!(
            "  #{} {} {:#x} ({}, {:?})",
            module.id, module.name, module.address, module.module_type, module.status
        );
    }
}

/// Hide the password part of a database URL
#[must_use]
pub fn mask_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.rfind('@') else {
        return url.to_string();
    };
    let credentials = &rest[..at];
    match credentials.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..scheme_end + 3],
            &credentials[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}
