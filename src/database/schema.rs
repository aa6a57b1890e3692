use super::Database;
use crate::Result;

/// Bootstrap DDL; every statement is idempotent
const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS app_info (
        id SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
        chain_id BIGINT NOT NULL,
        locator_address BYTEA NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS staking_modules (
        address BYTEA PRIMARY KEY,
        id BIGINT NOT NULL UNIQUE,
        module_type TEXT NOT NULL,
        name TEXT NOT NULL,
        fee_share INTEGER NOT NULL,
        target_share INTEGER NOT NULL,
        status TEXT NOT NULL,
        nonce BIGINT,
        last_changed_block_hash BYTEA
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS registry_operators (
        module_address BYTEA NOT NULL REFERENCES staking_modules(address) ON DELETE CASCADE,
        operator_index BIGINT NOT NULL,
        active BOOLEAN NOT NULL,
        name TEXT NOT NULL,
        reward_address BYTEA NOT NULL,
        total_signing_keys BIGINT NOT NULL,
        used_signing_keys BIGINT NOT NULL,
        vetted_signing_keys BIGINT NOT NULL,
        stopped_validators BIGINT NOT NULL,
        finalized_used_signing_keys BIGINT NOT NULL,
        PRIMARY KEY (module_address, operator_index)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS registry_keys (
        module_address BYTEA NOT NULL REFERENCES staking_modules(address) ON DELETE CASCADE,
        operator_index BIGINT NOT NULL,
        key_index BIGINT NOT NULL,
        pubkey TEXT NOT NULL,
        deposit_signature TEXT NOT NULL,
        used BOOLEAN NOT NULL,
        vetted BOOLEAN NOT NULL,
        PRIMARY KEY (module_address, operator_index, key_index)
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_registry_keys_pubkey ON registry_keys(pubkey)",
    "CREATE INDEX IF NOT EXISTS idx_registry_keys_used ON registry_keys(module_address, used)",
    r"
    CREATE TABLE IF NOT EXISTS el_meta (
        id SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
        block_number BIGINT NOT NULL,
        block_hash BYTEA NOT NULL,
        timestamp BIGINT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS cl_meta (
        id SMALLINT PRIMARY KEY DEFAULT 1 CHECK (id = 1),
        epoch BIGINT NOT NULL,
        slot BIGINT NOT NULL,
        slot_state_root BYTEA NOT NULL,
        block_number BIGINT NOT NULL,
        block_hash BYTEA NOT NULL,
        timestamp BIGINT NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS consensus_validators (
        validator_index BIGINT PRIMARY KEY,
        pubkey TEXT NOT NULL,
        status TEXT NOT NULL
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_consensus_validators_pubkey ON consensus_validators(pubkey)",
];

impl Database {
    /// Create all tables and indexes if they do not exist
    ///
    /// # Errors
    /// - Database connection or DDL execution errors
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::info!("✅ Database schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }

    /// Delete all synced rows. App info survives.
    pub async fn reset_sync_data(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "registry_keys",
            "registry_operators",
            "staking_modules",
            "el_meta",
            "cl_meta",
            "consensus_validators",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::warn!("🗑️  All synced data deleted");
        Ok(())
    }
}
