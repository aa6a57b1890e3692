//! Database layer for `PostgreSQL` operations
//!
//! Persists the replicated module state for `stakekeys`:
//!
//! - Staking modules with their sync nonce
//! - Node operators and signing keys, replaced wholesale per module
//! - EL / CL meta singletons and the finalized validator set
//! - App info (chain id + locator)
//!
//! # Transactions
//!
//! Every multi-row write runs in one transaction. A dropped transaction rolls
//! back, so a crash mid-resync leaves the previous snapshot in place. Reads
//! that pair module data with meta run in a `REPEATABLE READ READ ONLY`
//! transaction.
//!
//! # Connection Pool
//!
//! Connection pooling is managed by `sqlx::PgPool` with configurable:
//! - Maximum connections
//! - Minimum connections
//! - Connection timeout
//!
//! # Examples
//!
//! ```rust,no_run
//! use stakekeys::{AppConfig, Database};
//!
//! # async fn example() -> stakekeys::Result<()> {
//! let config = AppConfig::load()?;
//! let database = Database::from_config(&config).await?;
//! database.init_schema().await?;
//! # Ok(())
//! # }
//! ```

use alloy::primitives::Address;
use alloy::primitives::B256;
use sqlx::PgPool;

use crate::Result;
use crate::StakeKeysError;

mod meta;
mod modules;
mod schema;
mod snapshots;
mod store;
mod validators;

/// Keep below the 65535 bind parameters Postgres accepts per statement
const MAX_PARAMS: usize = 65000;

/// Database connection pool wrapper
///
/// This type is `Clone` and thread-safe. Cloning creates a new reference to the same
/// connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new database instance from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Database connection fails
    /// - Network issues prevent connection
    pub async fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        let pool_options = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.min_connections())
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout()));

        let pool = pool_options.connect(config.database_url()).await?;

        tracing::debug!(
            "Database pool configured: max_connections={}, min_connections={}",
            config.max_connections(),
            config.min_connections()
        );

        Ok(Self::new(pool))
    }

    /// Get a reference to the database pool for raw queries
    #[must_use]
    pub const fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

pub(crate) fn to_db_int(value: u64, column: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StakeKeysError::Storage(format!("{column} value {value} exceeds BIGINT")))
}

pub(crate) fn from_db_int(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| StakeKeysError::Storage(format!("negative {column} in database: {value}")))
}

pub(crate) fn address_from_db(bytes: &[u8]) -> Result<Address> {
    Address::try_from(bytes)
        .map_err(|_| StakeKeysError::Storage(format!("stored address has {} bytes", bytes.len())))
}

pub(crate) fn hash_from_db(bytes: &[u8]) -> Result<B256> {
    B256::try_from(bytes)
        .map_err(|_| StakeKeysError::Storage(format!("stored hash has {} bytes", bytes.len())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_conversions() {
        assert_eq!(to_db_int(42, "nonce").unwrap(), 42);
        assert!(to_db_int(u64::MAX, "nonce").is_err());
        assert_eq!(from_db_int(42, "nonce").unwrap(), 42);
        assert_eq!(
            from_db_int(-1, "nonce").unwrap_err().kind(),
            crate::ErrorKind::Storage
        );
    }

    #[test]
    fn test_byte_conversions() {
        let address = Address::repeat_byte(0xab);
        assert_eq!(address_from_db(address.as_slice()).unwrap(), address);
        assert!(address_from_db(&[0u8; 19]).is_err());
        assert!(hash_from_db(&[0u8; 31]).is_err());
    }
}
