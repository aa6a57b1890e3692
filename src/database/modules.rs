use alloy::primitives::Address;
use sqlx::PgConnection;

use super::address_from_db;
use super::from_db_int;
use super::hash_from_db;
use super::Database;
use crate::models::StakingModule;
use crate::Result;
use crate::StakeKeysError;

const MODULE_COLUMNS: &str =
    "address, id, module_type, name, fee_share, target_share, status, nonce, last_changed_block_hash";

#[derive(sqlx::FromRow)]
struct ModuleRow {
    address: Vec<u8>,
    id: i64,
    module_type: String,
    name: String,
    fee_share: i32,
    target_share: i32,
    status: String,
    nonce: Option<i64>,
    last_changed_block_hash: Option<Vec<u8>>,
}

impl TryFrom<ModuleRow> for StakingModule {
    type Error = StakeKeysError;

    fn try_from(row: ModuleRow) -> Result<Self> {
        Ok(Self {
            id: u32::try_from(row.id)
                .map_err(|_| StakeKeysError::Storage(format!("invalid module id {}", row.id)))?,
            address: address_from_db(&row.address)?,
            module_type: row.module_type.parse().map_err(StakeKeysError::Storage)?,
            name: row.name,
            fee_share: u16::try_from(row.fee_share).map_err(|_| {
                StakeKeysError::Storage(format!("invalid fee share {}", row.fee_share))
            })?,
            target_share: u16::try_from(row.target_share).map_err(|_| {
                StakeKeysError::Storage(format!("invalid target share {}", row.target_share))
            })?,
            status: row.status.parse().map_err(StakeKeysError::Storage)?,
            nonce: row.nonce.map(|n| from_db_int(n, "nonce")).transpose()?,
            last_changed_block_hash: row
                .last_changed_block_hash
                .as_deref()
                .map(hash_from_db)
                .transpose()?,
        })
    }
}

pub(super) async fn fetch_module(
    conn: &mut PgConnection,
    address: Address,
) -> Result<Option<StakingModule>> {
    let row: Option<ModuleRow> = sqlx::query_as(&format!(
        "SELECT {MODULE_COLUMNS} FROM staking_modules WHERE address = $1"
    ))
    .bind(address.as_slice())
    .fetch_optional(conn)
    .await?;

    row.map(StakingModule::try_from).transpose()
}

impl Database {
    /// Insert modules or refresh their descriptive columns
    ///
    /// Sync state (`nonce`, `last_changed_block_hash`) is left untouched.
    ///
    /// # Errors
    /// - Database query errors
    pub async fn upsert_modules(&self, modules: &[StakingModule]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for module in modules {
            sqlx::query(
                r"
                INSERT INTO staking_modules (address, id, module_type, name, fee_share, target_share, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (address) DO UPDATE SET
                    id = EXCLUDED.id,
                    module_type = EXCLUDED.module_type,
                    name = EXCLUDED.name,
                    fee_share = EXCLUDED.fee_share,
                    target_share = EXCLUDED.target_share,
                    status = EXCLUDED.status
                ",
            )
            .bind(module.address.as_slice())
            .bind(i64::from(module.id))
            .bind(module.module_type.as_str())
            .bind(&module.name)
            .bind(i32::from(module.fee_share))
            .bind(i32::from(module.target_share))
            .bind(module.status.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// # Errors
    /// - Database query errors or malformed stored rows
    pub async fn get_module(&self, address: Address) -> Result<Option<StakingModule>> {
        let mut conn = self.pool.acquire().await?;
        fetch_module(&mut conn, address).await
    }

    /// All modules ordered by id
    ///
    /// # Errors
    /// - Database query errors or malformed stored rows
    pub async fn list_modules(&self) -> Result<Vec<StakingModule>> {
        let rows: Vec<ModuleRow> = sqlx::query_as(&format!(
            "SELECT {MODULE_COLUMNS} FROM staking_modules ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StakingModule::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::B256;

    use super::*;
    use crate::models::ModuleStatus;
    use crate::models::ModuleType;

    fn row() -> ModuleRow {
        ModuleRow {
            address: vec![0x11; 20],
            id: 3,
            module_type: "community-onchain-v1".to_string(),
            name: "community".to_string(),
            fee_share: 600,
            target_share: 1_500,
            status: "stopped".to_string(),
            nonce: Some(12),
            last_changed_block_hash: Some(vec![0x22; 32]),
        }
    }

    #[test]
    fn test_row_conversion() {
        let module = StakingModule::try_from(row()).unwrap();
        assert_eq!(module.address, Address::repeat_byte(0x11));
        assert_eq!(module.module_type, ModuleType::Community);
        assert_eq!(module.status, ModuleStatus::Stopped);
        assert_eq!(module.nonce, Some(12));
        assert_eq!(module.last_changed_block_hash, Some(B256::repeat_byte(0x22)));
    }

    #[test]
    fn test_row_with_unknown_type_is_storage_error() {
        let bad = ModuleRow {
            module_type: "legacy".to_string(),
            ..row()
        };
        let err = StakingModule::try_from(bad).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Storage);
    }
}
