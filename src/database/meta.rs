use sqlx::PgConnection;

use super::address_from_db;
use super::from_db_int;
use super::hash_from_db;
use super::to_db_int;
use super::Database;
use crate::models::AppInfo;
use crate::models::ClMeta;
use crate::models::ElMeta;
use crate::models::Validator;
use crate::Result;

#[derive(sqlx::FromRow)]
struct ElMetaRow {
    block_number: i64,
    block_hash: Vec<u8>,
    timestamp: i64,
}

impl ElMetaRow {
    fn into_meta(self) -> Result<ElMeta> {
        Ok(ElMeta {
            block_number: from_db_int(self.block_number, "block_number")?,
            block_hash: hash_from_db(&self.block_hash)?,
            timestamp: from_db_int(self.timestamp, "timestamp")?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ClMetaRow {
    epoch: i64,
    slot: i64,
    slot_state_root: Vec<u8>,
    block_number: i64,
    block_hash: Vec<u8>,
    timestamp: i64,
}

impl ClMetaRow {
    fn into_meta(self) -> Result<ClMeta> {
        Ok(ClMeta {
            epoch: from_db_int(self.epoch, "epoch")?,
            slot: from_db_int(self.slot, "slot")?,
            slot_state_root: hash_from_db(&self.slot_state_root)?,
            block_number: from_db_int(self.block_number, "block_number")?,
            block_hash: hash_from_db(&self.block_hash)?,
            timestamp: from_db_int(self.timestamp, "timestamp")?,
        })
    }
}

pub(super) async fn fetch_el_meta(conn: &mut PgConnection) -> Result<Option<ElMeta>> {
    let row: Option<ElMetaRow> =
        sqlx::query_as("SELECT block_number, block_hash, timestamp FROM el_meta WHERE id = 1")
            .fetch_optional(conn)
            .await?;
    row.map(ElMetaRow::into_meta).transpose()
}

pub(super) async fn fetch_cl_meta(conn: &mut PgConnection) -> Result<Option<ClMeta>> {
    let row: Option<ClMetaRow> = sqlx::query_as(
        "SELECT epoch, slot, slot_state_root, block_number, block_hash, timestamp FROM cl_meta WHERE id = 1",
    )
    .fetch_optional(conn)
    .await?;
    row.map(ClMetaRow::into_meta).transpose()
}

/// Upsert EL meta unless the stored block is newer. Returns whether a row changed.
pub(super) async fn advance_el_meta(conn: &mut PgConnection, meta: &ElMeta) -> Result<bool> {
    let result = sqlx::query(
        r"
        INSERT INTO el_meta (id, block_number, block_hash, timestamp)
        VALUES (1, $1, $2, $3)
        ON CONFLICT (id) DO UPDATE SET
            block_number = EXCLUDED.block_number,
            block_hash = EXCLUDED.block_hash,
            timestamp = EXCLUDED.timestamp
        WHERE el_meta.block_number <= EXCLUDED.block_number
        ",
    )
    .bind(to_db_int(meta.block_number, "block_number")?)
    .bind(meta.block_hash.as_slice())
    .bind(to_db_int(meta.timestamp, "timestamp")?)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

impl Database {
    /// # Errors
    /// - Database query errors
    pub async fn get_el_meta(&self) -> Result<Option<ElMeta>> {
        let mut conn = self.pool.acquire().await?;
        fetch_el_meta(&mut conn).await
    }

    /// # Errors
    /// - Database query errors
    pub async fn get_cl_meta(&self) -> Result<Option<ClMeta>> {
        let mut conn = self.pool.acquire().await?;
        fetch_cl_meta(&mut conn).await
    }

    /// Advance EL meta on its own, without module data
    ///
    /// # Errors
    /// - Database query errors
    pub async fn bump_el_meta(&self, meta: ElMeta) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        advance_el_meta(&mut conn, &meta).await
    }

    /// Write CL meta and optionally replace the validator set in one transaction
    ///
    /// # Errors
    /// - Database query errors; nothing is written in that case
    pub async fn commit_consensus_snapshot(
        &self,
        meta: ClMeta,
        validators: Option<&[Validator]>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO cl_meta (id, epoch, slot, slot_state_root, block_number, block_hash, timestamp)
            VALUES (1, $1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                epoch = EXCLUDED.epoch,
                slot = EXCLUDED.slot,
                slot_state_root = EXCLUDED.slot_state_root,
                block_number = EXCLUDED.block_number,
                block_hash = EXCLUDED.block_hash,
                timestamp = EXCLUDED.timestamp
            ",
        )
        .bind(to_db_int(meta.epoch, "epoch")?)
        .bind(to_db_int(meta.slot, "slot")?)
        .bind(meta.slot_state_root.as_slice())
        .bind(to_db_int(meta.block_number, "block_number")?)
        .bind(meta.block_hash.as_slice())
        .bind(to_db_int(meta.timestamp, "timestamp")?)
        .execute(&mut *tx)
        .await?;

        if let Some(validators) = validators {
            super::validators::replace_validators(&mut *tx, validators).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// # Errors
    /// - Database query errors
    pub async fn get_app_info(&self) -> Result<Option<AppInfo>> {
        let row: Option<(i64, Vec<u8>)> =
            sqlx::query_as("SELECT chain_id, locator_address FROM app_info WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(chain_id, locator)| {
            Ok(AppInfo {
                chain_id: from_db_int(chain_id, "chain_id")?,
                locator_address: address_from_db(&locator)?,
            })
        })
        .transpose()
    }

    /// # Errors
    /// - Database query errors
    pub async fn save_app_info(&self, info: AppInfo) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO app_info (id, chain_id, locator_address)
            VALUES (1, $1, $2)
            ON CONFLICT (id) DO UPDATE SET
                chain_id = EXCLUDED.chain_id,
                locator_address = EXCLUDED.locator_address
            ",
        )
        .bind(to_db_int(info.chain_id, "chain_id")?)
        .bind(info.locator_address.as_slice())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
