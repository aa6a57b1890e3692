use alloy::primitives::Address;
use sqlx::PgConnection;
use sqlx::Postgres;
use sqlx::QueryBuilder;

use super::address_from_db;
use super::from_db_int;
use super::meta::advance_el_meta;
use super::meta::fetch_cl_meta;
use super::meta::fetch_el_meta;
use super::modules::fetch_module;
use super::to_db_int;
use super::validators::fetch_validators_by_pubkeys;
use super::Database;
use super::MAX_PARAMS;
use crate::models::KeyFilter;
use crate::models::ModuleSnapshot;
use crate::models::Operator;
use crate::models::RegistryKey;
use crate::store::ModuleView;
use crate::store::ViewParts;
use crate::Result;
use crate::StakeKeysError;

const OPERATOR_PARAMS_PER_ROW: usize = 10;
const KEY_PARAMS_PER_ROW: usize = 7;
const OPERATOR_CHUNK_SIZE: usize = MAX_PARAMS / OPERATOR_PARAMS_PER_ROW;
const KEY_CHUNK_SIZE: usize = MAX_PARAMS / KEY_PARAMS_PER_ROW;

#[derive(sqlx::FromRow)]
struct OperatorRow {
    module_address: Vec<u8>,
    operator_index: i64,
    active: bool,
    name: String,
    reward_address: Vec<u8>,
    total_signing_keys: i64,
    used_signing_keys: i64,
    vetted_signing_keys: i64,
    stopped_validators: i64,
    finalized_used_signing_keys: i64,
}

impl TryFrom<OperatorRow> for Operator {
    type Error = StakeKeysError;

    fn try_from(row: OperatorRow) -> Result<Self> {
        Ok(Self {
            module_address: address_from_db(&row.module_address)?,
            index: index_from_db(row.operator_index)?,
            active: row.active,
            name: row.name,
            reward_address: address_from_db(&row.reward_address)?,
            total_signing_keys: from_db_int(row.total_signing_keys, "total_signing_keys")?,
            used_signing_keys: from_db_int(row.used_signing_keys, "used_signing_keys")?,
            vetted_signing_keys: from_db_int(row.vetted_signing_keys, "vetted_signing_keys")?,
            stopped_validators: from_db_int(row.stopped_validators, "stopped_validators")?,
            finalized_used_signing_keys: from_db_int(
                row.finalized_used_signing_keys,
                "finalized_used_signing_keys",
            )?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct KeyRow {
    module_address: Vec<u8>,
    operator_index: i64,
    key_index: i64,
    pubkey: String,
    deposit_signature: String,
    used: bool,
    vetted: bool,
}

impl TryFrom<KeyRow> for RegistryKey {
    type Error = StakeKeysError;

    fn try_from(row: KeyRow) -> Result<Self> {
        Ok(Self {
            module_address: address_from_db(&row.module_address)?,
            operator_index: index_from_db(row.operator_index)?,
            index: index_from_db(row.key_index)?,
            key: row.pubkey,
            deposit_signature: row.deposit_signature,
            used: row.used,
            vetted: row.vetted,
        })
    }
}

fn index_from_db(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| StakeKeysError::Storage(format!("invalid index {value}")))
}

async fn insert_operators(conn: &mut PgConnection, operators: &[Operator]) -> Result<()> {
    let rows = operators
        .iter()
        .map(|op| {
            Ok((
                op.module_address.to_vec(),
                i64::from(op.index),
                op.active,
                op.name.clone(),
                op.reward_address.to_vec(),
                [
                    to_db_int(op.total_signing_keys, "total_signing_keys")?,
                    to_db_int(op.used_signing_keys, "used_signing_keys")?,
                    to_db_int(op.vetted_signing_keys, "vetted_signing_keys")?,
                    to_db_int(op.stopped_validators, "stopped_validators")?,
                    to_db_int(op.finalized_used_signing_keys, "finalized_used_signing_keys")?,
                ],
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    for chunk in rows.chunks(OPERATOR_CHUNK_SIZE) {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO registry_operators (module_address, operator_index, active, name, reward_address, \
             total_signing_keys, used_signing_keys, vetted_signing_keys, stopped_validators, finalized_used_signing_keys) ",
        );
        query_builder.push_values(
            chunk,
            |mut b, (module, index, active, name, reward, counts)| {
                b.push_bind(module.clone())
                    .push_bind(*index)
                    .push_bind(*active)
                    .push_bind(name.clone())
                    .push_bind(reward.clone());
                for count in counts {
                    b.push_bind(*count);
                }
            },
        );
        query_builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

async fn insert_keys(conn: &mut PgConnection, keys: &[RegistryKey]) -> Result<()> {
    for chunk in keys.chunks(KEY_CHUNK_SIZE) {
        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO registry_keys (module_address, operator_index, key_index, pubkey, deposit_signature, used, vetted) ",
        );
        query_builder.push_values(chunk, |mut b, key| {
            b.push_bind(key.module_address.to_vec())
                .push_bind(i64::from(key.operator_index))
                .push_bind(i64::from(key.index))
                .push_bind(key.key.to_lowercase())
                .push_bind(key.deposit_signature.clone())
                .push_bind(key.used)
                .push_bind(key.vetted);
        });
        query_builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

async fn fetch_operators(conn: &mut PgConnection, address: Address) -> Result<Vec<Operator>> {
    let rows: Vec<OperatorRow> = sqlx::query_as(
        r"
        SELECT module_address, operator_index, active, name, reward_address, total_signing_keys,
               used_signing_keys, vetted_signing_keys, stopped_validators, finalized_used_signing_keys
        FROM registry_operators
        WHERE module_address = $1
        ORDER BY operator_index
        ",
    )
    .bind(address.as_slice())
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(Operator::try_from).collect()
}

async fn fetch_keys(
    conn: &mut PgConnection,
    address: Address,
    filter: KeyFilter,
) -> Result<Vec<RegistryKey>> {
    let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT module_address, operator_index, key_index, pubkey, deposit_signature, used, vetted \
         FROM registry_keys WHERE module_address = ",
    );
    query_builder.push_bind(address.to_vec());
    if let Some(operator_index) = filter.operator_index {
        query_builder
            .push(" AND operator_index = ")
            .push_bind(i64::from(operator_index));
    }
    if let Some(used) = filter.used {
        query_builder.push(" AND used = ").push_bind(used);
    }
    query_builder.push(" ORDER BY operator_index, key_index");

    let rows: Vec<KeyRow> = query_builder.build_query_as().fetch_all(conn).await?;
    rows.into_iter().map(RegistryKey::try_from).collect()
}

impl Database {
    /// Replace a module's operators and keys and advance EL meta atomically
    ///
    /// The module row is locked for the duration of the transaction, so
    /// concurrent commits for the same module serialize.
    ///
    /// # Errors
    /// - [`StakeKeysError::ModuleNotFound`] when the module row is missing
    /// - Database errors; the transaction is rolled back
    pub async fn commit_module_snapshot(&self, snapshot: &ModuleSnapshot) -> Result<()> {
        let address = snapshot.module_address;
        let mut tx = self.pool.begin().await?;

        let locked: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM staking_modules WHERE address = $1 FOR UPDATE")
                .bind(address.as_slice())
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StakeKeysError::ModuleNotFound(format!("{address:#x}")));
        }

        sqlx::query("DELETE FROM registry_keys WHERE module_address = $1")
            .bind(address.as_slice())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM registry_operators WHERE module_address = $1")
            .bind(address.as_slice())
            .execute(&mut *tx)
            .await?;

        insert_operators(&mut tx, &snapshot.operators).await?;
        insert_keys(&mut tx, &snapshot.keys).await?;

        sqlx::query(
            "UPDATE staking_modules SET nonce = $2, last_changed_block_hash = $3 WHERE address = $1",
        )
        .bind(address.as_slice())
        .bind(to_db_int(snapshot.nonce, "nonce")?)
        .bind(snapshot.block.block_hash.as_slice())
        .execute(&mut *tx)
        .await?;

        advance_el_meta(&mut tx, &snapshot.block).await?;

        tx.commit().await?;

        tracing::debug!(
            "Committed {:#x}: nonce {}, {} operators, {} keys at block {}",
            address,
            snapshot.nonce,
            snapshot.operators.len(),
            snapshot.keys.len(),
            snapshot.block.block_number
        );
        Ok(())
    }

    /// Read a module with the requested children and both metas from one snapshot
    ///
    /// # Errors
    /// - Database query errors or malformed stored rows
    pub async fn read_module_view(
        &self,
        address: Address,
        filter: KeyFilter,
        parts: ViewParts,
    ) -> Result<Option<ModuleView>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(module) = fetch_module(&mut tx, address).await? else {
            return Ok(None);
        };

        let operators = if parts.operators {
            fetch_operators(&mut tx, address).await?
        } else {
            Vec::new()
        };
        let keys = if parts.wants_keys() {
            fetch_keys(&mut tx, address, filter).await?
        } else {
            Vec::new()
        };
        let validators = if parts.validators {
            let pubkeys: Vec<String> = keys.iter().map(|k| k.key.clone()).collect();
            fetch_validators_by_pubkeys(&mut tx, &pubkeys).await?
        } else {
            Vec::new()
        };

        let el_meta = fetch_el_meta(&mut tx).await?;
        let cl_meta = fetch_cl_meta(&mut tx).await?;
        tx.commit().await?;

        Ok(Some(ModuleView {
            module,
            operators,
            keys,
            validators,
            el_meta,
            cl_meta,
        }))
    }
}
