use sqlx::PgConnection;
use sqlx::Postgres;
use sqlx::QueryBuilder;

use super::from_db_int;
use super::to_db_int;
use super::MAX_PARAMS;
use crate::models::Validator;
use crate::Result;
use crate::StakeKeysError;

const PARAMS_PER_ROW: usize = 3; // validator_index, pubkey, status
const CHUNK_SIZE: usize = MAX_PARAMS / PARAMS_PER_ROW;

/// Swap the stored validator set for `validators`
pub(super) async fn replace_validators(
    conn: &mut PgConnection,
    validators: &[Validator],
) -> Result<()> {
    sqlx::query("DELETE FROM consensus_validators")
        .execute(&mut *conn)
        .await?;

    let rows = validators
        .iter()
        .map(|v| {
            Ok((
                to_db_int(v.index, "validator_index")?,
                v.pubkey.to_lowercase(),
                v.status.as_str(),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    for chunk in rows.chunks(CHUNK_SIZE) {
        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO consensus_validators (validator_index, pubkey, status) ");
        query_builder.push_values(chunk, |mut b, (index, pubkey, status)| {
            b.push_bind(*index).push_bind(pubkey.clone()).push_bind(*status);
        });
        query_builder.build().execute(&mut *conn).await?;
    }

    tracing::debug!("Stored {} validators", validators.len());
    Ok(())
}

/// Validators whose pubkey is in `pubkeys`
pub(super) async fn fetch_validators_by_pubkeys(
    conn: &mut PgConnection,
    pubkeys: &[String],
) -> Result<Vec<Validator>> {
    if pubkeys.is_empty() {
        return Ok(Vec::new());
    }

    let lowered: Vec<String> = pubkeys.iter().map(|k| k.to_lowercase()).collect();
    let rows: Vec<(i64, String, String)> = sqlx::query_as(
        "SELECT validator_index, pubkey, status FROM consensus_validators WHERE pubkey = ANY($1) ORDER BY validator_index",
    )
    .bind(&lowered)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|(index, pubkey, status)| {
            Ok(Validator {
                index: from_db_int(index, "validator_index")?,
                pubkey,
                status: status.parse().map_err(StakeKeysError::Storage)?,
            })
        })
        .collect()
}
