// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity record persistence.
//!
//! Timestamps are stored as RFC 3339 text with millisecond precision.
//! Phone numbers and account ids are re-validated on read so a hand-edited
//! database cannot smuggle non-canonical identifiers into the directory.

use chrono::{DateTime, SecondsFormat, Utc};
use parley_core::types::{AccountId, IdentityRecord, LocalId, PhoneNumber, RecordChange};
use parley_core::ParleyError;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::database::{map_tr_err, Database};

const SELECT_COLUMNS: &str = "SELECT local_id, phone_number, account_id, secondary_id, \
     unregistered_at, updated_at FROM identity_records";

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_ts(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn row_to_record(row: &Row<'_>) -> Result<IdentityRecord, rusqlite::Error> {
    let phone_number = row
        .get::<_, Option<String>>(1)?
        .map(|raw| PhoneNumber::parse(&raw).map_err(|e| conversion_err(1, e)))
        .transpose()?;
    let account_id = row
        .get::<_, Option<String>>(2)?
        .map(|raw| AccountId::parse(&raw).map_err(|e| conversion_err(2, e)))
        .transpose()?;
    let unregistered_at = row
        .get::<_, Option<String>>(4)?
        .map(|raw| parse_ts(4, &raw))
        .transpose()?;
    let updated_at = parse_ts(5, &row.get::<_, String>(5)?)?;

    Ok(IdentityRecord {
        local_id: LocalId(row.get(0)?),
        phone_number,
        account_id,
        secondary_id: row.get(3)?,
        unregistered_at,
        updated_at,
    })
}

fn upsert_in(conn: &Connection, record: &IdentityRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO identity_records
             (local_id, phone_number, account_id, secondary_id, unregistered_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(local_id) DO UPDATE SET
             phone_number = excluded.phone_number,
             account_id = excluded.account_id,
             secondary_id = excluded.secondary_id,
             unregistered_at = excluded.unregistered_at,
             updated_at = excluded.updated_at",
        params![
            record.local_id.as_str(),
            record.phone_number.as_ref().map(PhoneNumber::as_str),
            record.account_id.as_ref().map(AccountId::as_str),
            record.secondary_id,
            record.unregistered_at.as_ref().map(format_ts),
            format_ts(&record.updated_at),
        ],
    )?;
    Ok(())
}

fn remove_in(conn: &Connection, local_id: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "DELETE FROM identity_records WHERE local_id = ?1",
        params![local_id],
    )?;
    Ok(())
}

/// Insert or replace a record keyed by its local id.
pub async fn upsert_record(db: &Database, record: &IdentityRecord) -> Result<(), ParleyError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> { upsert_in(conn, &record) })
        .await
        .map_err(map_tr_err)
}

/// Fetch one record by local id.
pub async fn get_record(
    db: &Database,
    local_id: &LocalId,
) -> Result<Option<IdentityRecord>, ParleyError> {
    let id = local_id.0.clone();
    db.connection()
        .call(move |conn| -> Result<Option<IdentityRecord>, rusqlite::Error> {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE local_id = ?1"),
                params![id],
                row_to_record,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All records, oldest update first.
pub async fn list_records(db: &Database) -> Result<Vec<IdentityRecord>, ParleyError> {
    db.connection()
        .call(|conn| -> Result<Vec<IdentityRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY updated_at, local_id"))?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a record. Deleting an unknown id is a no-op.
pub async fn remove_record(db: &Database, local_id: &LocalId) -> Result<(), ParleyError> {
    let id = local_id.0.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> { remove_in(conn, &id) })
        .await
        .map_err(map_tr_err)
}

/// Apply a reconciliation's writes in order inside one transaction.
///
/// Either every change lands or none does. Order matters because the
/// `phone_number` and `account_id` columns are UNIQUE: the record giving up
/// an identifier must be written before the record taking it.
pub async fn apply_changes(db: &Database, changes: &[RecordChange]) -> Result<(), ParleyError> {
    if changes.is_empty() {
        return Ok(());
    }
    let changes = changes.to_vec();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            for change in &changes {
                match change {
                    RecordChange::Put(record) => upsert_in(&tx, record)?,
                    RecordChange::Remove(id) => remove_in(&tx, id.as_str())?,
                }
            }
            tx.commit()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn phone(raw: &str) -> PhoneNumber {
        PhoneNumber::parse(raw).unwrap()
    }

    fn account(raw: &str) -> AccountId {
        AccountId::parse(raw).unwrap()
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn upsert_then_get_preserves_fields() {
        let db = Database::open_in_memory().await.unwrap();
        let mut record = IdentityRecord::new(Some(phone("+13215559876")), Some(account("acct-1")), ts(100));
        record.secondary_id = Some("pni-1".into());
        record.unregistered_at = Some(ts(200));

        upsert_record(&db, &record).await.unwrap();
        let loaded = get_record(&db, &record.local_id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn upsert_overwrites_existing_row() {
        let db = Database::open_in_memory().await.unwrap();
        let mut record = IdentityRecord::new(Some(phone("+13215559876")), None, ts(100));
        upsert_record(&db, &record).await.unwrap();

        record.account_id = Some(account("acct-2"));
        record.updated_at = ts(150);
        upsert_record(&db, &record).await.unwrap();

        let all = list_records(&db).await.unwrap();
        assert_eq!(all, vec![record]);
    }

    #[tokio::test]
    async fn get_missing_record_is_none() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(get_record(&db, &LocalId("nope".into())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_deletes_row() {
        let db = Database::open_in_memory().await.unwrap();
        let record = IdentityRecord::new(None, Some(account("acct-3")), ts(1));
        upsert_record(&db, &record).await.unwrap();
        remove_record(&db, &record.local_id).await.unwrap();
        assert!(list_records(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_changes_moves_phone_between_records() {
        let db = Database::open_in_memory().await.unwrap();
        let old = IdentityRecord::new(Some(phone("+16545559876")), Some(account("old")), ts(1));
        upsert_record(&db, &old).await.unwrap();

        let mut stripped = old.clone();
        stripped.phone_number = None;
        let new = IdentityRecord::new(Some(phone("+16545559876")), Some(account("new")), ts(2));

        apply_changes(
            &db,
            &[RecordChange::Put(stripped.clone()), RecordChange::Put(new.clone())],
        )
        .await
        .unwrap();

        let all = list_records(&db).await.unwrap();
        assert_eq!(all, vec![stripped, new]);
    }

    #[tokio::test]
    async fn apply_changes_is_all_or_nothing() {
        let db = Database::open_in_memory().await.unwrap();
        let holder = IdentityRecord::new(Some(phone("+16545559876")), None, ts(1));
        upsert_record(&db, &holder).await.unwrap();

        // Second put violates the phone UNIQUE constraint; the first must roll back.
        let fresh = IdentityRecord::new(None, Some(account("fresh")), ts(2));
        let clash = IdentityRecord::new(Some(phone("+16545559876")), Some(account("clash")), ts(3));
        let result = apply_changes(
            &db,
            &[RecordChange::Put(fresh), RecordChange::Put(clash)],
        )
        .await;
        assert!(matches!(result, Err(ParleyError::Storage { .. })));
        assert_eq!(list_records(&db).await.unwrap(), vec![holder]);
    }

    #[tokio::test]
    async fn corrupt_phone_column_surfaces_as_storage_error() {
        let db = Database::open_in_memory().await.unwrap();
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO identity_records (local_id, phone_number, updated_at)
                     VALUES ('bad', 'not-a-phone', '2026-01-01T00:00:00.000Z')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        assert!(list_records(&db).await.is_err());
    }
}
