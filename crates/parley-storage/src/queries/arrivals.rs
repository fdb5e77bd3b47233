// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Arrival rows: inbound records stamped with an ordering counter value.

use chrono::SecondsFormat;
use parley_core::types::Arrival;
use parley_core::ParleyError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Persist one arrival.
pub async fn insert_arrival(db: &Database, arrival: &Arrival) -> Result<(), ParleyError> {
    let counter = i64::try_from(arrival.counter).map_err(|_| ParleyError::Storage {
        source: format!("counter value {} exceeds SQLite INTEGER range", arrival.counter).into(),
    })?;
    let arrival = arrival.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO arrivals (id, local_id, counter, received_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    arrival.id,
                    arrival.local_id.as_str(),
                    counter,
                    arrival
                        .received_at
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Highest counter value ever stamped on an arrival, `None` when empty.
pub async fn max_counter(db: &Database) -> Result<Option<u64>, ParleyError> {
    let max = db
        .connection()
        .call(|conn| -> Result<Option<i64>, rusqlite::Error> {
            conn.query_row("SELECT MAX(counter) FROM arrivals", [], |row| row.get(0))
        })
        .await
        .map_err(map_tr_err)?;

    // Negative values cannot be written through insert_arrival; clamp anything
    // injected out of band rather than wrapping.
    Ok(max.map(|v| u64::try_from(v).unwrap_or(0)))
}
