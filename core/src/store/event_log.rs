use super::{from_millis, to_millis, LedgerStore};
use crate::{
    error::LedgerResult,
    event::{EventLogEntry, ReferralEvent},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

/// Append inside whatever transaction `conn` is currently in.
pub(super) fn append(
    conn: &Connection,
    event: &ReferralEvent,
    now: DateTime<Utc>,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO event_log (account_id, event_type, payload, recorded_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            event.subject(),
            event.type_name(),
            serde_json::to_string(event)?,
            to_millis(now),
        ],
    )?;
    Ok(())
}

impl LedgerStore {
    // ── Event log ──────────────────────────────────────────────

    pub fn events_for_account(&self, account_id: &str) -> LedgerResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, account_id, event_type, payload, recorded_at
             FROM event_log WHERE account_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![account_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    account_id: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                    recorded_at: from_millis(row.get(4)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Decoded events for an account, oldest first.
    pub fn decoded_events_for_account(&self, account_id: &str) -> LedgerResult<Vec<ReferralEvent>> {
        self.events_for_account(account_id)?
            .iter()
            .map(|e| serde_json::from_str(&e.payload).map_err(Into::into))
            .collect()
    }
}
