//! Per-user daily quota persisted in SQLite.
//!
//! One row per user: request count and the timestamp of the last reset.
//! The count resets to 1 the first time a request arrives on a new UTC
//! calendar day.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS users (
    user_id INTEGER PRIMARY KEY,
    daily_count INTEGER NOT NULL DEFAULT 0,
    last_reset TEXT NOT NULL
)";

pub struct QuotaStore {
    conn: Mutex<Connection>,
    daily_limit: u32,
}

impl QuotaStore {
    /// Open or create the quota database.
    pub fn open(path: &Path, daily_limit: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            daily_limit,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory(daily_limit: u32) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            daily_limit,
        })
    }

    /// Insert a fresh zero-count row for this user if none exists yet.
    /// An existing row is left untouched.
    pub fn ensure_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO users (user_id, daily_count, last_reset) VALUES (?1, 0, ?2)",
            params![user_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    /// Check the user's daily allowance and consume one unit if available.
    ///
    /// The whole read-modify-write runs under the connection lock, so two
    /// near-simultaneous checks for the same user cannot both pass on the
    /// last remaining unit.
    pub fn check_and_consume(&self, user_id: i64, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;

        let row: Option<(u32, String)> = conn
            .query_row(
                "SELECT daily_count, last_reset FROM users WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((count, last_reset)) = row else {
            conn.execute(
                "INSERT INTO users (user_id, daily_count, last_reset) VALUES (?1, 1, ?2)",
                params![user_id, now.to_rfc3339()],
            )?;
            return Ok(true);
        };

        if parse_reset(&last_reset).date_naive() != now.date_naive() {
            conn.execute(
                "UPDATE users SET daily_count = 1, last_reset = ?1 WHERE user_id = ?2",
                params![now.to_rfc3339(), user_id],
            )?;
            return Ok(true);
        }

        if count < self.daily_limit {
            conn.execute(
                "UPDATE users SET daily_count = daily_count + 1 WHERE user_id = ?1",
                params![user_id],
            )?;
            return Ok(true);
        }

        debug!(
            "User {user_id} exhausted daily quota ({count}/{})",
            self.daily_limit
        );
        Ok(false)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("quota store lock poisoned: {e}"))
    }
}

fn parse_reset(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn noon(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    fn stored_count(store: &QuotaStore, user_id: i64) -> u32 {
        store
            .conn
            .lock()
            .unwrap()
            .query_row(
                "SELECT daily_count FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .unwrap()
    }

    #[test]
    fn first_check_creates_row_at_one() {
        let store = QuotaStore::in_memory(3).expect("store");
        assert!(store.check_and_consume(7, noon(2025, 5, 10)).expect("check"));
        assert_eq!(stored_count(&store, 7), 1);
    }

    #[test]
    fn fourth_check_on_same_day_is_denied() {
        let store = QuotaStore::in_memory(3).expect("store");
        let now = noon(2025, 5, 10);
        for _ in 0..3 {
            assert!(store.check_and_consume(7, now).expect("check"));
        }
        assert!(!store.check_and_consume(7, now).expect("check"));
        // denial mutates nothing
        assert_eq!(stored_count(&store, 7), 3);
        assert!(!store.check_and_consume(7, now).expect("check"));
    }

    #[test]
    fn date_rollover_resets_to_one() {
        let store = QuotaStore::in_memory(3).expect("store");
        let day_one = noon(2025, 5, 10);
        for _ in 0..3 {
            assert!(store.check_and_consume(7, day_one).expect("check"));
        }
        assert!(!store.check_and_consume(7, day_one).expect("check"));

        let day_two = noon(2025, 5, 11);
        assert!(store.check_and_consume(7, day_two).expect("check"));
        assert_eq!(stored_count(&store, 7), 1);
    }

    #[test]
    fn rollover_succeeds_even_below_limit() {
        let store = QuotaStore::in_memory(3).expect("store");
        assert!(store.check_and_consume(7, noon(2025, 5, 10)).expect("check"));
        assert!(store.check_and_consume(7, noon(2025, 5, 12)).expect("check"));
        assert_eq!(stored_count(&store, 7), 1);
    }

    #[test]
    fn ensure_user_creates_zero_row_once() {
        let store = QuotaStore::in_memory(3).expect("store");
        let now = noon(2025, 5, 10);
        store.ensure_user(7, now).expect("ensure");
        assert_eq!(stored_count(&store, 7), 0);

        // first real check still only spends one unit
        assert!(store.check_and_consume(7, now).expect("check"));
        assert_eq!(stored_count(&store, 7), 1);

        // a repeat /start must not reset the count
        store.ensure_user(7, now).expect("ensure");
        assert_eq!(stored_count(&store, 7), 1);
    }

    #[test]
    fn users_have_independent_quotas() {
        let store = QuotaStore::in_memory(3).expect("store");
        let now = noon(2025, 5, 10);
        for _ in 0..3 {
            assert!(store.check_and_consume(1, now).expect("check"));
        }
        assert!(!store.check_and_consume(1, now).expect("check"));
        assert!(store.check_and_consume(2, now).expect("check"));
    }

    #[test]
    fn concurrent_checks_never_overspend() {
        let store = Arc::new(QuotaStore::in_memory(3).expect("store"));
        let now = noon(2025, 5, 10);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.check_and_consume(7, now).expect("check"))
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .filter(|&allowed| allowed)
            .count();
        assert_eq!(allowed, 3);
        assert_eq!(stored_count(&store, 7), 3);
    }
}
