//! SQLite-backed store for player state and the referral ledger.
//!
//! Player documents are stored verbatim as JSON text and merged over the
//! baseline template at read time. Referral registration runs its existence
//! check, ledger insert, and both coin credits inside one immediate
//! transaction so concurrent registrations for the same friend serialize.

use farmsteam_types::{
    baseline_state, credit_coins, merge_with_baseline, Document, ReferralOutcome, REFERRAL_BONUS,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

/// Errors surfaced by the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("referrer and friend are the same user")]
    SelfReferral,
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Merged state for `user_id`.
    ///
    /// Never fails the caller: a missing row, an unreadable row, or an
    /// unparseable document all yield the baseline template. Problems are
    /// logged and masked, not surfaced.
    pub fn load_state(&self, user_id: &str) -> Document {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT state_json FROM user_state WHERE user_id = ?",
                params![user_id],
                |row| row.get::<_, String>(0),
            )
            .optional();
        let raw = match row {
            Ok(Some(raw)) => raw,
            Ok(None) => return baseline_state(),
            Err(err) => {
                warn!(user_id, %err, "state read failed; serving baseline");
                return baseline_state();
            }
        };
        match serde_json::from_str::<Document>(&raw) {
            Ok(stored) => merge_with_baseline(stored),
            Err(err) => {
                warn!(user_id, %err, "stored state unparseable; serving baseline");
                baseline_state()
            }
        }
    }

    /// Store `state` verbatim as the complete document for `user_id`.
    pub fn save_state(&self, user_id: &str, state: &Document) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(state)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_state (user_id, state_json) VALUES (?, ?)
             ON CONFLICT(user_id) DO UPDATE SET state_json = excluded.state_json",
            params![user_id, encoded],
        )?;
        Ok(())
    }

    /// Record a referral and grant the one-time bonus to both parties.
    ///
    /// The ledger check, insert, and both credits commit as one unit. A
    /// friend who already has a referral record gets
    /// [`ReferralOutcome::AlreadyRegistered`] with no mutation, whoever the
    /// recorded referrer was.
    pub fn register_referral(
        &self,
        referrer_id: &str,
        friend_id: &str,
    ) -> Result<ReferralOutcome, StoreError> {
        if referrer_id == friend_id {
            return Err(StoreError::SelfReferral);
        }
        let mut conn = self.conn.lock().unwrap();
        // Immediate mode takes the write lock before the existence check,
        // which is what keeps two concurrent registrations for the same
        // friend from both passing it.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let registered = tx
            .query_row(
                "SELECT 1 FROM referrals WHERE friend_id = ?",
                params![friend_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if registered {
            return Ok(ReferralOutcome::AlreadyRegistered);
        }
        tx.execute(
            "INSERT INTO referrals (friend_id, referrer_id) VALUES (?, ?)",
            params![friend_id, referrer_id],
        )?;
        for user_id in [referrer_id, friend_id] {
            credit_user(&tx, user_id, REFERRAL_BONUS)?;
        }
        tx.commit()?;
        Ok(ReferralOutcome::Registered {
            bonus: REFERRAL_BONUS,
        })
    }

    /// Recorded referrer for `friend_id`, if any.
    pub fn referrer_of(&self, friend_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let referrer = conn
            .query_row(
                "SELECT referrer_id FROM referrals WHERE friend_id = ?",
                params![friend_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(referrer)
    }

    /// Number of stored user state rows.
    pub fn user_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM user_state", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Number of referral ledger rows.
    pub fn referral_count(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM referrals", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA busy_timeout=5000;
         CREATE TABLE IF NOT EXISTS user_state (
             user_id TEXT PRIMARY KEY,
             state_json TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS referrals (
             friend_id TEXT PRIMARY KEY,
             referrer_id TEXT NOT NULL
         );",
    )?;
    Ok(())
}

/// Add `bonus` coins to a user's raw stored document, creating it from the
/// baseline when absent. Runs inside the caller's transaction.
fn credit_user(conn: &Connection, user_id: &str, bonus: u64) -> Result<(), StoreError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT state_json FROM user_state WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )
        .optional()?;
    let mut document = match raw {
        Some(raw) => match serde_json::from_str::<Document>(&raw) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(user_id, %err, "stored state unparseable; crediting a baseline copy");
                baseline_state()
            }
        },
        None => baseline_state(),
    };
    credit_coins(&mut document, bonus);
    let encoded = serde_json::to_string(&document)?;
    conn.execute(
        "INSERT INTO user_state (user_id, state_json) VALUES (?, ?)
         ON CONFLICT(user_id) DO UPDATE SET state_json = excluded.state_json",
        params![user_id, encoded],
    )?;
    Ok(())
}
