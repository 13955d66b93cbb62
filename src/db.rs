use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::error::MirrorError;
use crate::settings::CleanupConfig;

pub struct Database {
    conn: Mutex<Connection>,
}

/// Outcome of the atomic admission check for one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The message is new; its record and any new codes are committed.
    Accepted { new_codes: Vec<String> },
    /// This (chat, message) pair was already processed.
    DuplicateMessage,
    /// Every extracted code was already known; the message is a re-post.
    DuplicateCode { known_codes: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCount {
    pub chat_id: i64,
    pub messages: i64,
}

fn utc_now_string() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Database {
    pub fn new(data_dir: &str) -> Result<Self, MirrorError> {
        let db_path = Path::new(data_dir).join("tgmirror.db");
        std::fs::create_dir_all(data_dir)?;

        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS processed (
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (chat_id, message_id)
            );

            CREATE INDEX IF NOT EXISTS idx_processed_created_at
                ON processed(created_at);

            CREATE TABLE IF NOT EXISTS codes (
                code TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_codes_created_at
                ON codes(created_at);

            CREATE TABLE IF NOT EXISTS cleanup_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                retention_days INTEGER NOT NULL,
                run_time TEXT NOT NULL,
                dedup_pattern TEXT NOT NULL
            );",
        )?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// Identity lookup, code-set lookup, and conditional inserts as one
    /// transaction. Two concurrent deliveries of the same message serialize
    /// here, so exactly one of them is `Accepted`.
    ///
    /// A message whose entire non-empty code set is already known is recorded
    /// in `processed` anyway, so its redelivery is later rejected by identity
    /// without re-checking codes.
    pub fn admit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        codes: &[String],
    ) -> Result<Admission, MirrorError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = utc_now_string();

        let seen = {
            let mut stmt =
                tx.prepare("SELECT 1 FROM processed WHERE chat_id = ?1 AND message_id = ?2")?;
            stmt.exists(params![chat_id, message_id])?
        };
        if seen {
            return Ok(Admission::DuplicateMessage);
        }

        let known_codes = {
            let mut stmt = tx.prepare("SELECT 1 FROM codes WHERE code = ?1")?;
            let mut known = Vec::new();
            for code in codes {
                if stmt.exists(params![code])? {
                    known.push(code.clone());
                }
            }
            known
        };

        if !codes.is_empty() && known_codes.len() == codes.len() {
            tx.execute(
                "INSERT INTO processed (chat_id, message_id, created_at) VALUES (?1, ?2, ?3)",
                params![chat_id, message_id, now],
            )?;
            tx.commit()?;
            return Ok(Admission::DuplicateCode { known_codes });
        }

        tx.execute(
            "INSERT INTO processed (chat_id, message_id, created_at) VALUES (?1, ?2, ?3)",
            params![chat_id, message_id, now],
        )?;
        let new_codes = {
            let mut stmt =
                tx.prepare("INSERT OR IGNORE INTO codes (code, created_at) VALUES (?1, ?2)")?;
            let mut inserted = Vec::new();
            for code in codes {
                if stmt.execute(params![code, now])? > 0 {
                    inserted.push(code.clone());
                }
            }
            inserted
        };
        tx.commit()?;

        Ok(Admission::Accepted { new_codes })
    }

    pub fn is_processed(&self, chat_id: i64, message_id: i64) -> Result<bool, MirrorError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT 1 FROM processed WHERE chat_id = ?1 AND message_id = ?2")?;
        Ok(stmt.exists(params![chat_id, message_id])?)
    }

    pub fn code_exists(&self, code: &str) -> Result<bool, MirrorError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT 1 FROM codes WHERE code = ?1")?;
        Ok(stmt.exists(params![code])?)
    }

    /// Deletes message records and codes older than `days`. A retention of 0
    /// deletes nothing. Returns (messages, codes) removed.
    pub fn delete_older_than(&self, days: u32) -> Result<(usize, usize), MirrorError> {
        if days == 0 {
            return Ok((0, 0));
        }
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(days as i64)).to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let messages = conn.execute(
            "DELETE FROM processed WHERE created_at < ?1",
            params![cutoff],
        )?;
        let codes = conn.execute("DELETE FROM codes WHERE created_at < ?1", params![cutoff])?;
        Ok((messages, codes))
    }

    /// Unconditionally wipes all message records and codes. Returns
    /// (messages, codes) removed.
    pub fn clear_all(&self) -> Result<(usize, usize), MirrorError> {
        let conn = self.conn.lock().unwrap();
        let messages = conn.execute("DELETE FROM processed", [])?;
        let codes = conn.execute("DELETE FROM codes", [])?;
        Ok((messages, codes))
    }

    pub fn processed_count(&self) -> Result<i64, MirrorError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM processed", [], |row| row.get(0))?)
    }

    pub fn code_count(&self) -> Result<i64, MirrorError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM codes", [], |row| row.get(0))?)
    }

    pub fn processed_counts_by_chat(&self) -> Result<Vec<ChatCount>, MirrorError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT chat_id, COUNT(*) FROM processed GROUP BY chat_id ORDER BY chat_id",
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok(ChatCount {
                    chat_id: row.get(0)?,
                    messages: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    pub fn load_cleanup_config(&self) -> Result<Option<CleanupConfig>, MirrorError> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT retention_days, run_time, dedup_pattern FROM cleanup_config WHERE id = 1",
            [],
            |row| {
                Ok(CleanupConfig {
                    retention_days: row.get(0)?,
                    run_time: row.get(1)?,
                    dedup_pattern: row.get(2)?,
                })
            },
        );
        match result {
            Ok(cfg) => Ok(Some(cfg)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save_cleanup_config(&self, cfg: &CleanupConfig) -> Result<(), MirrorError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cleanup_config (id, retention_days, run_time, dedup_pattern)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                retention_days = ?1,
                run_time = ?2,
                dedup_pattern = ?3",
            params![cfg.retention_days, cfg.run_time, cfg.dedup_pattern],
        )?;
        Ok(())
    }

    /// Cheap liveness probe for the health endpoint.
    pub fn ping(&self) -> Result<(), MirrorError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    #[cfg(test)]
    fn set_record_age(&self, chat_id: i64, message_id: i64, created_at: &str) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE processed SET created_at = ?1 WHERE chat_id = ?2 AND message_id = ?3",
            params![created_at, chat_id, message_id],
        )
        .unwrap();
    }

    #[cfg(test)]
    fn set_code_age(&self, code: &str, created_at: &str) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE codes SET created_at = ?1 WHERE code = ?2",
            params![created_at, code],
        )
        .unwrap();
    }
}
