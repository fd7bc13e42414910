use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::{CredentialStore, UserCredential};

const SCHEMA_VERSION: i64 = 1;

const CREDENTIAL_TABLE: &str = "CREATE TABLE IF NOT EXISTS spotify_credential (user_id TEXT NOT NULL PRIMARY KEY, access_token TEXT NOT NULL, refresh_token TEXT NOT NULL, expires_at INTEGER NOT NULL, updated INTEGER DEFAULT (cast(strftime('%s','now') as int)))";

pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

fn millis_to_datetime(millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(3, millis)
    })
}

fn row_to_credential(row: &rusqlite::Row) -> rusqlite::Result<UserCredential> {
    Ok(UserCredential {
        user_id: row.get(0)?,
        access_token: row.get(1)?,
        refresh_token: row.get(2)?,
        expires_at: millis_to_datetime(row.get(3)?)?,
    })
}

impl SqliteCredentialStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        info!("opened credential database at {}", path.display());
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        match version {
            0 => {
                conn.execute(CREDENTIAL_TABLE, [])?;
                conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;
            }
            SCHEMA_VERSION => {}
            other => bail!(
                "unsupported credential database version {} (expected {})",
                other,
                SCHEMA_VERSION
            ),
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM spotify_credential", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn upsert(&self, credential: &UserCredential) -> Result<()> {
        self.conn().execute(
            "INSERT INTO spotify_credential (user_id, access_token, refresh_token, expires_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(user_id) DO UPDATE SET access_token = excluded.access_token, refresh_token = excluded.refresh_token, expires_at = excluded.expires_at, updated = cast(strftime('%s','now') as int)",
            params![
                credential.user_id,
                credential.access_token,
                credential.refresh_token,
                credential.expires_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn get(&self, user_id: &str) -> Result<Option<UserCredential>> {
        let credential = self
            .conn()
            .query_row(
                "SELECT user_id, access_token, refresh_token, expires_at FROM spotify_credential WHERE user_id = ?1",
                params![user_id],
                row_to_credential,
            )
            .optional()?;
        Ok(credential)
    }

    fn update_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE spotify_credential SET access_token = ?2, refresh_token = COALESCE(?3, refresh_token), expires_at = ?4, updated = cast(strftime('%s','now') as int) WHERE user_id = ?1",
            params![user_id, access_token, refresh_token, expires_at.timestamp_millis()],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, user_id: &str) -> Result<bool> {
        let changed = self.conn().execute(
            "DELETE FROM spotify_credential WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(changed > 0)
    }
}
