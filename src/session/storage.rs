//! Session storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::Session;

/// Trait for session persistence backends.
pub trait SessionStorage: Send + Sync {
  /// Load the persisted session, if any.
  fn load(&self) -> Result<Option<Session>>;

  /// Persist the session, replacing any previous one.
  fn save(&self, session: &Session) -> Result<()>;

  /// Forget the persisted session.
  fn clear(&self) -> Result<()>;
}

impl<T: SessionStorage + ?Sized> SessionStorage for Box<T> {
  fn load(&self) -> Result<Option<Session>> {
    (**self).load()
  }

  fn save(&self, session: &Session) -> Result<()> {
    (**self).save(session)
  }

  fn clear(&self) -> Result<()> {
    (**self).clear()
  }
}

/// Storage that keeps nothing across restarts.
/// Used when session persistence is disabled.
pub struct NoopSessionStorage;

impl SessionStorage for NoopSessionStorage {
  fn load(&self) -> Result<Option<Session>> {
    Ok(None)
  }

  fn save(&self, _session: &Session) -> Result<()> {
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// SQLite-backed session storage.
///
/// Sessions are keyed by a hash of the service URL so that signing in to one
/// deployment never restores a user against another.
pub struct SqliteSessionStorage {
  conn: Mutex<Connection>,
  scope: String,
}

impl SqliteSessionStorage {
  /// Open the session database at `path`, or the default location.
  pub fn open(path: Option<&Path>, service_url: &str) -> Result<Self> {
    let path = match path {
      Some(path) => path.to_path_buf(),
      None => Self::default_path()?,
    };

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create session directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open session database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
      scope: scope_key(service_url),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("classbook").join("session.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SESSION_SCHEMA)
      .map_err(|e| eyre!("Failed to run session migrations: {}", e))?;

    Ok(())
  }
}

const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session (
    scope TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    saved_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Hex SHA-256 of the normalized service URL.
pub fn scope_key(service_url: &str) -> String {
  let normalized = service_url.trim().trim_end_matches('/').to_lowercase();
  hex::encode(Sha256::digest(normalized.as_bytes()))
}

impl SessionStorage for SqliteSessionStorage {
  fn load(&self) -> Result<Option<Session>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data: Option<Vec<u8>> = conn
      .query_row(
        "SELECT data FROM session WHERE scope = ?",
        params![self.scope],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read session: {}", e))?;

    data
      .map(|data| {
        serde_json::from_slice(&data).map_err(|e| eyre!("Failed to deserialize session: {}", e))
      })
      .transpose()
  }

  fn save(&self, session: &Session) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data =
      serde_json::to_vec(session).map_err(|e| eyre!("Failed to serialize session: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO session (scope, data, saved_at)
         VALUES (?, ?, datetime('now'))",
        params![self.scope, data],
      )
      .map_err(|e| eyre!("Failed to store session: {}", e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM session WHERE scope = ?", params![self.scope])
      .map_err(|e| eyre!("Failed to clear session: {}", e))?;

    Ok(())
  }
}
