//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::types::{CacheGeneration, GenerationKind, RequestKey, ResponseRecord};
use crate::db::Database;

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Create a generation. Creating an existing generation is a no-op.
  fn create_generation(&self, generation: &CacheGeneration) -> Result<()>;

  /// Whether a generation with this name exists.
  fn has_generation(&self, name: &str) -> Result<bool>;

  /// All generations, oldest first.
  fn list_generations(&self) -> Result<Vec<CacheGeneration>>;

  /// Delete a generation and every entry in it. Returns false if it did not exist.
  fn delete_generation(&self, name: &str) -> Result<bool>;

  /// Look up a stored response.
  fn get_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<ResponseRecord>>;

  /// Store a response, overwriting any previous record for the key.
  fn put_entry(&self, generation: &str, key: &RequestKey, record: &ResponseRecord) -> Result<()>;

  /// Keys stored in a generation.
  fn keys(&self, generation: &str) -> Result<Vec<RequestKey>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Standalone in-memory storage.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    Ok(Self::new(Arc::new(Database::open_in_memory()?)))
  }
}

impl CacheStorage for SqliteStorage {
  fn create_generation(&self, generation: &CacheGeneration) -> Result<()> {
    self
      .db
      .conn()?
      .execute(
        "INSERT OR IGNORE INTO cache_generations (name, kind, version, created_at)
         VALUES (?, ?, ?, ?)",
        params![
          generation.name,
          generation.kind.as_str(),
          generation.version,
          format_datetime(&generation.created_at)
        ],
      )
      .map_err(|e| eyre!("Failed to create generation {}: {}", generation.name, e))?;
    Ok(())
  }

  fn has_generation(&self, name: &str) -> Result<bool> {
    let found: Option<i64> = self
      .db
      .conn()?
      .query_row(
        "SELECT 1 FROM cache_generations WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up generation {}: {}", name, e))?;
    Ok(found.is_some())
  }

  fn list_generations(&self) -> Result<Vec<CacheGeneration>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT name, kind, version, created_at FROM cache_generations
         ORDER BY created_at, name",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, String, String, String)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
      .map_err(|e| eyre!("Failed to list generations: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    rows
      .into_iter()
      .map(|(name, kind, version, created_at)| {
        let kind =
          GenerationKind::parse(&kind).ok_or_else(|| eyre!("Unknown generation kind '{}'", kind))?;
        Ok(CacheGeneration {
          name,
          kind,
          version,
          created_at: parse_datetime(&created_at)?,
        })
      })
      .collect()
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    let conn = self.db.conn()?;

    conn
      .execute("BEGIN TRANSACTION", [])
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    // Foreign keys are off by default in SQLite, so entries go explicitly
    let result = conn
      .execute(
        "DELETE FROM cache_entries WHERE generation = ?",
        params![name],
      )
      .and_then(|_| {
        conn.execute(
          "DELETE FROM cache_generations WHERE name = ?",
          params![name],
        )
      });

    match result {
      Ok(removed) => {
        conn
          .execute("COMMIT", [])
          .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
        Ok(removed > 0)
      }
      Err(e) => {
        let _ = conn.execute("ROLLBACK", []);
        Err(eyre!("Failed to delete generation {}: {}", name, e))
      }
    }
  }

  fn get_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<ResponseRecord>> {
    let conn = self.db.conn()?;

    let row: Option<(u16, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, stored_at FROM cache_entries
         WHERE generation = ? AND key_hash = ?",
        params![generation, key.cache_hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry {}: {}", key.url, e))?;

    match row {
      Some((status, headers, body, stored_at)) => {
        let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers for {}: {}", key.url, e))?;
        Ok(Some(ResponseRecord {
          status,
          headers,
          body,
          stored_at: parse_datetime(&stored_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put_entry(&self, generation: &str, key: &RequestKey, record: &ResponseRecord) -> Result<()> {
    if !key.is_get() {
      return Err(eyre!("Refusing to cache {} {}", key.method, key.url));
    }

    let headers = serde_json::to_string(&record.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    self
      .db
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO cache_entries
           (generation, key_hash, method, url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          generation,
          key.cache_hash(),
          key.method,
          key.url,
          record.status,
          headers,
          record.body,
          format_datetime(&record.stored_at)
        ],
      )
      .map_err(|e| eyre!("Failed to store cache entry {}: {}", key.url, e))?;

    Ok(())
  }

  fn keys(&self, generation: &str) -> Result<Vec<RequestKey>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT method, url FROM cache_entries WHERE generation = ? ORDER BY url")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![generation], |row| {
        Ok(RequestKey {
          method: row.get(0)?,
          url: row.get(1)?,
        })
      })
      .map_err(|e| eyre!("Failed to list keys of {}: {}", generation, e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(keys)
  }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

/// Parse a stored timestamp: RFC 3339, or SQLite's "YYYY-MM-DD HH:MM:SS".
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn record(status: u16, body: &str) -> ResponseRecord {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    ResponseRecord {
      status,
      headers,
      body: body.as_bytes().to_vec(),
      stored_at: Utc::now(),
    }
  }

  fn key(path: &str) -> RequestKey {
    RequestKey::get(&Url::parse("https://app.tikpluse.com").unwrap().join(path).unwrap())
  }

  #[test]
  fn test_put_overwrites_last_write_wins() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let gen = CacheGeneration::new("t", GenerationKind::Dynamic, "v1");
    storage.create_generation(&gen).unwrap();

    storage.put_entry(&gen.name, &key("/a"), &record(200, "first")).unwrap();
    storage.put_entry(&gen.name, &key("/a"), &record(200, "second")).unwrap();

    let stored = storage.get_entry(&gen.name, &key("/a")).unwrap().unwrap();
    assert_eq!(stored.body, b"second");
    assert_eq!(stored.headers.get("content-type").unwrap(), "application/json");
    assert_eq!(storage.keys(&gen.name).unwrap().len(), 1);
  }

  #[test]
  fn test_refuses_non_get_keys() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let gen = CacheGeneration::new("t", GenerationKind::Dynamic, "v1");
    storage.create_generation(&gen).unwrap();

    let post = RequestKey {
      method: "POST".to_string(),
      url: "https://app.tikpluse.com/api/v1/tickets".to_string(),
    };
    assert!(storage.put_entry(&gen.name, &post, &record(201, "{}")).is_err());
    assert!(storage.keys(&gen.name).unwrap().is_empty());
  }

  #[test]
  fn test_delete_generation_removes_entries() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let old = CacheGeneration::new("t", GenerationKind::Static, "v1");
    let new = CacheGeneration::new("t", GenerationKind::Static, "v2");
    storage.create_generation(&old).unwrap();
    storage.create_generation(&new).unwrap();
    storage.put_entry(&old.name, &key("/"), &record(200, "old")).unwrap();

    assert!(storage.delete_generation(&old.name).unwrap());
    assert!(!storage.delete_generation(&old.name).unwrap());
    assert!(!storage.has_generation(&old.name).unwrap());
    assert!(storage.get_entry(&old.name, &key("/")).unwrap().is_none());

    let names: Vec<String> = storage
      .list_generations()
      .unwrap()
      .into_iter()
      .map(|g| g.name)
      .collect();
    assert_eq!(names, vec![new.name]);
  }

  #[test]
  fn test_create_generation_is_idempotent() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let gen = CacheGeneration::new("t", GenerationKind::Static, "v1");
    storage.create_generation(&gen).unwrap();
    storage.create_generation(&gen).unwrap();
    assert_eq!(storage.list_generations().unwrap().len(), 1);
  }

  #[test]
  fn test_parse_sqlite_datetime() {
    let dt = parse_datetime("2024-03-01 12:30:00").unwrap();
    assert_eq!(dt.to_rfc3339(), "2024-03-01T12:30:00+00:00");
  }
}
