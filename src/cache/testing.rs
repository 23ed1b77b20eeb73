//! Storage double whose operations can be made to fail.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::storage::{CacheStorage, SqliteStorage};
use super::types::{CacheGeneration, RequestKey, ResponseRecord};

/// In-memory SQLite storage with switchable read, write and delete failures.
pub struct FailingStorage {
  inner: SqliteStorage,
  fail_reads: AtomicBool,
  fail_writes: AtomicBool,
  undeletable: Mutex<HashSet<String>>,
}

impl FailingStorage {
  pub fn new() -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
      fail_reads: AtomicBool::new(false),
      fail_writes: AtomicBool::new(false),
      undeletable: Mutex::new(HashSet::new()),
    }
  }

  pub fn fail_reads(&self, on: bool) {
    self.fail_reads.store(on, Ordering::SeqCst);
  }

  /// Entry writes fail; generation bookkeeping still works.
  pub fn fail_writes(&self, on: bool) {
    self.fail_writes.store(on, Ordering::SeqCst);
  }

  pub fn refuse_delete(&self, name: &str) {
    self.undeletable.lock().unwrap().insert(name.to_string());
  }
}

impl CacheStorage for FailingStorage {
  fn create_generation(&self, generation: &CacheGeneration) -> Result<()> {
    self.inner.create_generation(generation)
  }

  fn has_generation(&self, name: &str) -> Result<bool> {
    self.inner.has_generation(name)
  }

  fn list_generations(&self) -> Result<Vec<CacheGeneration>> {
    self.inner.list_generations()
  }

  fn delete_generation(&self, name: &str) -> Result<bool> {
    if self.undeletable.lock().unwrap().contains(name) {
      return Err(eyre!("disk I/O error deleting {}", name));
    }
    self.inner.delete_generation(name)
  }

  fn get_entry(&self, generation: &str, key: &RequestKey) -> Result<Option<ResponseRecord>> {
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(eyre!("database is locked"));
    }
    self.inner.get_entry(generation, key)
  }

  fn put_entry(&self, generation: &str, key: &RequestKey, record: &ResponseRecord) -> Result<()> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(eyre!("database or disk is full"));
    }
    self.inner.put_entry(generation, key, record)
  }

  fn keys(&self, generation: &str) -> Result<Vec<RequestKey>> {
    self.inner.keys(generation)
  }
}
