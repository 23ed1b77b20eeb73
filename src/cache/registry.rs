//! Cache generation manager: owns the current static and dynamic generations.

use color_eyre::Result;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use super::storage::CacheStorage;
use super::types::{CacheGeneration, GenerationKind, RequestKey, ResponseRecord};
use crate::error::Failure;
use crate::net::{self, Fetcher, Request, Response};

/// Outcome of populating the static generation.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
  pub generation: String,
  pub cached: Vec<String>,
  pub failed: Vec<String>,
  /// A different static generation was already present, i.e. this is an update
  pub replaced_previous: bool,
}

/// Outcome of purging stale generations.
#[derive(Debug, Clone, Default)]
pub struct ActivateReport {
  pub deleted: Vec<String>,
  pub failed: Vec<String>,
}

/// Explicit registry of the current cache generations.
///
/// Strategies only ever read and write through this value. Stale generations are
/// removed by `activate`, which the host runs before any fetch of the new deploy.
pub struct CacheRegistry {
  storage: Arc<dyn CacheStorage>,
  static_generation: CacheGeneration,
  dynamic_generation: CacheGeneration,
  dynamic_open: AtomicBool,
}

impl CacheRegistry {
  pub fn new(storage: Arc<dyn CacheStorage>, prefix: &str, version: &str) -> Self {
    Self {
      storage,
      static_generation: CacheGeneration::new(prefix, GenerationKind::Static, version),
      dynamic_generation: CacheGeneration::new(prefix, GenerationKind::Dynamic, version),
      dynamic_open: AtomicBool::new(false),
    }
  }

  pub fn static_name(&self) -> &str {
    &self.static_generation.name
  }

  pub fn dynamic_name(&self) -> &str {
    &self.dynamic_generation.name
  }

  fn name_of(&self, kind: GenerationKind) -> &str {
    match kind {
      GenerationKind::Static => self.static_name(),
      GenerationKind::Dynamic => self.dynamic_name(),
    }
  }

  /// Create the static generation and fill it from the manifest.
  ///
  /// Individual asset failures are logged and skipped; only failing to create the
  /// generation itself fails the install.
  pub async fn install(&self, manifest: &[Url], fetcher: &dyn Fetcher) -> Result<InstallReport> {
    let replaced_previous = self
      .storage
      .list_generations()?
      .iter()
      .any(|g| g.kind == GenerationKind::Static && g.name != self.static_generation.name);

    self.storage.create_generation(&self.static_generation)?;

    let fetches = manifest.iter().map(|url| async move {
      let request = Request::get(url.clone());
      (url, net::fetch(fetcher, &request).await)
    });

    let mut report = InstallReport {
      generation: self.static_generation.name.clone(),
      replaced_previous,
      ..Default::default()
    };

    for (url, result) in join_all(fetches).await {
      match result {
        Ok(response) if response.is_success() => {
          let key = RequestKey::get(url);
          match self.storage.put_entry(
            self.static_name(),
            &key,
            &ResponseRecord::from_response(&response),
          ) {
            Ok(()) => report.cached.push(url.to_string()),
            Err(e) => {
              warn!(failure = %Failure::AssetPopulation, url = %url, error = %e, "Failed to store asset");
              report.failed.push(url.to_string());
            }
          }
        }
        Ok(response) => {
          warn!(failure = %Failure::AssetPopulation, url = %url, status = response.status, "Asset returned non-success status");
          report.failed.push(url.to_string());
        }
        Err(e) => {
          warn!(failure = %Failure::AssetPopulation, url = %url, error = %e, "Failed to fetch asset");
          report.failed.push(url.to_string());
        }
      }
    }

    info!(
      generation = %report.generation,
      cached = report.cached.len(),
      failed = report.failed.len(),
      "Static generation installed"
    );

    Ok(report)
  }

  /// Delete every generation that is not current. Never fails.
  pub async fn activate(&self) -> ActivateReport {
    let mut report = ActivateReport::default();

    let generations = match self.storage.list_generations() {
      Ok(generations) => generations,
      Err(e) => {
        warn!(error = %e, "Failed to enumerate cache generations");
        return report;
      }
    };

    for generation in generations {
      if generation.name == self.static_generation.name
        || generation.name == self.dynamic_generation.name
      {
        continue;
      }

      match self.storage.delete_generation(&generation.name) {
        Ok(_) => {
          info!(generation = %generation.name, "Deleted stale cache generation");
          report.deleted.push(generation.name);
        }
        Err(e) => {
          warn!(generation = %generation.name, error = %e, "Failed to delete stale cache generation");
          report.failed.push(generation.name);
        }
      }
    }

    report
  }

  /// Create the dynamic generation on first use.
  fn ensure_dynamic(&self) -> Result<()> {
    if self.dynamic_open.load(Ordering::Acquire) {
      return Ok(());
    }
    if !self.storage.has_generation(self.dynamic_name())? {
      self.storage.create_generation(&self.dynamic_generation)?;
      debug!(generation = %self.dynamic_generation.name, "Opened dynamic generation");
    }
    self.dynamic_open.store(true, Ordering::Release);
    Ok(())
  }

  /// Look up a key in one generation. Read failures are treated as a miss.
  pub fn lookup(&self, kind: GenerationKind, key: &RequestKey) -> Option<ResponseRecord> {
    match self.storage.get_entry(self.name_of(kind), key) {
      Ok(found) => found,
      Err(e) => {
        warn!(failure = %Failure::CacheRead, url = %key.url, error = %e, "Cache read failed");
        None
      }
    }
  }

  /// Look up a key across current generations, static first.
  pub fn match_any(&self, key: &RequestKey) -> Option<ResponseRecord> {
    self
      .lookup(GenerationKind::Static, key)
      .or_else(|| self.lookup(GenerationKind::Dynamic, key))
  }

  /// Store a copy of a response. Write failures are logged; returns whether it was stored.
  pub fn store(&self, kind: GenerationKind, key: &RequestKey, response: &Response) -> bool {
    let result = match kind {
      GenerationKind::Dynamic => self.ensure_dynamic(),
      GenerationKind::Static => Ok(()),
    }
    .and_then(|_| {
      self
        .storage
        .put_entry(self.name_of(kind), key, &ResponseRecord::from_response(response))
    });

    match result {
      Ok(()) => true,
      Err(e) => {
        warn!(failure = %Failure::CacheWrite, url = %key.url, error = %e, "Cache write failed");
        false
      }
    }
  }

  /// Names of every generation in storage.
  pub fn generation_names(&self) -> Result<Vec<String>> {
    Ok(
      self
        .storage
        .list_generations()?
        .into_iter()
        .map(|g| g.name)
        .collect(),
    )
  }

  /// Number of entries in a generation.
  pub fn entry_count(&self, name: &str) -> Result<usize> {
    Ok(self.storage.keys(name)?.len())
  }
}
