//! Core types for cache generations and their entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

use crate::net::{Response, ResponseSource};

/// Partition kind. Exactly one generation of each kind is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
  /// Build-time assets from the install manifest
  Static,
  /// Runtime fills (API copies, navigations, cache-first misses)
  Dynamic,
}

impl GenerationKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      GenerationKind::Static => "static",
      GenerationKind::Dynamic => "dynamic",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "static" => Some(GenerationKind::Static),
      "dynamic" => Some(GenerationKind::Dynamic),
      _ => None,
    }
  }
}

/// A named, versioned cache partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
  pub name: String,
  pub kind: GenerationKind,
  pub version: String,
  pub created_at: DateTime<Utc>,
}

impl CacheGeneration {
  pub fn new(prefix: &str, kind: GenerationKind, version: &str) -> Self {
    Self {
      name: format!("{}-{}-{}", prefix, kind.as_str(), version),
      kind,
      version: version.to_string(),
      created_at: Utc::now(),
    }
  }
}

/// Normalized `(method, url)` identifying a cached response.
///
/// Built from GET URLs only; storage refuses any other method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  /// Key for a GET of `url`. The fragment never reaches the server so it is dropped.
  pub fn get(url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: "GET".to_string(),
      url: url.to_string(),
    }
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  /// Stable fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRecord {
  pub status: u16,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
  pub stored_at: DateTime<Utc>,
}

impl ResponseRecord {
  pub fn from_response(response: &Response) -> Self {
    Self {
      status: response.status,
      headers: response.headers.clone(),
      body: response.body.clone(),
      stored_at: Utc::now(),
    }
  }

  pub fn into_response(self) -> Response {
    Response {
      status: self.status,
      headers: self.headers,
      body: self.body,
      source: ResponseSource::Cache,
    }
  }
}
