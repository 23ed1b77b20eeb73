//! Caching strategies.
//!
//! Each strategy always produces a response: network failures (including aborted
//! fetches) drive a fallback, and cache failures degrade to a miss or a skipped write.

pub mod responses;

use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::cache::{CacheRegistry, GenerationKind, RequestKey};
use crate::error::Failure;
use crate::net::{self, Fetcher, Request, Response};

/// Algorithm used to satisfy a classified request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Serve from cache; fill from network on a miss
  CacheFirst,
  /// Prefer the network; fall back to the last stored copy
  NetworkFirst,
  /// Never touch the cache
  NetworkOnly,
  /// Network, then exact cached page, then cached root document, then offline page
  NavigationFallback,
}

impl fmt::Display for Strategy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Strategy::CacheFirst => "cache-first",
      Strategy::NetworkFirst => "network-first",
      Strategy::NetworkOnly => "network-only",
      Strategy::NavigationFallback => "navigation-fallback",
    };
    f.write_str(name)
  }
}

/// Runs strategies against the current cache generations.
#[derive(Clone)]
pub struct StrategyEngine {
  registry: Arc<CacheRegistry>,
  fetcher: Arc<dyn Fetcher>,
  app_name: String,
  /// Documents served for navigations when the exact page is not cached
  root_documents: Vec<RequestKey>,
}

impl StrategyEngine {
  pub fn new(
    registry: Arc<CacheRegistry>,
    fetcher: Arc<dyn Fetcher>,
    origin: &Url,
    app_name: &str,
  ) -> Self {
    let root_documents = ["/", "/index.html"]
      .iter()
      .filter_map(|path| origin.join(path).ok())
      .map(|url| RequestKey::get(&url))
      .collect();

    Self {
      registry,
      fetcher,
      app_name: app_name.to_string(),
      root_documents,
    }
  }

  pub async fn run(&self, strategy: Strategy, request: &Request) -> Response {
    match strategy {
      Strategy::CacheFirst => self.cache_first(request).await,
      Strategy::NetworkFirst => self.network_first(request).await,
      Strategy::NetworkOnly => self.network_only(request).await,
      Strategy::NavigationFallback => self.navigation(request).await,
    }
  }

  async fn cache_first(&self, request: &Request) -> Response {
    let key = RequestKey::get(&request.url);

    if let Some(hit) = self.registry.match_any(&key) {
      return hit.into_response();
    }

    match net::fetch(self.fetcher.as_ref(), request).await {
      Ok(response) => {
        if response.is_success() {
          self.registry.store(GenerationKind::Dynamic, &key, &response);
        }
        response
      }
      Err(e) => {
        debug!(failure = %Failure::Network, url = %request.url, error = %e, "Uncached asset unavailable");
        responses::offline_status()
      }
    }
  }

  async fn network_first(&self, request: &Request) -> Response {
    let key = RequestKey::get(&request.url);

    match net::fetch(self.fetcher.as_ref(), request).await {
      Ok(response) if response.is_success() => {
        self.registry.store(GenerationKind::Dynamic, &key, &response);
        return response;
      }
      Ok(response) => {
        debug!(url = %request.url, status = response.status, "Non-success response, trying cache");
      }
      Err(e) => {
        debug!(failure = %Failure::Network, url = %request.url, error = %e, "Network failed, trying cache");
      }
    }

    self
      .registry
      .lookup(GenerationKind::Dynamic, &key)
      .or_else(|| self.registry.lookup(GenerationKind::Static, &key))
      .map(|record| record.into_response())
      .unwrap_or_else(responses::offline_payload)
  }

  async fn network_only(&self, request: &Request) -> Response {
    match net::fetch(self.fetcher.as_ref(), request).await {
      Ok(response) => response,
      Err(e) => {
        debug!(failure = %Failure::Network, url = %request.url, error = %e, "Network failed");
        responses::offline_payload()
      }
    }
  }

  async fn navigation(&self, request: &Request) -> Response {
    let key = RequestKey::get(&request.url);

    match net::fetch(self.fetcher.as_ref(), request).await {
      Ok(response) => {
        if response.is_success() {
          self.registry.store(GenerationKind::Dynamic, &key, &response);
        }
        return response;
      }
      Err(e) => {
        debug!(failure = %Failure::Network, url = %request.url, error = %e, "Navigation failed, trying cache");
      }
    }

    if let Some(page) = self.registry.lookup(GenerationKind::Dynamic, &key) {
      return page.into_response();
    }

    // Client-side routing: the root document can render any route
    for root in &self.root_documents {
      if let Some(document) = self.registry.match_any(root) {
        return document.into_response();
      }
    }

    responses::offline_page(&self.app_name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::FailingStorage;
  use crate::cache::{CacheStorage, SqliteStorage};
  use crate::net::testing::ScriptedFetcher;
  use crate::net::ResponseSource;
  use std::time::Duration;
  use tokio_util::sync::CancellationToken;

  fn origin() -> Url {
    Url::parse("https://app.tikpluse.com").unwrap()
  }

  fn url(path: &str) -> Url {
    origin().join(path).unwrap()
  }

  fn setup(fetcher: ScriptedFetcher) -> (StrategyEngine, Arc<CacheRegistry>, Arc<ScriptedFetcher>) {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let registry = Arc::new(CacheRegistry::new(storage, "tikpluse", "v1"));
    let fetcher = Arc::new(fetcher);
    let engine = StrategyEngine::new(
      Arc::clone(&registry),
      Arc::clone(&fetcher) as Arc<dyn Fetcher>,
      &origin(),
      "TikPluse",
    );
    (engine, registry, fetcher)
  }

  #[tokio::test]
  async fn test_cache_first_hit_skips_network() {
    let (engine, registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.respond("/static/js/main.js", 200, "console.log(1)");
    registry
      .install(&[url("/static/js/main.js")], fetcher.as_ref())
      .await
      .unwrap();
    let calls = fetcher.call_count();

    let response = engine
      .run(Strategy::CacheFirst, &Request::get(url("/static/js/main.js")))
      .await;
    assert_eq!(response.text(), "console.log(1)");
    assert_eq!(response.source, ResponseSource::Cache);
    assert_eq!(fetcher.call_count(), calls);
  }

  #[tokio::test]
  async fn test_cache_first_miss_fills_dynamic() {
    let (engine, registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.respond("/static/media/logo.svg", 200, "<svg/>");

    let request = Request::get(url("/static/media/logo.svg"));
    let first = engine.run(Strategy::CacheFirst, &request).await;
    assert_eq!(first.source, ResponseSource::Network);

    fetcher.go_offline();
    let second = engine.run(Strategy::CacheFirst, &request).await;
    assert_eq!(second.text(), "<svg/>");
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(registry.entry_count("tikpluse-dynamic-v1").unwrap(), 1);
  }

  #[tokio::test]
  async fn test_cache_first_offline_miss_is_offline_status() {
    let (engine, _registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.go_offline();

    let response = engine
      .run(Strategy::CacheFirst, &Request::get(url("/static/css/app.css")))
      .await;
    assert_eq!(response.status, 503);
    assert_eq!(response.text(), "Offline");
  }

  #[tokio::test]
  async fn test_network_first_falls_back_to_identical_copy() {
    let (engine, _registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.respond("/api/v1/analytics/overview", 200, r#"{"views":10}"#);

    let request = Request::get(url("/api/v1/analytics/overview"));
    let first = engine.run(Strategy::NetworkFirst, &request).await;
    assert_eq!(first.status, 200);

    fetcher.go_offline();
    let second = engine.run(Strategy::NetworkFirst, &request).await;
    assert_eq!(second.status, 200);
    assert_eq!(second.body, first.body);
    assert_eq!(second.text(), r#"{"views":10}"#);
    assert_eq!(second.source, ResponseSource::Cache);
  }

  #[tokio::test]
  async fn test_network_first_non_success_uses_cache() {
    let (engine, _registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.respond("/api/v1/dashboard", 200, r#"{"ok":1}"#);
    let request = Request::get(url("/api/v1/dashboard"));
    engine.run(Strategy::NetworkFirst, &request).await;

    fetcher.respond("/api/v1/dashboard", 500, "boom");
    let response = engine.run(Strategy::NetworkFirst, &request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), r#"{"ok":1}"#);
  }

  #[tokio::test]
  async fn test_network_first_returns_response_when_cache_write_fails() {
    let storage = Arc::new(FailingStorage::new());
    storage.fail_writes(true);
    let registry = Arc::new(CacheRegistry::new(
      Arc::clone(&storage) as Arc<dyn CacheStorage>,
      "tikpluse",
      "v1",
    ));
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.respond("/api/v1/analytics/overview", 200, r#"{"views":10}"#);
    let engine = StrategyEngine::new(
      Arc::clone(&registry),
      Arc::clone(&fetcher) as Arc<dyn Fetcher>,
      &origin(),
      "TikPluse",
    );

    let request = Request::get(url("/api/v1/analytics/overview"));
    let response = engine.run(Strategy::NetworkFirst, &request).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), r#"{"views":10}"#);
    assert_eq!(response.source, ResponseSource::Network);

    // Nothing was stored, so an outage has no copy to fall back on
    fetcher.go_offline();
    assert_eq!(engine.run(Strategy::NetworkFirst, &request).await.status, 503);
  }

  #[tokio::test]
  async fn test_cache_first_read_failure_goes_to_network() {
    let storage = Arc::new(FailingStorage::new());
    storage.fail_reads(true);
    let registry = Arc::new(CacheRegistry::new(
      Arc::clone(&storage) as Arc<dyn CacheStorage>,
      "tikpluse",
      "v1",
    ));
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher.respond("/static/css/app.css", 200, "body{}");
    let engine = StrategyEngine::new(
      Arc::clone(&registry),
      Arc::clone(&fetcher) as Arc<dyn Fetcher>,
      &origin(),
      "TikPluse",
    );

    let response = engine
      .run(Strategy::CacheFirst, &Request::get(url("/static/css/app.css")))
      .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "body{}");
    assert_eq!(fetcher.call_count(), 1);
  }

  #[tokio::test]
  async fn test_network_first_without_copy_is_offline_payload() {
    let (engine, _registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.go_offline();

    let response = engine
      .run(Strategy::NetworkFirst, &Request::get(url("/api/v1/analytics/daily")))
      .await;
    assert_eq!(response.status, 503);
    assert_eq!(response.text(), r#"{"error":"Network error","offline":true}"#);
  }

  #[tokio::test]
  async fn test_network_only_never_caches() {
    let (engine, registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.respond("/api/v1/tickets", 200, "[]");
    let request = Request::get(url("/api/v1/tickets"));

    for _ in 0..5 {
      assert_eq!(engine.run(Strategy::NetworkOnly, &request).await.status, 200);
    }
    fetcher.go_offline();
    let response = engine.run(Strategy::NetworkOnly, &request).await;
    assert_eq!(response.status, 503);
    assert!(registry.generation_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_navigation_falls_back_to_root_document() {
    let (engine, registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.respond("/", 200, "<html>app shell</html>");
    registry.install(&[url("/")], fetcher.as_ref()).await.unwrap();
    fetcher.go_offline();

    let response = engine
      .run(Strategy::NavigationFallback, &Request::navigate(url("/tickets/42")))
      .await;
    assert_eq!(response.text(), "<html>app shell</html>");
  }

  #[tokio::test]
  async fn test_navigation_prefers_exact_cached_page() {
    let (engine, registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.respond("/", 200, "shell");
    fetcher.respond("/reports", 200, "reports page");
    registry.install(&[url("/")], fetcher.as_ref()).await.unwrap();

    let request = Request::navigate(url("/reports"));
    engine.run(Strategy::NavigationFallback, &request).await;
    fetcher.go_offline();

    let response = engine.run(Strategy::NavigationFallback, &request).await;
    assert_eq!(response.text(), "reports page");
  }

  #[tokio::test]
  async fn test_navigation_with_empty_cache_synthesizes_page() {
    let (engine, _registry, fetcher) = setup(ScriptedFetcher::new());
    fetcher.go_offline();

    let response = engine
      .run(Strategy::NavigationFallback, &Request::navigate(url("/anything")))
      .await;
    assert_eq!(response.source, ResponseSource::Fallback);
    assert!(response.text().contains("You're offline"));
  }

  #[tokio::test]
  async fn test_aborted_navigation_takes_fallback_path() {
    let (engine, registry, fetcher) =
      setup(ScriptedFetcher::new().with_delay(Duration::from_millis(200)));
    fetcher.respond("/", 200, "shell");
    registry.install(&[url("/")], fetcher.as_ref()).await.unwrap();

    let signal = CancellationToken::new();
    let request = Request::navigate(url("/settings")).with_signal(signal.clone());
    signal.cancel();

    let response = engine.run(Strategy::NavigationFallback, &request).await;
    assert_eq!(response.text(), "shell");
  }
}
