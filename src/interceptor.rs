//! The single fetch gate: classifies requests and routes them to a strategy.

use color_eyre::{eyre::eyre, Result};
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;
use url::{Origin, Url};

use crate::config::Config;
use crate::net::{Request, Response};
use crate::strategy::{Strategy, StrategyEngine};

/// Route category of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
  /// Not intercepted; the host handles it as if no worker existed
  PassThrough,
  Handled(Strategy),
}

/// Matches a request path.
#[derive(Debug, Clone)]
pub enum Matcher {
  /// Exact path from the install manifest
  ManifestPath(HashSet<String>),
  PathPrefix(String),
  /// Path matching a configured cacheable pattern, with or without the API marker
  Cacheable(Vec<Regex>),
  /// Any path containing the API marker
  Api(String),
  Navigation,
  Any,
}

impl Matcher {
  fn matches(&self, request: &Request) -> bool {
    let path = request.url.path();
    match self {
      Matcher::ManifestPath(paths) => paths.contains(path),
      Matcher::PathPrefix(prefix) => path.starts_with(prefix.as_str()),
      Matcher::Cacheable(patterns) => patterns.iter().any(|p| p.is_match(path)),
      Matcher::Api(marker) => path.contains(marker.as_str()),
      Matcher::Navigation => request.is_navigation(),
      Matcher::Any => true,
    }
  }
}

/// One ordered classification rule.
#[derive(Debug, Clone)]
pub struct RouteRule {
  pub matcher: Matcher,
  pub strategy: Strategy,
}

/// Ordered rules; first match wins.
#[derive(Debug, Clone)]
pub struct RouteTable {
  origin: Origin,
  rules: Vec<RouteRule>,
}

impl RouteTable {
  /// Build the table from configuration. Static matchers come before API matchers.
  pub fn from_config(config: &Config) -> Result<Self> {
    let patterns = config
      .routes
      .cacheable
      .iter()
      .map(|p| Regex::new(p).map_err(|e| eyre!("Invalid route pattern '{}': {}", p, e)))
      .collect::<Result<Vec<_>>>()?;

    let manifest_paths: HashSet<String> = config
      .manifest_urls()?
      .iter()
      .filter(|url| url.origin() == config.origin.origin())
      .map(|url| url.path().to_string())
      .collect();

    let mut rules = vec![RouteRule {
      matcher: Matcher::ManifestPath(manifest_paths),
      strategy: Strategy::CacheFirst,
    }];
    rules.extend(config.cache.static_prefixes.iter().map(|prefix| RouteRule {
      matcher: Matcher::PathPrefix(prefix.clone()),
      strategy: Strategy::CacheFirst,
    }));
    rules.push(RouteRule {
      matcher: Matcher::Cacheable(patterns),
      strategy: Strategy::NetworkFirst,
    });
    rules.push(RouteRule {
      matcher: Matcher::Api(config.routes.api_marker.clone()),
      strategy: Strategy::NetworkOnly,
    });
    rules.push(RouteRule {
      matcher: Matcher::Navigation,
      strategy: Strategy::NavigationFallback,
    });
    rules.push(RouteRule {
      matcher: Matcher::Any,
      strategy: Strategy::CacheFirst,
    });

    Ok(Self {
      origin: config.origin.origin(),
      rules,
    })
  }

  pub fn classify(&self, request: &Request) -> Classification {
    if !request.is_get() || !self.is_same_origin(&request.url) {
      return Classification::PassThrough;
    }

    self
      .rules
      .iter()
      .find(|rule| rule.matcher.matches(request))
      .map(|rule| Classification::Handled(rule.strategy))
      .unwrap_or(Classification::PassThrough)
  }

  fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin
  }
}

/// Result of offering a request to the gate.
#[derive(Debug)]
pub enum Interception {
  /// The worker answered
  Respond(Response),
  /// Left to default host handling, untouched
  PassThrough(Request),
}

/// Receives every outgoing request.
#[derive(Clone)]
pub struct Interceptor {
  routes: std::sync::Arc<RouteTable>,
  engine: StrategyEngine,
}

impl Interceptor {
  pub fn new(routes: RouteTable, engine: StrategyEngine) -> Self {
    Self {
      routes: std::sync::Arc::new(routes),
      engine,
    }
  }

  pub fn classify(&self, request: &Request) -> Classification {
    self.routes.classify(request)
  }

  /// Classify and, for intercepted requests, always resolve to a response.
  pub async fn handle(&self, request: Request) -> Interception {
    match self.classify(&request) {
      Classification::PassThrough => Interception::PassThrough(request),
      Classification::Handled(strategy) => {
        debug!(url = %request.url, %strategy, "Intercepted request");
        Interception::Respond(self.engine.run(strategy, &request).await)
      }
    }
  }
}
