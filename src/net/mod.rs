//! Request/response shapes and the network seam used by every strategy.

mod client;
#[cfg(test)]
pub mod testing;

pub use client::HttpClient;

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::NetworkError;

/// How the host issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level document navigation
  Navigate,
  /// Subresource or programmatic fetch
  #[default]
  Resource,
}

/// An outgoing client request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub headers: BTreeMap<String, String>,
  pub body: Option<Vec<u8>>,
  pub mode: RequestMode,
  /// Fires when the host aborts the request
  pub signal: Option<CancellationToken>,
}

impl Request {
  pub fn new(method: &str, url: Url) -> Self {
    Self {
      method: method.to_uppercase(),
      url,
      headers: BTreeMap::new(),
      body: None,
      mode: RequestMode::Resource,
      signal: None,
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new("GET", url)
  }

  /// A GET issued as a document navigation.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_lowercase(), value.to_string());
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  pub fn with_signal(mut self, signal: CancellationToken) -> Self {
    self.signal = Some(signal);
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Served from a cache generation
  Cache,
  /// Synthesized because neither network nor cache could answer
  Fallback,
}

/// A response handed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub headers: BTreeMap<String, String>,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

impl Response {
  /// A synthesized response with a single content type header.
  pub fn synthesized(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    Self {
      status,
      headers,
      body: body.into(),
      source: ResponseSource::Fallback,
    }
  }

  /// 2xx status
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(&name.to_lowercase()).map(String::as_str)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Network transport behind the strategies.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Fetch honoring the request's abort signal.
///
/// An aborted fetch is reported as `NetworkError::Aborted` and takes the same
/// fallback path as any other network failure.
pub async fn fetch(fetcher: &dyn Fetcher, request: &Request) -> Result<Response, NetworkError> {
  match &request.signal {
    Some(signal) => {
      tokio::select! {
        biased;
        _ = signal.cancelled() => Err(NetworkError::Aborted),
        result = fetcher.fetch(request) => result,
      }
    }
    None => fetcher.fetch(request).await,
  }
}
