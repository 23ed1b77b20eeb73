//! Scripted in-process transport for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{Fetcher, Request, Response, ResponseSource};
use crate::error::NetworkError;

/// Answers from a path → response table; can be taken offline at any time.
pub struct ScriptedFetcher {
  routes: Mutex<HashMap<String, (u16, Vec<u8>)>>,
  online: AtomicBool,
  calls: AtomicUsize,
  seen: Mutex<Vec<(String, String)>>,
  delay: Option<Duration>,
}

impl ScriptedFetcher {
  pub fn new() -> Self {
    Self {
      routes: Mutex::new(HashMap::new()),
      online: AtomicBool::new(true),
      calls: AtomicUsize::new(0),
      seen: Mutex::new(Vec::new()),
      delay: None,
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Script the response for a path (including any query string).
  pub fn respond(&self, path: &str, status: u16, body: &str) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(path.to_string(), (status, body.as_bytes().to_vec()));
  }

  pub fn go_offline(&self) {
    self.online.store(false, Ordering::SeqCst);
  }

  pub fn go_online(&self) {
    self.online.store(true, Ordering::SeqCst);
  }

  pub fn call_count(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// `(method, path)` of every request that reached the transport
  pub fn seen(&self) -> Vec<(String, String)> {
    self.seen.lock().unwrap().clone()
  }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let path = request.url[url::Position::BeforePath..].to_string();
    self
      .seen
      .lock()
      .unwrap()
      .push((request.method.clone(), path.clone()));

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    if !self.online.load(Ordering::SeqCst) {
      return Err(NetworkError::Transport("network unreachable".to_string()));
    }

    let (status, body) = self
      .routes
      .lock()
      .unwrap()
      .get(&path)
      .cloned()
      .unwrap_or((404, b"Not Found".to_vec()));

    let mut response = Response::synthesized(status, "application/json", body);
    response.source = ResponseSource::Network;
    Ok(response)
  }
}
