use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::HeaderMap;
use std::collections::BTreeMap;

use super::{Fetcher, Request, Response, ResponseSource};
use crate::error::NetworkError;

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpClient {
  client: reqwest::Client,
}

impl HttpClient {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("tikpluse-offline/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for HttpClient {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| NetworkError::InvalidRequest(e.to_string()))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await?;

    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());
    let body = response.bytes().await?.to_vec();

    Ok(Response {
      status,
      headers,
      body,
      source: ResponseSource::Network,
    })
  }
}

/// Flatten response headers; repeated fields are joined with ", " so no value is lost.
fn collect_headers(map: &HeaderMap) -> BTreeMap<String, String> {
  let mut headers: BTreeMap<String, String> = BTreeMap::new();
  for (name, value) in map {
    let Ok(value) = value.to_str() else {
      continue;
    };
    headers
      .entry(name.as_str().to_string())
      .and_modify(|existing| {
        existing.push_str(", ");
        existing.push_str(value);
      })
      .or_insert_with(|| value.to_string());
  }
  headers
}
