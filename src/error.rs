//! Failure taxonomy for the offline layer.
//!
//! Nothing in here ever reaches the page as an unhandled failure: network errors
//! drive fallbacks, everything else is logged with a `failure` field and dropped.

use std::fmt;

/// Why a network fetch produced no response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
  #[error("transport error: {0}")]
  Transport(String),

  #[error("request aborted")]
  Aborted,

  #[error("invalid request: {0}")]
  InvalidRequest(String),
}

impl From<reqwest::Error> for NetworkError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_builder() {
      NetworkError::InvalidRequest(e.to_string())
    } else {
      NetworkError::Transport(e.to_string())
    }
  }
}

/// Failure kinds reported through `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
  AssetPopulation,
  Network,
  CacheRead,
  CacheWrite,
  SyncReplay,
  PushPayloadParse,
  NotificationDispatch,
}

impl fmt::Display for Failure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Failure::AssetPopulation => "AssetPopulationFailure",
      Failure::Network => "NetworkFailure",
      Failure::CacheRead => "CacheReadFailure",
      Failure::CacheWrite => "CacheWriteFailure",
      Failure::SyncReplay => "SyncReplayFailure",
      Failure::PushPayloadParse => "PushPayloadParseFailure",
      Failure::NotificationDispatch => "NotificationDispatchFailure",
    };
    f.write_str(name)
  }
}
