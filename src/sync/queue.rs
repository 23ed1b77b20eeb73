use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::db::Database;
use crate::error::Failure;
use crate::net::{self, Fetcher, Request};

/// Storage key of the pending action array.
pub const PENDING_ACTIONS_KEY: &str = "tikpluse:pending-sync-actions";
/// Storage key of the registered sync tags.
pub const SYNC_TAGS_KEY: &str = "tikpluse:sync-tags";

/// The mutation to send again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
  pub url: Url,
  pub method: String,
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
  #[serde(default)]
  pub body: Option<String>,
  /// Body bytes that are not valid UTF-8, kept verbatim
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub raw_body: Option<Vec<u8>>,
}

impl SyncPayload {
  /// Capture a request for later replay without altering its body.
  pub fn from_request(request: &Request) -> Self {
    let (body, raw_body) = match &request.body {
      Some(bytes) => match String::from_utf8(bytes.clone()) {
        Ok(text) => (Some(text), None),
        Err(e) => (None, Some(e.into_bytes())),
      },
      None => (None, None),
    };

    Self {
      url: request.url.clone(),
      method: request.method.clone(),
      headers: request.headers.clone(),
      body,
      raw_body,
    }
  }

  fn to_request(&self) -> Request {
    let mut request = Request::new(&self.method, self.url.clone());
    for (name, value) in &self.headers {
      request = request.with_header(name, value);
    }
    if let Some(body) = &self.body {
      if !request.headers.contains_key("content-type") {
        request = request.with_header("content-type", "application/json");
      }
      request = request.with_body(body.as_bytes());
    } else if let Some(bytes) = &self.raw_body {
      request = request.with_body(bytes.clone());
    }
    request
  }
}

/// A durably queued mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSyncAction {
  pub id: Uuid,
  pub tag: String,
  pub payload: SyncPayload,
  pub enqueued_at: DateTime<Utc>,
}

/// Replay lifecycle of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
  Enqueued,
  Replaying,
  /// Terminal: delivered and removed from storage
  Replayed,
}

/// Outcome of one sync trigger.
#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
  pub tag: String,
  pub replayed: Vec<Uuid>,
  pub retained: Vec<Uuid>,
}

impl ReplayReport {
  /// Nothing left queued under the tag
  pub fn is_complete(&self) -> bool {
    self.retained.is_empty()
  }
}

/// Persistent queue of pending sync actions.
pub struct SyncQueue {
  db: Arc<Database>,
  fetcher: Arc<dyn Fetcher>,
  /// Serializes read-modify-write of the stored array
  store_lock: Mutex<()>,
  /// Serializes replays so two triggers never send the same action at once
  replay_lock: tokio::sync::Mutex<()>,
  replaying: Mutex<HashSet<Uuid>>,
}

impl SyncQueue {
  pub fn new(db: Arc<Database>, fetcher: Arc<dyn Fetcher>) -> Self {
    Self {
      db,
      fetcher,
      store_lock: Mutex::new(()),
      replay_lock: tokio::sync::Mutex::new(()),
      replaying: Mutex::new(HashSet::new()),
    }
  }

  fn lock_store(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
    self
      .store_lock
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  fn load_actions(&self) -> Result<Vec<PendingSyncAction>> {
    match self.db.get_value(PENDING_ACTIONS_KEY)? {
      Some(json) => serde_json::from_str(&json)
        .map_err(|e| eyre!("Failed to parse pending sync actions: {}", e)),
      None => Ok(Vec::new()),
    }
  }

  fn save_actions(&self, actions: &[PendingSyncAction]) -> Result<()> {
    let json = serde_json::to_string(actions)
      .map_err(|e| eyre!("Failed to serialize pending sync actions: {}", e))?;
    self.db.set_value(PENDING_ACTIONS_KEY, &json)
  }

  fn load_tags(&self) -> Result<BTreeSet<String>> {
    match self.db.get_value(SYNC_TAGS_KEY)? {
      Some(json) => {
        serde_json::from_str(&json).map_err(|e| eyre!("Failed to parse sync tags: {}", e))
      }
      None => Ok(BTreeSet::new()),
    }
  }

  fn save_tags(&self, tags: &BTreeSet<String>) -> Result<()> {
    let json =
      serde_json::to_string(tags).map_err(|e| eyre!("Failed to serialize sync tags: {}", e))?;
    self.db.set_value(SYNC_TAGS_KEY, &json)
  }

  /// Persist an action and register a sync request under its tag.
  pub fn enqueue(&self, tag: &str, payload: SyncPayload) -> Result<PendingSyncAction> {
    let action = PendingSyncAction {
      id: Uuid::new_v4(),
      tag: tag.to_string(),
      payload,
      enqueued_at: Utc::now(),
    };

    {
      let _guard = self.lock_store()?;
      let mut actions = self.load_actions()?;
      actions.push(action.clone());
      self.save_actions(&actions)?;
    }
    self.register(tag)?;

    info!(tag, id = %action.id, url = %action.payload.url, "Queued action for background sync");
    Ok(action)
  }

  /// Register a sync request. Returns false if the tag was already registered.
  pub fn register(&self, tag: &str) -> Result<bool> {
    let _guard = self.lock_store()?;
    let mut tags = self.load_tags()?;
    let added = tags.insert(tag.to_string());
    if added {
      self.save_tags(&tags)?;
    }
    Ok(added)
  }

  pub fn registered_tags(&self) -> Result<Vec<String>> {
    let _guard = self.lock_store()?;
    Ok(self.load_tags()?.into_iter().collect())
  }

  /// Pending actions, optionally only those under `tag`, in enqueue order.
  pub fn pending(&self, tag: Option<&str>) -> Result<Vec<PendingSyncAction>> {
    let _guard = self.lock_store()?;
    let actions = self.load_actions()?;
    Ok(match tag {
      Some(tag) => actions.into_iter().filter(|a| a.tag == tag).collect(),
      None => actions,
    })
  }

  pub fn state_of(&self, id: Uuid) -> Result<ActionState> {
    let replaying = self
      .replaying
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .contains(&id);
    if replaying {
      return Ok(ActionState::Replaying);
    }

    let queued = self.pending(None)?.iter().any(|a| a.id == id);
    Ok(if queued {
      ActionState::Enqueued
    } else {
      ActionState::Replayed
    })
  }

  fn mark_replaying(&self, ids: &[Uuid], on: bool) {
    if let Ok(mut replaying) = self.replaying.lock() {
      for id in ids {
        if on {
          replaying.insert(*id);
        } else {
          replaying.remove(id);
        }
      }
    }
  }

  /// Replay every action queued under `tag`, in enqueue order.
  ///
  /// Delivered actions are removed; failed ones stay queued with their payload intact.
  pub async fn replay(&self, tag: &str) -> Result<ReplayReport> {
    let _replay = self.replay_lock.lock().await;

    let actions = self.pending(Some(tag))?;
    let ids: Vec<Uuid> = actions.iter().map(|a| a.id).collect();
    self.mark_replaying(&ids, true);

    let mut report = ReplayReport {
      tag: tag.to_string(),
      ..Default::default()
    };

    for action in &actions {
      let request = action.payload.to_request();
      match net::fetch(self.fetcher.as_ref(), &request).await {
        Ok(response) if response.is_success() => {
          debug!(tag, id = %action.id, status = response.status, "Replayed sync action");
          report.replayed.push(action.id);
        }
        Ok(response) => {
          warn!(failure = %Failure::SyncReplay, tag, id = %action.id, status = response.status, "Replay rejected");
          report.retained.push(action.id);
        }
        Err(e) => {
          warn!(failure = %Failure::SyncReplay, tag, id = %action.id, error = %e, "Replay failed");
          report.retained.push(action.id);
        }
      }
    }

    let removed = self.remove(tag, &report.replayed);
    self.mark_replaying(&ids, false);
    removed?;

    info!(
      tag,
      replayed = report.replayed.len(),
      retained = report.retained.len(),
      "Sync replay finished"
    );
    Ok(report)
  }

  /// Remove delivered actions, re-reading storage so concurrent enqueues survive.
  fn remove(&self, tag: &str, ids: &[Uuid]) -> Result<()> {
    let _guard = self.lock_store()?;
    let mut actions = self.load_actions()?;
    if !ids.is_empty() {
      actions.retain(|a| !ids.contains(&a.id));
      self.save_actions(&actions)?;
    }

    if !actions.iter().any(|a| a.tag == tag) {
      let mut tags = self.load_tags()?;
      if tags.remove(tag) {
        self.save_tags(&tags)?;
      }
    }
    Ok(())
  }

  /// Cancel every action under `tag` and drop its registration. Returns how many were removed.
  pub fn clear_pending_action(&self, tag: &str) -> Result<usize> {
    let _guard = self.lock_store()?;
    let mut actions = self.load_actions()?;
    let before = actions.len();
    actions.retain(|a| a.tag != tag);
    let removed = before - actions.len();
    self.save_actions(&actions)?;

    let mut tags = self.load_tags()?;
    if tags.remove(tag) {
      self.save_tags(&tags)?;
    }

    info!(tag, removed, "Cleared pending sync actions");
    Ok(removed)
  }
}
