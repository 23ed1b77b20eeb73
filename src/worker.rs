//! The offline worker: one method per host lifecycle event.

use color_eyre::Result;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;

use crate::cache::{ActivateReport, CacheRegistry, InstallReport, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::error::{Failure, NetworkError};
use crate::interceptor::{Interception, Interceptor, RouteTable};
use crate::net::{self, Fetcher, Request, Response};
use crate::push::{ClickAction, Notification, NotificationHost, PushDelivery};
use crate::strategy::StrategyEngine;
use crate::sync::{PendingSyncAction, ReplayReport, SyncPayload, SyncQueue};

/// Banner flags for the hosting application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientSignals {
  /// A new deploy was installed over an older one
  pub update_available: bool,
  /// The current deploy is active and controls clients
  pub offline_ready: bool,
}

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
}

/// Result of a mutating request sent with background sync enabled.
#[derive(Debug)]
pub enum Submission {
  Sent(Response),
  /// The network was unreachable; the request will be replayed on the next sync
  Queued(PendingSyncAction),
}

pub struct ServiceWorker {
  manifest: Vec<Url>,
  registry: Arc<CacheRegistry>,
  interceptor: Interceptor,
  sync: SyncQueue,
  push: PushDelivery,
  fetcher: Arc<dyn Fetcher>,
  state: Mutex<WorkerState>,
  signals: watch::Sender<ClientSignals>,
}

impl ServiceWorker {
  pub fn new(
    config: &Config,
    db: Arc<Database>,
    fetcher: Arc<dyn Fetcher>,
    host: Arc<dyn NotificationHost>,
  ) -> Result<Self> {
    let storage = Arc::new(SqliteStorage::new(Arc::clone(&db)));
    let registry = Arc::new(CacheRegistry::new(
      storage,
      &config.cache.prefix,
      &config.cache.version,
    ));
    let engine = StrategyEngine::new(
      Arc::clone(&registry),
      Arc::clone(&fetcher),
      &config.origin,
      &config.push.app_name,
    );
    let interceptor = Interceptor::new(RouteTable::from_config(config)?, engine);
    let sync = SyncQueue::new(db, Arc::clone(&fetcher));
    let push = PushDelivery::new(config.push.clone(), config.origin.clone(), host);
    let (signals, _) = watch::channel(ClientSignals::default());

    Ok(Self {
      manifest: config.manifest_urls()?,
      registry,
      interceptor,
      sync,
      push,
      fetcher,
      state: Mutex::new(WorkerState::Parsed),
      signals,
    })
  }

  pub fn registry(&self) -> &CacheRegistry {
    &self.registry
  }

  pub fn sync_queue(&self) -> &SyncQueue {
    &self.sync
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(WorkerState::Parsed)
  }

  fn set_state(&self, state: WorkerState) {
    if let Ok(mut current) = self.state.lock() {
      *current = state;
    }
  }

  /// Receiver for banner flags.
  pub fn subscribe(&self) -> watch::Receiver<ClientSignals> {
    self.signals.subscribe()
  }

  pub fn signals(&self) -> ClientSignals {
    *self.signals.borrow()
  }

  /// `install`: create and populate the static generation.
  pub async fn install(&self) -> Result<InstallReport> {
    self.set_state(WorkerState::Installing);
    let report = match self.registry.install(&self.manifest, self.fetcher.as_ref()).await {
      Ok(report) => report,
      Err(e) => {
        self.set_state(WorkerState::Parsed);
        return Err(e);
      }
    };
    self.set_state(WorkerState::Installed);

    if report.replaced_previous {
      self.signals.send_modify(|s| s.update_available = true);
    }
    Ok(report)
  }

  /// `activate`: purge stale generations, then take control of clients.
  pub async fn activate(&self) -> ActivateReport {
    self.set_state(WorkerState::Activating);
    let report = self.registry.activate().await;
    self.set_state(WorkerState::Activated);

    self.signals.send_modify(|s| {
      s.update_available = false;
      s.offline_ready = true;
    });
    info!(
      deleted = report.deleted.len(),
      failed = report.failed.len(),
      "Worker activated and controlling clients"
    );
    report
  }

  /// `fetch`: intercepted requests always resolve; pass-through requests go
  /// straight to the network as if no worker were installed.
  pub async fn fetch(&self, request: Request) -> Result<Response, NetworkError> {
    match self.interceptor.handle(request).await {
      Interception::Respond(response) => Ok(response),
      Interception::PassThrough(request) => net::fetch(self.fetcher.as_ref(), &request).await,
    }
  }

  /// Send a mutating request, queueing it under `tag` if the network is unreachable.
  pub async fn submit(&self, request: Request, tag: &str) -> Result<Submission> {
    match net::fetch(self.fetcher.as_ref(), &request).await {
      Ok(response) => Ok(Submission::Sent(response)),
      Err(e) => {
        warn!(failure = %Failure::Network, url = %request.url, error = %e, "Offline, queueing for background sync");
        let payload = SyncPayload::from_request(&request);
        Ok(Submission::Queued(self.sync.enqueue(tag, payload)?))
      }
    }
  }

  /// `sync`: replay actions queued under `tag`.
  pub async fn sync(&self, tag: &str) -> Result<ReplayReport> {
    self.sync.replay(tag).await
  }

  /// `push`: show a notification for the payload.
  pub async fn push(&self, data: Option<&[u8]>) -> Notification {
    self.push.on_push(data).await
  }

  /// `notificationclick`
  pub async fn notification_click(
    &self,
    notification: &Notification,
    action: ClickAction,
  ) -> Option<Url> {
    self.push.on_click(notification, action).await
  }
}
