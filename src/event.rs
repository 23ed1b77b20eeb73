use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use url::Url;

use crate::cache::{ActivateReport, InstallReport};
use crate::error::NetworkError;
use crate::net::{Request, Response};
use crate::push::{ClickAction, Notification};
use crate::sync::ReplayReport;
use crate::worker::ServiceWorker;

/// Host lifecycle events. Fetch answers through `respond_with`, the rest through `wait_until`.
#[derive(Debug)]
pub enum Event {
  Install {
    wait_until: oneshot::Sender<Result<InstallReport>>,
  },
  Activate {
    wait_until: oneshot::Sender<ActivateReport>,
  },
  Fetch {
    request: Request,
    respond_with: oneshot::Sender<Result<Response, NetworkError>>,
  },
  Sync {
    tag: String,
    wait_until: oneshot::Sender<Result<ReplayReport>>,
  },
  Push {
    data: Option<Vec<u8>>,
    wait_until: oneshot::Sender<Notification>,
  },
  NotificationClick {
    notification: Notification,
    action: ClickAction,
    wait_until: oneshot::Sender<Option<Url>>,
  },
}

/// Dispatches host events to the worker, one task per event
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
}

impl EventHandler {
  pub fn new(worker: Arc<ServiceWorker>) -> Self {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    tokio::spawn(async move {
      while let Some(event) = rx.recv().await {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move { dispatch(&worker, event).await });
      }
    });

    Self { tx }
  }

  fn send(&self, event: Event) -> Result<()> {
    self
      .tx
      .send(event)
      .map_err(|_| eyre!("Event dispatcher has shut down"))
  }

  pub async fn install(&self) -> Result<InstallReport> {
    let (wait_until, done) = oneshot::channel();
    self.send(Event::Install { wait_until })?;
    done.await.map_err(|_| eyre!("install event was dropped"))?
  }

  pub async fn activate(&self) -> Result<ActivateReport> {
    let (wait_until, done) = oneshot::channel();
    self.send(Event::Activate { wait_until })?;
    done.await.map_err(|_| eyre!("activate event was dropped"))
  }

  pub async fn fetch(&self, request: Request) -> Result<Result<Response, NetworkError>> {
    let (respond_with, done) = oneshot::channel();
    self.send(Event::Fetch {
      request,
      respond_with,
    })?;
    done.await.map_err(|_| eyre!("fetch event was dropped"))
  }

  pub async fn sync(&self, tag: &str) -> Result<ReplayReport> {
    let (wait_until, done) = oneshot::channel();
    self.send(Event::Sync {
      tag: tag.to_string(),
      wait_until,
    })?;
    done.await.map_err(|_| eyre!("sync event was dropped"))?
  }

  pub async fn push(&self, data: Option<Vec<u8>>) -> Result<Notification> {
    let (wait_until, done) = oneshot::channel();
    self.send(Event::Push { data, wait_until })?;
    done.await.map_err(|_| eyre!("push event was dropped"))
  }

  pub async fn notification_click(
    &self,
    notification: Notification,
    action: ClickAction,
  ) -> Result<Option<Url>> {
    let (wait_until, done) = oneshot::channel();
    self.send(Event::NotificationClick {
      notification,
      action,
      wait_until,
    })?;
    done.await.map_err(|_| eyre!("notificationclick event was dropped"))
  }
}

async fn dispatch(worker: &ServiceWorker, event: Event) {
  // A closed reply channel only means the host stopped waiting
  match event {
    Event::Install { wait_until } => {
      let _ = wait_until.send(worker.install().await);
    }
    Event::Activate { wait_until } => {
      let _ = wait_until.send(worker.activate().await);
    }
    Event::Fetch {
      request,
      respond_with,
    } => {
      let url = request.url.clone();
      if respond_with.send(worker.fetch(request).await).is_err() {
        debug!(url = %url, "Fetch response discarded by host");
      }
    }
    Event::Sync { tag, wait_until } => {
      let _ = wait_until.send(worker.sync(&tag).await);
    }
    Event::Push { data, wait_until } => {
      let _ = wait_until.send(worker.push(data.as_deref()).await);
    }
    Event::NotificationClick {
      notification,
      action,
      wait_until,
    } => {
      let _ = wait_until.send(worker.notification_click(&notification, action).await);
    }
  }
}
