//! Push payload parsing, notification display and click navigation.

mod host;

pub use host::{ConsoleHost, NotificationHost};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::config::PushConfig;
use crate::error::Failure;

/// Wire shape of a push payload. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  url: Option<String>,
  tag: Option<String>,
}

/// A resolved push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
  pub title: String,
  pub body: String,
  pub url: String,
  pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
  pub url: String,
}

/// A notification as handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

/// Which part of the notification was clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
  Open,
  Dismiss,
  /// The notification body itself
  Default,
}

impl ClickAction {
  pub fn parse(action: Option<&str>) -> Self {
    match action {
      Some("open") => ClickAction::Open,
      Some("dismiss") => ClickAction::Dismiss,
      _ => ClickAction::Default,
    }
  }
}

/// Surfaces push messages through a `NotificationHost`.
#[derive(Clone)]
pub struct PushDelivery {
  config: PushConfig,
  origin: Url,
  host: Arc<dyn NotificationHost>,
}

impl PushDelivery {
  pub fn new(config: PushConfig, origin: Url, host: Arc<dyn NotificationHost>) -> Self {
    Self {
      config,
      origin,
      host,
    }
  }

  /// Parse a payload; anything unparseable becomes the default message.
  pub fn parse(&self, data: Option<&[u8]>) -> PushMessage {
    let payload = match data {
      Some(bytes) => serde_json::from_slice::<PushPayload>(bytes).unwrap_or_else(|e| {
        debug!(failure = %Failure::PushPayloadParse, error = %e, "Using default push payload");
        PushPayload::default()
      }),
      None => PushPayload::default(),
    };

    PushMessage {
      title: payload.title.unwrap_or_else(|| self.config.app_name.clone()),
      body: payload.body.unwrap_or_else(|| self.config.default_body.clone()),
      url: payload.url.unwrap_or_else(|| self.config.default_url.clone()),
      tag: payload.tag,
    }
  }

  pub fn build(&self, message: PushMessage) -> Notification {
    Notification {
      title: message.title,
      body: message.body,
      icon: self.config.icon.clone(),
      badge: self.config.badge.clone(),
      vibrate: vec![100, 50, 100],
      tag: message.tag,
      data: NotificationData { url: message.url },
      actions: vec![
        NotificationAction {
          action: "open".to_string(),
          title: "Open".to_string(),
        },
        NotificationAction {
          action: "dismiss".to_string(),
          title: "Dismiss".to_string(),
        },
      ],
    }
  }

  /// Handle a push event. Never fails; display errors are dropped.
  pub async fn on_push(&self, data: Option<&[u8]>) -> Notification {
    let notification = self.build(self.parse(data));
    if let Err(e) = self.host.show(&notification).await {
      debug!(failure = %Failure::NotificationDispatch, error = %e, "Notification not shown");
    }
    notification
  }

  /// Handle a click: close, then navigate unless dismissed. Returns the navigated URL.
  pub async fn on_click(&self, notification: &Notification, action: ClickAction) -> Option<Url> {
    if let Err(e) = self.host.close(notification).await {
      debug!(failure = %Failure::NotificationDispatch, error = %e, "Notification not closed");
    }

    if action == ClickAction::Dismiss {
      return None;
    }

    let target = match self.origin.join(&notification.data.url) {
      Ok(url) => url,
      Err(e) => {
        debug!(url = %notification.data.url, error = %e, "Unresolvable notification target");
        return None;
      }
    };

    // Reuse an open client already showing the target
    let open_clients = self.host.client_urls().await.unwrap_or_default();
    let result = if open_clients.contains(&target) {
      self.host.focus(&target).await
    } else {
      self.host.open_window(&target).await
    };

    if let Err(e) = result {
      debug!(failure = %Failure::NotificationDispatch, url = %target, error = %e, "Navigation failed");
    }
    Some(target)
  }
}
