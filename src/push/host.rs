use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::info;
use url::Url;

use super::Notification;

/// Platform surface for notifications and client windows.
#[async_trait]
pub trait NotificationHost: Send + Sync {
  async fn show(&self, notification: &Notification) -> Result<()>;

  async fn close(&self, notification: &Notification) -> Result<()>;

  /// URLs of the currently open clients.
  async fn client_urls(&self) -> Result<Vec<Url>>;

  async fn focus(&self, url: &Url) -> Result<()>;

  async fn open_window(&self, url: &Url) -> Result<()>;
}

/// Terminal host: prints notifications and navigations to stdout.
pub struct ConsoleHost;

#[async_trait]
impl NotificationHost for ConsoleHost {
  async fn show(&self, notification: &Notification) -> Result<()> {
    let json = serde_json::to_string_pretty(notification)
      .map_err(|e| eyre!("Failed to render notification: {}", e))?;
    println!("{}", json);
    Ok(())
  }

  async fn close(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, "Notification closed");
    Ok(())
  }

  async fn client_urls(&self) -> Result<Vec<Url>> {
    Ok(Vec::new())
  }

  async fn focus(&self, url: &Url) -> Result<()> {
    println!("focus {}", url);
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    println!("open {}", url);
    Ok(())
  }
}
