use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::db::Database;
use crate::event::EventHandler;
use crate::net::{HttpClient, Request, Response};
use crate::push::{ClickAction, ConsoleHost};
use crate::worker::{ServiceWorker, Submission};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Create and populate the static cache generation
  Install,
  /// Purge stale generations and take control
  Activate,
  /// Send requests through the offline gate
  Fetch {
    /// URLs or origin-relative paths
    #[arg(required = true)]
    urls: Vec<String>,
    /// Issue the requests as document navigations
    #[arg(long)]
    navigate: bool,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// Send a mutation, queueing it for background sync if offline
  Enqueue {
    #[arg(long)]
    tag: String,
    url: String,
    #[arg(short = 'X', long, default_value = "POST")]
    method: String,
    /// JSON request body
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Replay actions queued under a tag
  Sync { tag: String },
  /// Cancel actions queued under a tag
  Clear { tag: String },
  /// Deliver a push payload
  Push {
    /// Raw payload (JSON expected)
    payload: Option<String>,
    /// Simulate a click on the resulting notification: open, dismiss or default
    #[arg(long)]
    click: Option<String>,
  },
  /// Show cache generations, sync tags and pending actions
  Status,
}

/// Terminal host for the offline worker
pub struct App {
  config: Config,
  worker: Arc<ServiceWorker>,
  events: EventHandler,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let db = Arc::new(Database::open(config.database.as_deref())?);
    let fetcher = Arc::new(HttpClient::new()?);
    let worker = Arc::new(ServiceWorker::new(
      &config,
      db,
      fetcher,
      Arc::new(ConsoleHost),
    )?);
    let events = EventHandler::new(Arc::clone(&worker));

    Ok(Self {
      config,
      worker,
      events,
    })
  }

  fn resolve(&self, url: &str) -> Result<Url> {
    self
      .config
      .origin
      .join(url)
      .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Install => {
        let report = self.events.install().await?;
        println!(
          "installed {}: {} cached, {} failed",
          report.generation,
          report.cached.len(),
          report.failed.len()
        );
        for url in &report.failed {
          println!("  failed: {}", url);
        }
        println!("worker: {:?}", self.worker.state());
        if self.worker.signals().update_available {
          println!("update available");
        }
      }
      Command::Activate => {
        let report = self.events.activate().await?;
        for name in &report.deleted {
          println!("deleted {}", name);
        }
        for name in &report.failed {
          println!("could not delete {}", name);
        }
        println!("worker: {:?}", self.worker.state());
        if self.worker.signals().offline_ready {
          println!("offline ready");
        }
      }
      Command::Fetch {
        urls,
        navigate,
        method,
      } => {
        let abort = CancellationToken::new();
        let mut requests = Vec::with_capacity(urls.len());
        for url in &urls {
          let url = self.resolve(url)?;
          let request = if navigate {
            Request::navigate(url)
          } else {
            Request::new(&method, url)
          };
          requests.push(request.with_signal(abort.clone()));
        }

        let pending = join_all(requests.into_iter().map(|r| self.events.fetch(r)));
        let results = tokio::select! {
          results = pending => results,
          _ = tokio::signal::ctrl_c() => {
            abort.cancel();
            return Err(eyre!("Interrupted"));
          }
        };

        for (url, result) in urls.iter().zip(results) {
          match result? {
            Ok(response) => print_response(url, &response),
            Err(e) => println!("{} -> network error: {}", url, e),
          }
        }
      }
      Command::Enqueue {
        tag,
        url,
        method,
        data,
      } => {
        let mut request = Request::new(&method, self.resolve(&url)?);
        if let Some(body) = data {
          request = request
            .with_header("content-type", "application/json")
            .with_body(body);
        }
        match self.worker.submit(request, &tag).await? {
          Submission::Sent(response) => print_response(&url, &response),
          Submission::Queued(action) => println!("queued {} under {}", action.id, action.tag),
        }
      }
      Command::Sync { tag } => {
        let report = self.events.sync(&tag).await?;
        println!(
          "{}: {} replayed, {} still queued",
          report.tag,
          report.replayed.len(),
          report.retained.len()
        );
        if !report.is_complete() {
          println!("retry with another sync once the network is back");
        }
      }
      Command::Clear { tag } => {
        let removed = self.worker.sync_queue().clear_pending_action(&tag)?;
        println!("{}: {} cancelled", tag, removed);
      }
      Command::Push { payload, click } => {
        let notification = self
          .events
          .push(payload.map(String::into_bytes))
          .await?;
        if let Some(action) = click {
          let action = ClickAction::parse(Some(action.as_str()));
          match self.events.notification_click(notification, action).await? {
            Some(url) => println!("navigated to {}", url),
            None => println!("dismissed"),
          }
        }
      }
      Command::Status => self.print_status()?,
    }

    Ok(())
  }

  fn print_status(&self) -> Result<()> {
    let registry = self.worker.registry();
    println!("generations:");
    for name in registry.generation_names()? {
      let current = name == registry.static_name() || name == registry.dynamic_name();
      println!(
        "  {}{} ({} entries)",
        name,
        if current { "" } else { " [stale]" },
        registry.entry_count(&name)?
      );
    }

    let queue = self.worker.sync_queue();
    println!("sync tags: {}", queue.registered_tags()?.join(", "));
    println!("pending actions:");
    for action in queue.pending(None)? {
      println!(
        "  {} [{}] {} {} {:?} (queued {})",
        action.id,
        action.tag,
        action.payload.method,
        action.payload.url,
        queue.state_of(action.id)?,
        action.enqueued_at.to_rfc3339()
      );
    }
    Ok(())
  }
}

fn print_response(url: &str, response: &Response) {
  println!(
    "{} -> {} ({:?}, {}, {} bytes)",
    url,
    response.status,
    response.source,
    response.header("content-type").unwrap_or("-"),
    response.body.len()
  );
}
