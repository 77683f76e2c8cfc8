//! Connectivity monitoring.
//!
//! The network counts as available only when it is both active (the API host
//! resolves) and validated (a TCP connection to it succeeds). A background
//! probe task publishes state through a `watch` channel; subscribers receive
//! the current state first and afterwards only real transitions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connectivity {
  /// A network route exists
  pub active: bool,
  /// The route reaches the internet
  pub validated: bool,
}

impl Connectivity {
  pub const ONLINE: Self = Self {
    active: true,
    validated: true,
  };
  pub const OFFLINE: Self = Self {
    active: false,
    validated: false,
  };

  pub fn is_available(&self) -> bool {
    self.active && self.validated
  }
}

/// Source of connectivity readings.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
  async fn probe(&self) -> Connectivity;
}

/// Probes by resolving and connecting to a host.
pub struct TcpProbe {
  host: String,
  port: u16,
  timeout: Duration,
}

impl TcpProbe {
  pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
    Self {
      host: host.into(),
      port,
      timeout,
    }
  }

  /// Probe the host an API URL points at.
  pub fn for_url(url: &Url, timeout: Duration) -> Option<Self> {
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(Self::new(host, port, timeout))
  }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
  async fn probe(&self) -> Connectivity {
    let target = (self.host.as_str(), self.port);
    let addrs: Vec<_> = match tokio::time::timeout(self.timeout, lookup_host(target)).await {
      Ok(Ok(addrs)) => addrs.collect(),
      _ => return Connectivity::OFFLINE,
    };

    let Some(addr) = addrs.first().copied() else {
      return Connectivity::OFFLINE;
    };

    let validated = matches!(
      tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await,
      Ok(Ok(_))
    );

    Connectivity {
      active: true,
      validated,
    }
  }
}

pub struct NetworkMonitor {
  tx: Arc<watch::Sender<Connectivity>>,
  probe_task: Option<JoinHandle<()>>,
}

impl NetworkMonitor {
  /// A monitor whose state only changes through `set`.
  pub fn manual(initial: Connectivity) -> Self {
    let (tx, _) = watch::channel(initial);
    Self {
      tx: Arc::new(tx),
      probe_task: None,
    }
  }

  /// Take an initial reading, then keep probing in the background.
  pub async fn start<P>(probe: P, interval: Duration) -> Self
  where
    P: ConnectivityProbe + 'static,
  {
    let initial = probe.probe().await;
    debug!(?initial, "Initial connectivity");

    let (tx, _) = watch::channel(initial);
    let tx = Arc::new(tx);

    let publisher = Arc::clone(&tx);
    let probe_task = tokio::spawn(async move {
      loop {
        tokio::time::sleep(interval).await;
        let reading = probe.probe().await;
        publish(&publisher, reading);
      }
    });

    Self {
      tx,
      probe_task: Some(probe_task),
    }
  }

  pub fn is_available(&self) -> bool {
    self.tx.borrow().is_available()
  }

  pub fn connectivity(&self) -> Connectivity {
    *self.tx.borrow()
  }

  #[cfg(test)]
  pub fn set(&self, connectivity: Connectivity) {
    publish(&self.tx, connectivity);
  }

  /// Subscribe to availability changes. Dropping the watch unsubscribes.
  pub fn observe(&self) -> ConnectivityWatch {
    ConnectivityWatch {
      rx: self.tx.subscribe(),
      last: None,
    }
  }
}

impl Drop for NetworkMonitor {
  fn drop(&mut self) {
    if let Some(task) = self.probe_task.take() {
      task.abort();
    }
  }
}

fn publish(tx: &watch::Sender<Connectivity>, reading: Connectivity) {
  let changed = tx.send_if_modified(|current| {
    if *current == reading {
      false
    } else {
      *current = reading;
      true
    }
  });
  if changed {
    info!(
      active = reading.active,
      validated = reading.validated,
      "Connectivity changed"
    );
  }
}

/// Subscription to availability transitions.
pub struct ConnectivityWatch {
  rx: watch::Receiver<Connectivity>,
  last: Option<bool>,
}

impl ConnectivityWatch {
  /// Next availability value: the current one first, then only transitions.
  ///
  /// Returns `None` once the monitor is gone.
  pub async fn next(&mut self) -> Option<bool> {
    loop {
      if self.last.is_some() && self.rx.changed().await.is_err() {
        return None;
      }
      let available = self.rx.borrow_and_update().is_available();
      if self.last != Some(available) {
        self.last = Some(available);
        return Some(available);
      }
    }
  }

  pub fn into_stream(self) -> impl Stream<Item = bool> {
    futures::stream::unfold(self, |mut watch| async move {
      watch.next().await.map(|available| (available, watch))
    })
  }
}
