//! Scripted image source for testing.

use crate::ImageSource;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{RwLock, watch};

/// Scripted [`ImageSource`] for tests.
///
/// Serves bodies registered with [`serve`](Self::serve), counts every request,
/// and can simulate outages for a single URL or for everything. A
/// [`hold`](Self::hold)/[`release`](Self::release) gate parks every fetch
/// mid-flight so tests can observe a pass while it is running.
///
/// # Examples
///
/// ```
/// use shelf_remote::source::MockSource;
/// use shelf_remote::ImageSource;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let source = MockSource::default();
/// source.serve("http://x/a.jpg", b"jpeg").await;
/// assert_eq!(source.fetch("http://x/a.jpg").await.unwrap(), b"jpeg");
/// source.take_down("http://x/a.jpg").await;
/// assert!(source.fetch("http://x/a.jpg").await.is_err());
/// assert_eq!(source.requests(), 2);
/// # }
/// ```
pub struct MockSource {
    bodies: RwLock<HashMap<String, Vec<u8>>>,
    down: RwLock<HashSet<String>>,
    offline: watch::Sender<bool>,
    gate: watch::Sender<bool>,
    requests: AtomicUsize,
    per_url: RwLock<HashMap<String, usize>>,
}

impl MockSource {
    /// Register a response body for `url`.
    pub async fn serve(&self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.bodies.write().await.insert(url.into(), body.into());
    }

    /// Make `url` fail until [`restore`](Self::restore) is called.
    pub async fn take_down(&self, url: impl Into<String>) {
        self.down.write().await.insert(url.into());
    }

    pub async fn restore(&self, url: &str) {
        self.down.write().await.remove(url);
    }

    /// Simulate the whole network being unavailable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.send_replace(offline);
    }

    /// Park every subsequent fetch until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Total number of fetches attempted, including failed ones.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Number of fetches attempted for a single URL.
    pub async fn requests_for(&self, url: &str) -> usize {
        self.per_url.read().await.get(url).copied().unwrap_or(0)
    }
}
impl Default for MockSource {
    fn default() -> Self {
        Self {
            bodies: RwLock::new(HashMap::new()),
            down: RwLock::new(HashSet::new()),
            offline: watch::Sender::new(false),
            gate: watch::Sender::new(true),
            requests: AtomicUsize::new(0),
            per_url: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ImageSource for MockSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.per_url.write().await.entry(url.to_string()).or_default() += 1;

        let mut gate = self.gate.subscribe();
        // The sender lives as long as `self`, so this can't observe a close.
        _ = gate.wait_for(|open| *open).await;

        let offline = *self.offline.borrow();
        if offline || self.down.read().await.contains(url) {
            exn::bail!(ErrorKind::Request(format!("simulated outage: {url}")));
        }
        match self.bodies.read().await.get(url) {
            Some(body) if body.is_empty() => exn::bail!(ErrorKind::EmptyBody),
            Some(body) => Ok(body.clone()),
            None => exn::bail!(ErrorKind::Status(404)),
        }
    }
}
