//! Session store: browser session id → upstream client.
//!
//! A single reader/writer lock guards the id index and the recency list
//! together. Lookups take the shared lock; create, touch, destroy and sweep
//! take the exclusive one. Lookups never touch recency inline, they queue the
//! id for the [`RecencyUpdater`] so a burst of reads is not serialized behind
//! list mutation.
//!
//! Every touch moves its entry to the front, so the list stays sorted by
//! last access, newest first. The sweep relies on that and stops at the first
//! entry from the back that is still fresh.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use cookie::Cookie;
use rand::rngs::OsRng;
use rand::RngCore;
use reqwest::header::{HeaderMap, COOKIE};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, MissedTickBehavior};

use crate::config::SessionConfig;
use crate::observability::metrics;
use crate::session::client::UpstreamClient;
use crate::session::recency::{NodeHandle, RecencyList};

/// Random bytes behind every session id.
pub const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("random source failed: {0}")]
    RandomSource(#[from] rand::Error),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// One browser's binding to an upstream client.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub last_accessed: Instant,
    pub client: UpstreamClient,
}

/// Result of [`SessionStore::resolve`].
#[derive(Debug)]
pub struct ResolvedSession {
    pub client: UpstreamClient,
    /// Set when a new session was created and its cookie must be sent.
    pub issued: Option<String>,
}

#[derive(Default)]
struct Inner {
    index: HashMap<String, NodeHandle>,
    recency: RecencyList<Session>,
}

impl Inner {
    fn remove(&mut self, id: &str) -> Option<Session> {
        let handle = self.index.remove(id)?;
        self.recency.remove(handle)
    }
}

pub struct SessionStore {
    inner: RwLock<Inner>,
    touches: mpsc::UnboundedSender<String>,
    cookie_name: String,
    max_lifetime: Duration,
    max_redirects: usize,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("cookie_name", &self.cookie_name)
            .field("max_lifetime", &self.max_lifetime)
            .field("sessions", &self.len())
            .finish()
    }
}

impl SessionStore {
    /// Create an empty store together with the worker that applies its
    /// recency updates. The worker must be spawned for lookups to refresh
    /// recency.
    pub fn new(config: &SessionConfig) -> (Arc<Self>, RecencyUpdater) {
        let (touches, rx) = mpsc::unbounded_channel();
        let store = Arc::new(Self {
            inner: RwLock::new(Inner::default()),
            touches,
            cookie_name: config.cookie_name.clone(),
            max_lifetime: config.max_lifetime(),
            max_redirects: config.max_redirects,
        });
        let updater = RecencyUpdater {
            store: store.clone(),
            rx,
        };
        (store, updater)
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// Return the client for `cookie_value`, creating a new session when the
    /// value is absent, empty, or names no live session.
    pub fn resolve(&self, cookie_value: Option<&str>) -> Result<ResolvedSession, SessionError> {
        if let Some(client) = cookie_value.filter(|v| !v.is_empty()).and_then(|id| self.get(id)) {
            return Ok(ResolvedSession {
                client,
                issued: None,
            });
        }

        let session = self.create()?;
        Ok(ResolvedSession {
            client: session.client,
            issued: Some(session.id),
        })
    }

    /// Allocate a new session with a fresh id and client.
    pub fn create(&self) -> Result<Session, SessionError> {
        let id = generate_session_id()?;
        let client = UpstreamClient::new(self.max_redirects)?;
        let session = Session {
            id: id.clone(),
            last_accessed: Instant::now(),
            client,
        };

        let count = {
            let mut inner = self.write();
            let handle = inner.recency.push_front(session.clone());
            inner.index.insert(id.clone(), handle);
            inner.index.len()
        };

        tracing::debug!(session = %id, sessions = count, "Session created");
        metrics::record_session_created();
        metrics::record_active_sessions(count);
        Ok(session)
    }

    /// Look up a live session's client and queue a recency refresh for it.
    pub fn get(&self, id: &str) -> Option<UpstreamClient> {
        let client = {
            let inner = self.read();
            let handle = *inner.index.get(id)?;
            inner.recency.get(handle)?.client.clone()
        };

        if self.touches.send(id.to_string()).is_err() {
            tracing::debug!(session = %id, "Recency updater gone, skipping touch");
        }
        Some(client)
    }

    /// Mark a session as just used. Unknown ids are ignored.
    pub fn touch(&self, id: &str) {
        let mut inner = self.write();
        let Some(handle) = inner.index.get(id).copied() else {
            return;
        };
        if let Some(session) = inner.recency.get_mut(handle) {
            session.last_accessed = Instant::now();
        }
        inner.recency.move_to_front(handle);
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn destroy(&self, id: &str) {
        let (removed, count) = {
            let mut inner = self.write();
            let removed = inner.remove(id).is_some();
            (removed, inner.index.len())
        };
        if removed {
            tracing::debug!(session = %id, "Session destroyed");
            metrics::record_active_sessions(count);
        }
    }

    /// Expire sessions idle for longer than the max lifetime.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Expire sessions idle for longer than the max lifetime as of `now`.
    /// Returns the number of sessions removed.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut expired = Vec::new();
        let remaining = {
            let mut inner = self.write();
            while let Some((handle, session)) = inner.recency.back() {
                if now.saturating_duration_since(session.last_accessed) <= self.max_lifetime {
                    break;
                }
                let id = session.id.clone();
                inner.recency.remove(handle);
                inner.index.remove(&id);
                expired.push(id);
            }
            inner.index.len()
        };

        for id in &expired {
            tracing::debug!(session = %id, "Session expired");
        }
        if !expired.is_empty() {
            tracing::info!(expired = expired.len(), remaining, "Expired idle sessions");
            metrics::record_sessions_expired(expired.len());
        }
        metrics::record_active_sessions(remaining);
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().index.contains_key(id)
    }

    pub fn last_accessed(&self, id: &str) -> Option<Instant> {
        let inner = self.read();
        let handle = *inner.index.get(id)?;
        inner.recency.get(handle).map(|s| s.last_accessed)
    }

    /// Session ids ordered from most to least recently used.
    pub fn ids_by_recency(&self) -> Vec<String> {
        self.read().recency.iter().map(|s| s.id.clone()).collect()
    }

    /// Find this store's session cookie among the request's `Cookie` headers.
    /// The returned value is already percent-decoded.
    pub fn session_id_from_headers(&self, headers: &HeaderMap) -> Option<String> {
        cookie_value(headers, &self.cookie_name)
    }

    /// The `Set-Cookie` value that binds a browser to session `id`.
    pub fn session_cookie(&self, id: &str) -> String {
        Cookie::build((self.cookie_name.clone(), id.to_string()))
            .path("/")
            .http_only(true)
            .build()
            .encoded()
            .to_string()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().expect("session store lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().expect("session store lock poisoned")
    }
}

/// Look up a cookie by name across all `Cookie` headers, percent-decoding its value.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

/// Generate a URL-safe session id from the OS random source.
fn generate_session_id() -> Result<String, SessionError> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(URL_SAFE.encode(bytes))
}

/// Applies queued recency refreshes off the lookup path.
pub struct RecencyUpdater {
    store: Arc<SessionStore>,
    rx: mpsc::UnboundedReceiver<String>,
}

impl RecencyUpdater {
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                id = self.rx.recv() => match id {
                    Some(id) => self.store.touch(&id),
                    None => break,
                },
                _ = shutdown.recv() => {
                    tracing::debug!("Recency updater received shutdown signal");
                    break;
                }
            }
        }
    }
}

/// Periodic expiry of idle sessions. Runs every `max_lifetime`; a sweep
/// finishes before the next tick is awaited, so sweeps never overlap.
pub struct SessionSweeper {
    store: Arc<SessionStore>,
    period: Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<SessionStore>) -> Self {
        let period = store.max_lifetime();
        Self { store, period }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.period, "Session sweeper starting");

        let mut ticker = time::interval_at(time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.store.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Session sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
