use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::http::{header, HeaderMap, HeaderValue};
use server_api::GameSession;
use shared::domain::SessionId;
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::debug;

pub(crate) const SESSION_COOKIE: &str = "session_id";

struct SessionEntry {
    session: GameSession,
    last_seen: Instant,
}

/// In-memory game sessions keyed by the `session_id` cookie.
///
/// Handlers load a copy, mutate it, and save it back; concurrent requests for
/// the same session are last-write-wins. Sessions not saved within `idle_ttl`
/// read as empty and are dropped by [`SessionStore::evict_idle`].
#[derive(Clone)]
pub(crate) struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    idle_ttl: Duration,
}

impl SessionStore {
    pub(crate) fn new(idle_ttl: Duration) -> Self {
        Self {
            inner: Arc::default(),
            idle_ttl,
        }
    }

    pub(crate) async fn load(&self, id: SessionId) -> GameSession {
        self.load_at(id, Instant::now()).await
    }

    async fn load_at(&self, id: SessionId, now: Instant) -> GameSession {
        self.inner
            .read()
            .await
            .get(&id)
            .filter(|entry| !self.is_idle(entry, now))
            .map(|entry| entry.session.clone())
            .unwrap_or_default()
    }

    pub(crate) async fn save(&self, id: SessionId, session: GameSession) {
        self.save_at(id, session, Instant::now()).await;
    }

    async fn save_at(&self, id: SessionId, session: GameSession, now: Instant) {
        let mut sessions = self.inner.write().await;
        if session == GameSession::default() {
            sessions.remove(&id);
        } else {
            sessions.insert(
                id,
                SessionEntry {
                    session,
                    last_seen: now,
                },
            );
        }
    }

    /// Drops sessions idle for longer than the TTL. Returns how many went.
    pub(crate) async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now()).await
    }

    async fn evict_idle_at(&self, now: Instant) -> usize {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_idle(entry, now));
        before - sessions.len()
    }

    fn is_idle(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_seen) > self.idle_ttl
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// Sweeps idle sessions every `period` until the returned task is aborted.
pub(crate) fn spawn_idle_sweeper(store: SessionStore, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle().await;
            if evicted > 0 {
                debug!(evicted, "idle sessions evicted");
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SessionCookie {
    pub(crate) id: SessionId,
    pub(crate) issued: bool,
}

impl SessionCookie {
    /// Reuses the id from the request cookie, or issues a fresh one.
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        match session_id_from_headers(headers) {
            Some(id) => Self { id, issued: false },
            None => Self {
                id: SessionId::generate(),
                issued: true,
            },
        }
    }

    /// `Set-Cookie` value, only when the id was issued by this request.
    pub(crate) fn set_cookie(&self) -> Option<HeaderValue> {
        if !self.issued {
            return None;
        }
        HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
            self.id
        ))
        .ok()
    }
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find_map(SessionId::parse)
}
