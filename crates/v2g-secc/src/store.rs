//! Session store: in-memory authoritative, Redis mirror advisory
//!
//! The in-memory map is the source of truth; every mutation is also
//! written through to the external cache when one is configured, so an
//! operator can observe sessions out of band. The reverse direction
//! exists too: a poller reads the cache's cancellation set and running
//! sessions pick the request up at their next loop exchange. Mirror
//! failures in either direction degrade silently to in-memory only.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use v2g_core::session::{SessionId, SessionRecord};

use crate::config::RedisEndpoint;

const MIRROR_KEY_PREFIX: &str = "v2g:session:";
/// Operator interface: `SADD v2g:sessions:cancelled <16-hex id>`.
const MIRROR_CANCEL_SET: &str = "v2g:sessions:cancelled";
const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(1);

struct Mirror {
    client: redis::Client,
}

/// Process-scoped map of session id to record, plus the set of
/// sessions an operator asked to terminate.
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
    cancelled: Arc<RwLock<HashSet<SessionId>>>,
    mirror: Option<Mirror>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            cancelled: Arc::new(RwLock::new(HashSet::new())),
            mirror: None,
        }
    }

    /// Attach the write-through mirror and start the cancellation
    /// poller. A bad endpoint only disables mirroring; the store
    /// itself always works.
    pub fn with_mirror(endpoint: &RedisEndpoint) -> Self {
        let url = format!("redis://{}:{}/", endpoint.host, endpoint.port);
        let store = Self::new();
        let mirror = match redis::Client::open(url.as_str()) {
            Ok(client) => Some(Mirror { client }),
            Err(e) => {
                debug!(url = %url, error = %e, "session mirror disabled");
                None
            }
        };
        if let Some(mirror) = &mirror {
            spawn_cancel_poller(mirror.client.clone(), store.cancelled.clone());
        }
        Self { mirror, ..store }
    }

    pub fn insert(&self, record: SessionRecord) {
        self.mirror_write(&record);
        self.sessions.write().insert(record.session_id, record);
    }

    /// Mutate a record in place; no-op when the id is unknown.
    pub fn update(&self, id: SessionId, f: impl FnOnce(&mut SessionRecord)) {
        let mut sessions = self.sessions.write();
        if let Some(record) = sessions.get_mut(&id) {
            f(record);
            let snapshot = record.clone();
            drop(sessions);
            self.mirror_write(&snapshot);
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn all(&self) -> Vec<SessionRecord> {
        self.sessions.read().values().cloned().collect()
    }

    /// Ask a running session to terminate at its next loop exchange.
    /// Also reachable out of band through the mirror's cancellation
    /// set.
    pub fn request_cancel(&self, id: SessionId) {
        self.cancelled.write().insert(id);
    }

    /// Whether an operator asked this session to terminate.
    pub fn cancel_requested(&self, id: &SessionId) -> bool {
        self.cancelled.read().contains(id)
    }

    /// Fire-and-forget write-through. The mirror is advisory only.
    fn mirror_write(&self, record: &SessionRecord) {
        let Some(mirror) = &self.mirror else { return };
        let key = format!("{}{}", MIRROR_KEY_PREFIX, record.session_id.to_hex());
        let payload = match serde_json::to_string(record) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "session record not serializable, skipping mirror");
                return;
            }
        };
        let client = mirror.client.clone();
        tokio::spawn(async move {
            let mut conn = match client.get_async_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    debug!(error = %e, "session mirror unreachable");
                    return;
                }
            };
            if let Err(e) = redis::AsyncCommands::set::<_, _, ()>(&mut conn, key, payload).await {
                debug!(error = %e, "session mirror write failed");
            }
        });
    }
}

/// Periodically read the cancellation set back from the mirror into
/// the in-memory set the sessions consult.
fn spawn_cancel_poller(client: redis::Client, cancelled: Arc<RwLock<HashSet<SessionId>>>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CANCEL_POLL_INTERVAL);
        loop {
            ticker.tick().await;
            let mut conn = match client.get_async_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    debug!(error = %e, "cancellation poll skipped, mirror unreachable");
                    continue;
                }
            };
            let members: Vec<String> = match redis::AsyncCommands::smembers(
                &mut conn,
                MIRROR_CANCEL_SET,
            )
            .await
            {
                Ok(members) => members,
                Err(e) => {
                    debug!(error = %e, "cancellation poll failed");
                    continue;
                }
            };
            for member in members {
                match SessionId::from_hex(member.trim()) {
                    Some(id) => {
                        if cancelled.write().insert(id) {
                            debug!(session_id = %id, "operator cancellation received");
                        }
                    }
                    None => debug!(entry = %member, "ignoring malformed cancellation entry"),
                }
            }
        }
    });
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use v2g_core::session::SessionPhase;

    #[test]
    fn insert_update_get() {
        let store = SessionStore::new();
        let id = SessionId::random();
        store.insert(SessionRecord::new(id, false, 1_700_000_000));
        assert_eq!(store.len(), 1);

        store.update(id, |r| {
            r.phase = SessionPhase::Terminated;
            r.state = "SessionStop".to_string();
        });
        let record = store.get(&id).unwrap();
        assert_eq!(record.phase, SessionPhase::Terminated);
        assert_eq!(record.state, "SessionStop");
    }

    #[test]
    fn unknown_id_update_is_noop() {
        let store = SessionStore::new();
        store.update(SessionId::random(), |r| r.state = "nope".to_string());
        assert!(store.is_empty());
    }

    #[test]
    fn cancel_requests_are_per_session() {
        let store = SessionStore::new();
        let a = SessionId::random();
        let b = SessionId::random();
        store.request_cancel(a);
        assert!(store.cancel_requested(&a));
        assert!(!store.cancel_requested(&b));
    }
}
