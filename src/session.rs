//! Push-channel sessions and the registry of live connections.
//!
//! A [`SessionHandle`] is the only way to reach a connection from outside
//! its task: frames queued on the handle are drained by the connection's
//! writer task. The registry never touches sockets.

use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound side of one push-channel connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    tx: mpsc::UnboundedSender<String>,
}

impl SessionHandle {
    /// Create a handle and the receiver its writer task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            id: SessionId::new(),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a text frame. Returns `false` once the connection is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx.send(text.into()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Live push-channel sessions.
///
/// All operations are safe under concurrent use; [`snapshot`](Self::snapshot)
/// copies the handles out so callers can iterate while sessions come and go.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session. Registering the same id twice keeps one entry.
    pub fn register(&self, session: SessionHandle) {
        let id = session.id();
        if self.sessions.insert(id, session).is_none() {
            tracing::info!(session_id = %id, active = self.sessions.len(), "Session connected");
        }
    }

    /// Remove a session; no-op if absent.
    pub fn unregister(&self, id: SessionId) -> Option<SessionHandle> {
        let removed = self.sessions.remove(&id).map(|(_, handle)| handle);
        if removed.is_some() {
            tracing::info!(session_id = %id, active = self.sessions.len(), "Session disconnected");
        }
        removed
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Copy of the current sessions, in no particular order.
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = SessionHandle::new();
        let (b, _rx_b) = SessionHandle::new();

        registry.register(a.clone());
        registry.register(b.clone());
        registry.register(a.clone());
        assert_eq!(registry.len(), 2);

        assert!(registry.unregister(a.id()).is_some());
        assert!(registry.unregister(a.id()).is_none());

        let ids: Vec<_> = registry.snapshot().iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![b.id()]);
    }

    #[test]
    fn test_send_text_reaches_receiver() {
        let (handle, mut rx) = SessionHandle::new();
        assert!(handle.send_text("Error: Invalid payload format"));
        assert_eq!(rx.try_recv().unwrap(), "Error: Invalid payload format");

        drop(rx);
        assert!(!handle.send_text("late"));
        assert!(handle.is_closed());
    }

    #[test]
    fn test_snapshot_survives_concurrent_mutation() {
        let registry = Arc::new(ConnectionRegistry::new());
        let keep: Vec<_> = (0..16).map(|_| SessionHandle::new()).collect();
        for (handle, _) in &keep {
            registry.register(handle.clone());
        }

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let (handle, _rx) = SessionHandle::new();
                        let id = handle.id();
                        registry.register(handle);
                        for session in registry.snapshot() {
                            let _ = session.id();
                        }
                        registry.unregister(id);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let expected: HashSet<_> = keep.iter().map(|(h, _)| h.id()).collect();
        let actual: HashSet<_> = registry.snapshot().iter().map(|h| h.id()).collect();
        assert_eq!(actual, expected);
    }
}
