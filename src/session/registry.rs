use crate::config::SessionConfig;
use crate::session::flow::FlowKey;
use crate::session::guard::BusyGuard;
use crate::session::session::{Session, Transport};
use crate::session::state::SessionState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::Arc;

/// Active sessions keyed by flow tuple.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<FlowKey, Arc<Session>>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        SessionRegistry {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a TCP session for a new tuple. `None` if the tuple already has one.
    pub fn create_tcp(&self, key: FlowKey) -> Option<Arc<Session>> {
        match self.sessions.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                let session = Arc::new(Session::new(key, Transport::Tcp, &self.config));
                entry.insert(session.clone());
                info!("New TCP session {}", key);
                Some(session)
            }
        }
    }

    pub fn get_or_create_udp(&self, key: FlowKey) -> Arc<Session> {
        self.sessions
            .entry(key)
            .or_insert_with(|| {
                info!("New UDP session {}", key);
                Arc::new(Session::new(key, Transport::Udp, &self.config))
            })
            .clone()
    }

    pub fn get(&self, key: &FlowKey) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, key: &FlowKey) -> Option<Arc<Session>> {
        self.sessions.remove(key).map(|(_, session)| session)
    }

    /// Abort the session and drop it from the registry.
    pub fn close(&self, key: &FlowKey) -> Option<Arc<Session>> {
        let session = self.remove(key)?;
        session.abort();
        info!("Closed session {}", key);
        Some(session)
    }

    /// Drop every terminated session no worker is still servicing. Returns how many were removed.
    pub fn reap(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|key, session| {
            let done = session.state() == SessionState::Terminated && session.is_idle();
            if done {
                debug!("Reaping session {}", key);
            }
            !done
        });
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of the current sessions.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Claim the read direction of `session`, or `None` to skip it this cycle. A session whose receive buffer is
    /// past its high-water mark is skipped until the client drains it.
    pub fn try_read<'a>(&self, session: &'a Session) -> Option<BusyGuard<'a>> {
        if session.is_aborting() {
            return None;
        }
        if session.is_receive_buffer_full() {
            debug!("Receive buffer full for {}, not reading", session.key());
            return None;
        }
        session.try_busy_read()
    }

    /// Claim the write direction of `session`, or `None` to skip it this cycle.
    pub fn try_write<'a>(&self, session: &'a Session) -> Option<BusyGuard<'a>> {
        if session.is_aborting() {
            return None;
        }
        session.try_busy_write()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use std::net::Ipv4Addr;

    fn key(port: u16) -> FlowKey {
        FlowKey::new(Ipv4Addr::new(10, 0, 0, 2), port, Ipv4Addr::new(1, 1, 1, 1), 443)
    }

    #[test]
    fn test_create_tcp_once_per_tuple() {
        let registry = SessionRegistry::default();
        let first = registry.create_tcp(key(1000)).unwrap();
        assert!(registry.create_tcp(key(1000)).is_none());
        assert_eq!(registry.len(), 1);

        let found = registry.get(&key(1000)).unwrap();
        assert!(Arc::ptr_eq(&first, &found));
        assert_eq!(found.transport(), Transport::Tcp);
    }

    #[test]
    fn test_get_or_create_udp_reuses_session() {
        let registry = SessionRegistry::default();
        let a = registry.get_or_create_udp(key(53));
        let b = registry.get_or_create_udp(key(53));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.transport(), Transport::Udp);
    }

    #[test]
    fn test_concurrent_create_yields_one_winner() {
        let registry = SessionRegistry::default();
        let winners: usize = (0..256)
            .into_par_iter()
            .map(|_| registry.create_tcp(key(2000)).map_or(0, |_| 1))
            .sum();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_close_aborts_and_removes() {
        let registry = SessionRegistry::default();
        let session = registry.create_tcp(key(3000)).unwrap();

        let closed = registry.close(&key(3000)).unwrap();
        assert!(Arc::ptr_eq(&session, &closed));
        assert!(session.is_aborting());
        assert!(registry.get(&key(3000)).is_none());
        assert!(registry.close(&key(3000)).is_none());
    }

    #[test]
    fn test_reap_waits_for_in_flight_work() {
        let registry = SessionRegistry::default();
        let busy = registry.create_tcp(key(1)).unwrap();
        let idle = registry.create_tcp(key(2)).unwrap();
        registry.create_tcp(key(3)).unwrap();

        let guard = busy.try_busy_write().unwrap();
        busy.abort();
        idle.abort();

        assert_eq!(registry.reap(), 1);
        assert!(registry.get(&key(1)).is_some());
        assert!(registry.get(&key(2)).is_none());

        drop(guard);
        assert_eq!(registry.reap(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.sessions()[0].key(), key(3));
    }

    #[test]
    fn test_try_read_skips_busy_and_aborted() {
        let registry = SessionRegistry::default();
        let session = registry.create_tcp(key(4000)).unwrap();

        let guard = registry.try_read(&session).unwrap();
        assert!(registry.try_read(&session).is_none());
        assert!(registry.try_write(&session).is_some());
        drop(guard);

        session.abort();
        assert!(registry.try_read(&session).is_none());
        assert!(registry.try_write(&session).is_none());
    }

    #[test]
    fn test_try_read_waits_for_receive_buffer_to_drain() {
        let registry = SessionRegistry::new(SessionConfig {
            receive_buffer_capacity: 8,
            ..Default::default()
        });
        let session = registry.create_tcp(key(5000)).unwrap();

        session.add_received_data(b"12345678");
        assert!(registry.try_read(&session).is_none());
        assert!(registry.try_write(&session).is_some());

        session.take_received_data(1);
        assert!(registry.try_read(&session).is_some());
    }
}
