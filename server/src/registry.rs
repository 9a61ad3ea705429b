//! Session registry: the authoritative set of live connections
//!
//! The registry has its own lock, independent of the per-connection session
//! locks, and never holds both at once. Enumeration copies the membership
//! under the registry lock, releases it, and only then inspects each
//! connection under that connection's own lock, one connection at a time.
//!
//! A room index narrows room queries. It is updated after the session field
//! it mirrors, so it can briefly contain a connection that already left; every
//! room query therefore re-checks the session's room before returning it.

use crate::connection::{Connection, Session};
use crate::error::ServerError;
use crate::room::RoomId;
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Index {
    connections: HashMap<String, Arc<Connection>>,
    rooms: HashMap<RoomId, HashSet<String>>,
}

/// Tracks every live connection, indexed by token and by room
pub struct SessionRegistry {
    index: RwLock<Index>,
    max_connections: usize,
}

impl SessionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            index: RwLock::new(Index::default()),
            max_connections,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a connection, failing when the registry is at capacity
    pub fn register(&self, conn: Arc<Connection>) -> Result<(), ServerError> {
        let mut index = self.write();
        if index.connections.len() >= self.max_connections {
            warn!(
                "Rejecting {}: {} connections already registered",
                conn.addr(),
                index.connections.len()
            );
            return Err(ServerError::Full(self.max_connections));
        }

        info!("Connection {} registered from {}", conn.token(), conn.addr());
        index.connections.insert(conn.token().to_string(), conn);
        Ok(())
    }

    /// Removes a connection and any room index entry pointing at it
    pub fn unregister(&self, token: &str) -> Option<Arc<Connection>> {
        let mut index = self.write();
        let conn = index.connections.remove(token)?;
        index.rooms.retain(|_, members| {
            members.remove(token);
            !members.is_empty()
        });
        info!("Connection {} unregistered", token);
        Some(conn)
    }

    pub fn get(&self, token: &str) -> Option<Arc<Connection>> {
        self.read().connections.get(token).cloned()
    }

    /// Every registered connection at the time of the call
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.read().connections.values().cloned().collect()
    }

    /// Connections whose session matches `predicate`
    ///
    /// The membership set is a consistent snapshot; each session is read
    /// under its own lock while the registry lock is not held.
    pub fn find(&self, predicate: impl Fn(&Session) -> bool) -> Vec<Arc<Connection>> {
        self.snapshot()
            .into_iter()
            .filter(|conn| conn.with_session(|s| predicate(s)))
            .collect()
    }

    /// Connections currently in `room` whose session matches `predicate`
    pub fn find_in_room(
        &self,
        room: RoomId,
        predicate: impl Fn(&Session) -> bool,
    ) -> Vec<Arc<Connection>> {
        let candidates: Vec<Arc<Connection>> = {
            let index = self.read();
            index
                .rooms
                .get(&room)
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|token| index.connections.get(token).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };

        candidates
            .into_iter()
            .filter(|conn| conn.with_session(|s| s.room == Some(room) && predicate(s)))
            .collect()
    }

    /// Records `token` as a member of `room` in the index
    pub fn index_join(&self, token: &str, room: RoomId) {
        let mut index = self.write();
        if index.connections.contains_key(token) {
            index
                .rooms
                .entry(room)
                .or_default()
                .insert(token.to_string());
        }
    }

    pub fn index_leave(&self, token: &str, room: RoomId) {
        let mut index = self.write();
        if let Some(members) = index.rooms.get_mut(&room) {
            members.remove(token);
            if members.is_empty() {
                index.rooms.remove(&room);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.read().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().connections.is_empty()
    }
}
