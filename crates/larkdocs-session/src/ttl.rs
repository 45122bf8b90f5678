//! Idle tracking for session expiration.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::session::SessionId;

/// Tracks last access times for idle-based expiration.
///
/// Uses a monotonic clock so wall-clock jumps never expire or revive
/// sessions.
#[derive(Debug)]
pub struct TtlTracker {
    access_times: HashMap<SessionId, Instant>,
    ttl: Option<Duration>,
}

impl TtlTracker {
    /// Create a new tracker with the given idle timeout.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            access_times: HashMap::new(),
            ttl,
        }
    }

    /// Record an access for a session (resets its idle timer).
    pub fn touch(&mut self, id: &SessionId) {
        self.access_times.insert(*id, Instant::now());
    }

    /// Check if a session has been idle longer than the timeout.
    pub fn is_expired(&self, id: &SessionId) -> bool {
        match self.ttl {
            None => false,
            Some(ttl) => match self.access_times.get(id) {
                None => true, // No access record = expired
                Some(last_access) => last_access.elapsed() > ttl,
            },
        }
    }

    /// Remove tracking for a session.
    pub fn remove(&mut self, id: &SessionId) {
        self.access_times.remove(id);
    }

    /// Remove all expired entries and return their IDs.
    pub fn drain_expired(&mut self) -> Vec<SessionId> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };

        let now = Instant::now();
        let expired: Vec<SessionId> = self
            .access_times
            .iter()
            .filter(|(_, last_access)| now.duration_since(**last_access) > ttl)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            self.access_times.remove(id);
        }
        expired
    }

    /// Get the number of tracked sessions.
    pub fn len(&self) -> usize {
        self.access_times.len()
    }

    /// Check if there are no tracked sessions.
    pub fn is_empty(&self) -> bool {
        self.access_times.is_empty()
    }
}
