//! Pending acknowledgment store.
//!
//! Tracks every in-flight exchange by the packet type the client is waiting
//! for and the packet identifier, together with what is needed to resend.

use std::collections::BTreeMap;

use tokio::time::Instant;
use tracing::debug;

use crate::protocol::PacketType;
use crate::types::Message;

/// An exchange waiting for its next packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAck {
    /// Message to resend while the PUBLISH itself is unacknowledged.
    pub retry: Option<Message>,
    /// When the current step should be resent.
    pub retry_after: Instant,
}

impl PendingAck {
    pub fn new(retry_after: Instant) -> Self {
        Self {
            retry: None,
            retry_after,
        }
    }

    pub fn with_retry(mut self, message: Message) -> Self {
        self.retry = Some(message);
        self
    }
}

/// In-memory index of pending acknowledgments keyed by `(awaited type, id)`.
#[derive(Debug, Default)]
pub struct PendingStore {
    waits: BTreeMap<(PacketType, u16), PendingAck>,
}

impl PendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing is awaited for `packet_type`, or for the exact
    /// `(packet_type, pkid)` when an id is given.
    pub fn is_empty(&self, packet_type: PacketType, pkid: Option<u16>) -> bool {
        match pkid {
            Some(pkid) => !self.waits.contains_key(&(packet_type, pkid)),
            None => self.waits.range(Self::bounds(packet_type)).next().is_none(),
        }
    }

    /// Start waiting for `packet_type` with `pkid`.
    ///
    /// Does nothing if the same wait is already registered. Returns whether
    /// a new entry was created.
    pub fn add_wait(&mut self, packet_type: PacketType, pkid: u16, wait: PendingAck) -> bool {
        if self.waits.contains_key(&(packet_type, pkid)) {
            return false;
        }
        debug!("Waiting for {} pkid={}", packet_type, pkid);
        self.waits.insert((packet_type, pkid), wait);
        true
    }

    /// Stop waiting, returning the removed entry.
    pub fn del_wait(&mut self, packet_type: PacketType, pkid: u16) -> Option<PendingAck> {
        let removed = self.waits.remove(&(packet_type, pkid));
        if removed.is_some() {
            debug!("Forgot {} pkid={}", packet_type, pkid);
        }
        removed
    }

    pub fn get_wait(&self, packet_type: PacketType, pkid: u16) -> Option<&PendingAck> {
        self.waits.get(&(packet_type, pkid))
    }

    /// Identifiers awaiting `packet_type`, ascending.
    pub fn get_waits(&self, packet_type: PacketType) -> Vec<u16> {
        self.waits
            .range(Self::bounds(packet_type))
            .map(|((_, pkid), _)| *pkid)
            .collect()
    }

    /// Number of live entries across all types.
    pub fn count_waits(&self) -> usize {
        self.waits.len()
    }

    /// Push back the resend deadline of an existing entry.
    pub fn refresh(&mut self, packet_type: PacketType, pkid: u16, retry_after: Instant) -> bool {
        match self.waits.get_mut(&(packet_type, pkid)) {
            Some(wait) => {
                wait.retry_after = retry_after;
                true
            }
            None => false,
        }
    }

    /// Move every deadline to `at`, used after a reconnect.
    pub fn reschedule_all(&mut self, at: Instant) {
        for wait in self.waits.values_mut() {
            wait.retry_after = at;
        }
    }

    /// Earliest resend deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.waits.values().map(|wait| wait.retry_after).min()
    }

    /// Entries whose deadline is at or before `now`.
    pub fn expired(&self, now: Instant) -> Vec<(PacketType, u16)> {
        self.waits
            .iter()
            .filter(|(_, wait)| wait.retry_after <= now)
            .map(|(key, _)| *key)
            .collect()
    }

    /// Whether `pkid` is used by any in-flight exchange.
    pub fn contains_id(&self, pkid: u16) -> bool {
        self.waits.keys().any(|(_, id)| *id == pkid)
    }

    /// Remove every entry awaiting `packet_type`. Returns how many were removed.
    pub fn clear_type(&mut self, packet_type: PacketType) -> usize {
        let before = self.waits.len();
        self.waits.retain(|(awaited, _), _| *awaited != packet_type);
        before - self.waits.len()
    }

    pub fn clear(&mut self) {
        self.waits.clear();
    }

    fn bounds(packet_type: PacketType) -> std::ops::RangeInclusive<(PacketType, u16)> {
        (packet_type, 0)..=(packet_type, u16::MAX)
    }
}
