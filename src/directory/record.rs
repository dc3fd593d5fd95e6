// Host Records - one entry per known host
//
// A record is created from the first announcement received (or at startup
// for the local host) and refreshed by every announcement after that.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Advertised availability of a host
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostStatus {
    /// No status set yet; the host is not advertising
    #[default]
    Unset,
    /// Sitting in the lobby, available for a session
    Lobby,
    /// Announced intent to start a session
    Start,
    /// Left the network or started a local-only game
    Offline,
}

/// The advertised fields of an announcement, as sent on the wire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFields {
    pub status: HostStatus,
    pub hostname: String,
    pub player_count: u32,
    pub max_capacity: u32,
    pub ai_capable: bool,
}

/// One known host and when we last heard from it
#[derive(Clone, Debug)]
pub struct HostRecord {
    address: Ipv4Addr,
    fields: HostFields,
    last_seen: Instant,
}

impl HostRecord {
    pub fn new(address: Ipv4Addr, fields: HostFields, now: Instant) -> Self {
        Self {
            address,
            fields,
            last_seen: now,
        }
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn status(&self) -> HostStatus {
        self.fields.status
    }

    pub fn hostname(&self) -> &str {
        &self.fields.hostname
    }

    pub fn player_count(&self) -> u32 {
        self.fields.player_count
    }

    pub fn max_capacity(&self) -> u32 {
        self.fields.max_capacity
    }

    pub fn ai_capable(&self) -> bool {
        self.fields.ai_capable
    }

    pub fn fields(&self) -> &HostFields {
        &self.fields
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Merge a fresh announcement into this record and stamp it.
    ///
    /// `last_seen` only moves forward; a stale `now` is ignored.
    pub fn refresh(&mut self, fields: HostFields, now: Instant) {
        self.fields = fields;
        if now > self.last_seen {
            self.last_seen = now;
        }
    }

    pub fn set_status(&mut self, status: HostStatus) {
        self.fields.status = status;
    }

    /// Check whether this record has gone stale
    pub fn is_stale(&self, now: Instant, expiry: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > expiry
    }
}
