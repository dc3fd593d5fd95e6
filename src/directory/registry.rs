// Host Directory - the local table of known hosts
//
// Pure state plus a pruning rule. No sockets or clocks in here; callers
// pass `Instant::now()` in, which keeps expiry behavior testable.
//
// Iteration order matters: leader election and range dispatch must reach
// the same result on every host that holds the same snapshot, so walks go
// self first, then peers in ascending address order.

use crate::directory::record::{HostFields, HostRecord, HostStatus};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// The locally known table of hosts, self record included
#[derive(Clone, Debug)]
pub struct HostDirectory {
    self_addr: Ipv4Addr,
    hosts: BTreeMap<Ipv4Addr, HostRecord>,
}

impl HostDirectory {
    /// Create a directory holding only the local host's record
    pub fn new(self_addr: Ipv4Addr, hostname: &str, now: Instant) -> Self {
        let fields = HostFields {
            status: HostStatus::Unset,
            hostname: hostname.to_string(),
            player_count: 0,
            max_capacity: 0,
            ai_capable: false,
        };
        let mut hosts = BTreeMap::new();
        hosts.insert(self_addr, HostRecord::new(self_addr, fields, now));
        Self { self_addr, hosts }
    }

    pub fn self_addr(&self) -> Ipv4Addr {
        self.self_addr
    }

    pub fn self_record(&self) -> &HostRecord {
        // The self record is inserted at construction and never pruned.
        &self.hosts[&self.self_addr]
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn get(&self, address: Ipv4Addr) -> Option<&HostRecord> {
        self.hosts.get(&address)
    }

    /// Merge advertised fields into the record for `address`, creating it
    /// if absent, and stamp `last_seen`.
    pub fn upsert(&mut self, address: Ipv4Addr, fields: HostFields, now: Instant) {
        self.hosts
            .entry(address)
            .and_modify(|record| record.refresh(fields.clone(), now))
            .or_insert_with(|| HostRecord::new(address, fields, now));
    }

    /// Update only the local host's advertised fields
    pub fn set_self_fields(&mut self, fields: HostFields, now: Instant) {
        let addr = self.self_addr;
        self.upsert(addr, fields, now);
    }

    /// Remove every peer record that has gone stale or advertised offline.
    /// The self record is never removed. Returns how many were dropped.
    pub fn prune(&mut self, now: Instant, expiry: Duration) -> usize {
        let self_addr = self.self_addr;
        let before = self.hosts.len();
        self.hosts.retain(|addr, record| {
            *addr == self_addr
                || (!record.is_stale(now, expiry) && record.status() != HostStatus::Offline)
        });
        before - self.hosts.len()
    }

    /// Peer records only, ascending address order
    pub fn peers(&self) -> impl Iterator<Item = &HostRecord> {
        let self_addr = self.self_addr;
        self.hosts
            .values()
            .filter(move |record| record.address() != self_addr)
    }

    /// All records in dispatch order: self first, then peers by address
    pub fn dispatch_order(&self) -> Vec<&HostRecord> {
        let mut order = vec![self.self_record()];
        order.extend(self.peers());
        order
    }

    /// Whether any host (self included) has announced intent to start
    pub fn any_start(&self) -> bool {
        self.hosts
            .values()
            .any(|record| record.status() == HostStatus::Start)
    }

    /// Reset every record's status back to lobby, e.g. after a failed join
    pub fn mark_all_lobby(&mut self) {
        for record in self.hosts.values_mut() {
            record.set_status(HostStatus::Lobby);
        }
    }
}
