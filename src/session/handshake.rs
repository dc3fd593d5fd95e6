// Handshake Bookkeeping - the coordinator's ack set
//
// One entry per non-self, non-AI participant of the assignment, built
// fresh for every handshake attempt. The handshake may broadcast the
// start signal only once every entry is true. There is no per-ack
// timeout: a silent peer stalls the handshake until the controller's
// session timeout resets everything.

use crate::protocol::{GameAssignment, HostKey};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Acks outstanding for one handshake attempt
#[derive(Clone, Debug)]
pub struct AckSet {
    pending: BTreeMap<Ipv4Addr, bool>,
}

impl AckSet {
    /// Build the set from an assignment, excluding self and the AI key
    pub fn new(assignment: &GameAssignment, self_addr: Ipv4Addr) -> Self {
        let mut pending = BTreeMap::new();
        for (key, _) in assignment.iter() {
            if let HostKey::Host(addr) = key {
                if *addr != self_addr {
                    pending.insert(*addr, false);
                }
            }
        }
        Self { pending }
    }

    /// Record an ack from `origin`. Acks from addresses outside the
    /// assignment are ignored rather than growing the set.
    pub fn mark(&mut self, origin: Ipv4Addr) {
        if let Some(acked) = self.pending.get_mut(&origin) {
            *acked = true;
        }
    }

    /// Whether every participant has acked
    pub fn all_acked(&self) -> bool {
        self.pending.values().all(|acked| *acked)
    }

    /// Participants still outstanding
    pub fn outstanding(&self) -> Vec<Ipv4Addr> {
        self.pending
            .iter()
            .filter(|(_, acked)| !**acked)
            .map(|(addr, _)| *addr)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
