// Replication State - sequencing and game-ID remapping
//
// Every host displays its own games first, numbered from zero, so local
// display IDs and the session's global IDs disagree everywhere except on
// the coordinator. This type owns the arithmetic between the two
// numberings, stamps outbound updates with a per-game monotonic sequence
// number, and filters inbound updates: duplicates are dropped always,
// stale overwriting reports are dropped, stale incremental reports
// (clear, bonus, loss, winner) are still applied because each one carries
// a delta or latches an outcome. The dedup ledger is a sliding window per
// game: anything that falls behind it is dropped outright, which keeps
// the ledger bounded over a long session.

use crate::protocol::{
    decode_board, encode_board, GameAssignment, GameUpdate, HostKey, ProtocolError, Report,
};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

/// Dedup window per game. Sequences this far behind the newest one seen
/// have had their ledger entries reclaimed and are dropped outright.
const SEQ_WINDOW: u64 = 1024;

/// Per-session replication bookkeeping for one host
#[derive(Debug)]
pub struct ReplicationState {
    /// Global ID where the local range starts
    my_offset: i64,
    /// Global ID just past the local range
    my_end: i64,
    /// Display shift for remote games that precede the local range:
    /// zero on the coordinator, the local range length elsewhere
    remote_offset: i64,
    /// Next outbound sequence number per global game ID
    next_seq: HashMap<u32, u64>,
    /// Highest inbound sequence seen per global game ID
    highest_seq: HashMap<u32, u64>,
    /// Inbound sequences already applied, for duplicate suppression
    seen_seq: HashMap<u32, HashSet<u64>>,
}

impl ReplicationState {
    /// Derive the numbering from the session assignment.
    ///
    /// Returns `None` when the local host owns no range in the assignment.
    pub fn new(
        assignment: &GameAssignment,
        self_addr: Ipv4Addr,
        is_coordinator: bool,
    ) -> Option<Self> {
        let local = assignment.get(&HostKey::Host(self_addr))?;
        let len = i64::from(local.len());
        Some(Self {
            my_offset: local.start,
            my_end: local.start + len,
            remote_offset: if is_coordinator { 0 } else { len },
            next_seq: HashMap::new(),
            highest_seq: HashMap::new(),
            seen_seq: HashMap::new(),
        })
    }

    /// Map a display-local game ID to the session's global numbering
    pub fn to_global(&self, display_id: u32) -> u32 {
        let id = i64::from(display_id);
        if id < self.remote_offset {
            (id + self.my_offset) as u32
        } else {
            display_id
        }
    }

    /// Map a global game ID to this host's display numbering
    pub fn to_display(&self, global_id: u32) -> u32 {
        let id = i64::from(global_id);
        if id < self.my_offset {
            (id + self.remote_offset) as u32
        } else if id < self.my_end {
            (id - self.my_offset) as u32
        } else {
            global_id
        }
    }

    /// Build the wire update for one local report: remap the ID, stamp
    /// the next sequence number, and string-code board snapshots so a
    /// full grid fits one datagram.
    pub fn prepare_send(
        &mut self,
        display_id: u32,
        report: Report,
    ) -> Result<GameUpdate, ProtocolError> {
        let game_id = self.to_global(display_id);
        let seq = self.next_seq.entry(game_id).or_insert(0);
        *seq += 1;
        let report = match report {
            Report::Board(grid) => Report::BoardText(encode_board(&grid)?),
            other => other,
        };
        Ok(GameUpdate {
            game_id,
            seq: *seq,
            report,
        })
    }

    /// Filter one inbound update and translate it for local application.
    ///
    /// Returns `Ok(None)` for duplicates, stale overwriting reports, and
    /// anything behind the dedup window. Board text that fails to decode
    /// is an error for the caller to count; it is never mistaken for an
    /// empty board.
    pub fn admit(
        &mut self,
        update: GameUpdate,
    ) -> Result<Option<(u32, Report)>, ProtocolError> {
        let highest = self.highest_seq.entry(update.game_id).or_insert(0);
        // Behind the window its ledger entry may already be gone, so it
        // can no longer be deduplicated.
        if update.seq <= highest.saturating_sub(SEQ_WINDOW) {
            return Ok(None);
        }
        let stale = update.seq < *highest;
        *highest = (*highest).max(update.seq);
        let horizon = highest.saturating_sub(SEQ_WINDOW);

        let seen = self.seen_seq.entry(update.game_id).or_default();
        if !seen.insert(update.seq) {
            return Ok(None);
        }
        if seen.len() > SEQ_WINDOW as usize {
            seen.retain(|seq| *seq > horizon);
        }

        if stale && update.report.is_overwrite() {
            return Ok(None);
        }

        let report = match update.report {
            Report::BoardText(text) => Report::Board(decode_board(&text)?),
            other => other,
        };
        Ok(Some((self.to_display(update.game_id), report)))
    }
}
