// Session Mode and Commands
//
// The engine owns its mode. The controller never touches it directly; it
// sends commands over an mpsc channel and observes the engine through
// watch channels. That one-way flow is what makes the handoffs safe
// without locks: each value has exactly one writer.

use crate::directory::HostFields;
use crate::protocol::{GameAssignment, Report};

/// Phase of the session protocol, exactly one at any instant
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionMode {
    /// Not participating
    #[default]
    Idle,
    /// Advertising and listening for hosts
    Discover,
    /// Waiting on a coordinator's assignment
    HandshakeFollower,
    /// Distributing the assignment and collecting acks
    HandshakeCoordinator,
    /// Session running, replicating game events
    Active,
}

/// Controller-to-engine commands
#[derive(Clone, Debug)]
pub enum Command {
    /// Switch the engine to a new phase
    SetMode(SessionMode),
    /// Abandon everything and return to discovery with a fresh directory
    Reset,
    /// Keep the known hosts but drop every start intent, local one
    /// included, and resume discovery
    ReturnToLobby,
    /// Update the locally advertised status fields
    SetLocalFields(HostFields),
    /// Hand the coordinator role its computed assignment
    SupplyAssignment(GameAssignment),
    /// Replicate one local gameplay event (display-local game ID)
    SendUpdate { game_id: u32, report: Report },
}

/// Handshake progress flags, published by the engine for the controller.
///
/// The same three flags serve both roles: sent/received assignment, ack
/// sent/all acks collected, start sent/received.
#[derive(Clone, Debug, Default)]
pub struct HandshakeProgress {
    pub data_seen: bool,
    pub acked: bool,
    pub start_seen: bool,
    /// The session assignment, once known to this host
    pub assignment: Option<GameAssignment>,
}

impl HandshakeProgress {
    /// Whether every handshake step has completed
    pub fn complete(&self) -> bool {
        self.data_seen && self.acked && self.start_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_completion() {
        let mut progress = HandshakeProgress::default();
        assert!(!progress.complete());

        progress.data_seen = true;
        progress.acked = true;
        assert!(!progress.complete());

        progress.start_seen = true;
        assert!(progress.complete());
    }
}
