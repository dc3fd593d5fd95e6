// Wire Messages - the closed set of datagram payloads
//
// All five message kinds share one multicast group and port; the kind tag
// is the sole demultiplexing key. Unknown or foreign datagrams fail to
// decode and are counted by the transport, never acted on.

use crate::directory::HostFields;
use crate::protocol::report::Report;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Datagram decode failed")]
    DecodeFailed,

    #[error("Bad board payload: {0}")]
    BadBoard(String),
}

/// Kind tag of a wire message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Announce,
    GameData,
    Ack,
    Sync,
    GameUpdate,
}

/// One replicated gameplay event, addressed by global game ID.
///
/// `seq` is a per-game monotonic counter stamped by the sender; receivers
/// use it to drop stale overwriting reports under reordered delivery.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameUpdate {
    pub game_id: u32,
    pub seq: u64,
    pub report: Report,
}

/// Wrapper for all datagram payloads
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Periodic advertisement of local status and capabilities
    Announce(HostFields),
    /// Encoded game assignment, coordinator to followers
    GameData(String),
    /// Follower acknowledgment of a received assignment
    Ack,
    /// Session start signal, coordinator to followers
    Sync,
    /// In-session gameplay event
    GameUpdate(GameUpdate),
}

impl Message {
    /// Get the message kind
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Announce(_) => MessageKind::Announce,
            Message::GameData(_) => MessageKind::GameData,
            Message::Ack => MessageKind::Ack,
            Message::Sync => MessageKind::Sync,
            Message::GameUpdate(_) => MessageKind::GameUpdate,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        postcard::to_allocvec(self).map_err(|_| ProtocolError::DecodeFailed)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        postcard::from_bytes(bytes).map_err(|_| ProtocolError::DecodeFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::HostStatus;

    #[test]
    fn test_announce_round_trip() {
        let msg = Message::Announce(HostFields {
            status: HostStatus::Lobby,
            hostname: "host-a".to_string(),
            player_count: 2,
            max_capacity: 4,
            ai_capable: true,
        });

        let bytes = msg.to_bytes().unwrap();
        let restored = Message::from_bytes(&bytes).unwrap();
        assert_eq!(restored, msg);
        assert_eq!(restored.kind(), MessageKind::Announce);
    }

    #[test]
    fn test_game_update_round_trip() {
        let msg = Message::GameUpdate(GameUpdate {
            game_id: 3,
            seq: 17,
            report: Report::Clear { lines: 2, score: 300 },
        });

        let bytes = msg.to_bytes().unwrap();
        assert_eq!(Message::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_foreign_bytes_fail_decode() {
        assert!(Message::from_bytes(&[0xff, 0xfe, 0xfd, 0x00, 0x13]).is_err());
    }
}
