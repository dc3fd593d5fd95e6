// Transport Traits and Core Types
//
// The endpoint seam every protocol phase talks through. A receive attempt
// always returns within the configured bounded wait, and its outcome is
// typed: a timeout is not a decode failure and neither is an I/O error.
// The bounded wait is the suspension point that lets the protocol task
// notice controller commands promptly.

use crate::protocol::{Message, ProtocolError};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Datagram decode failed: {0}")]
    Decode(#[from] ProtocolError),

    #[error("Endpoint closed")]
    Closed,
}

/// Outcome of one bounded-wait receive attempt
#[derive(Debug)]
pub enum RecvOutcome {
    /// A well-formed message arrived from `origin`
    Message { origin: Ipv4Addr, message: Message },
    /// Nothing arrived within the bounded wait
    Timeout,
}

/// A datagram endpoint on the shared multicast group
#[async_trait]
pub trait Endpoint: Send {
    /// Local unicast address, used as this host's identity
    fn local_addr(&self) -> Ipv4Addr;

    /// Multicast one message to the group
    async fn send(&self, message: &Message) -> Result<(), TransportError>;

    /// Wait at most the bounded socket wait for one datagram.
    ///
    /// Malformed datagrams surface as `Err(TransportError::Decode)`; the
    /// caller decides whether to count and continue.
    async fn recv(&mut self) -> Result<RecvOutcome, TransportError>;
}

/// Datagram-level counters for the protocol task
#[derive(Clone, Debug, Default)]
pub struct NetStats {
    pub datagrams_sent: u64,
    pub datagrams_received: u64,
    pub decode_failures: u64,
    pub stale_updates_dropped: u64,
}
