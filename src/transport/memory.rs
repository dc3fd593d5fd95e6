// In-Memory Transport - loss-free multicast fabric for tests
//
// A hub fans every sent message out to all attached endpoints, sender
// included, matching the loopback behavior of a joined multicast group.

use crate::protocol::Message;
use crate::transport::traits::{Endpoint, RecvOutcome, TransportError};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

type Datagram = (Ipv4Addr, Message);

/// Shared in-process "multicast group"
#[derive(Clone, Default)]
pub struct MemoryHub {
    members: Arc<Mutex<Vec<mpsc::UnboundedSender<Datagram>>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint with the given identity and bounded wait
    pub fn endpoint(&self, local_addr: Ipv4Addr, wait: Duration) -> MemoryEndpoint {
        let (tx, rx) = mpsc::unbounded_channel();
        self.members.lock().unwrap().push(tx);
        MemoryEndpoint {
            hub: self.clone(),
            local_addr,
            wait,
            rx,
        }
    }

    fn broadcast(&self, origin: Ipv4Addr, message: &Message) {
        let mut members = self.members.lock().unwrap();
        members.retain(|tx| tx.send((origin, message.clone())).is_ok());
    }
}

/// One attached endpoint
pub struct MemoryEndpoint {
    hub: MemoryHub,
    local_addr: Ipv4Addr,
    wait: Duration,
    rx: mpsc::UnboundedReceiver<Datagram>,
}

#[async_trait]
impl Endpoint for MemoryEndpoint {
    fn local_addr(&self) -> Ipv4Addr {
        self.local_addr
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        self.hub.broadcast(self.local_addr, message);
        Ok(())
    }

    async fn recv(&mut self) -> Result<RecvOutcome, TransportError> {
        match timeout(self.wait, self.rx.recv()).await {
            Err(_) => Ok(RecvOutcome::Timeout),
            Ok(None) => Err(TransportError::Closed),
            Ok(Some((origin, message))) => Ok(RecvOutcome::Message { origin, message }),
        }
    }
}
