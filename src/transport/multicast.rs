// UDP Multicast Endpoint
//
// One socket does both directions: it is bound to the shared port on all
// interfaces, joined to the group, and used for sending with the
// configured TTL. SO_REUSEADDR is set before binding so several hosts on
// one machine can share the port, which tokio's bind cannot do on its
// own; socket2 handles the pre-bind options.

use crate::config::NetConfig;
use crate::protocol::Message;
use crate::transport::traits::{Endpoint, RecvOutcome, TransportError};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// The real transport: one multicast UDP socket on the shared group/port
pub struct MulticastEndpoint {
    socket: UdpSocket,
    group: SocketAddrV4,
    local_addr: Ipv4Addr,
    wait: Duration,
    buffer: Vec<u8>,
}

impl MulticastEndpoint {
    /// Bind, join the group, and configure the outbound TTL
    pub fn new(config: &NetConfig) -> Result<Self, TransportError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)).into())?;
        socket.join_multicast_v4(&config.group_addr, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_ttl_v4(config.ttl)?;
        socket.set_multicast_loop_v4(true)?;

        let socket = UdpSocket::from_std(socket.into())?;
        let local_addr = local_unicast_addr();
        debug!(%local_addr, group = %config.group_addr, port = config.port, "multicast endpoint up");

        Ok(Self {
            socket,
            group: SocketAddrV4::new(config.group_addr, config.port),
            local_addr,
            wait: config.socket_time_out,
            buffer: vec![0u8; config.buffer_size],
        })
    }
}

#[async_trait]
impl Endpoint for MulticastEndpoint {
    fn local_addr(&self) -> Ipv4Addr {
        self.local_addr
    }

    async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let bytes = message.to_bytes()?;
        self.socket.send_to(&bytes, self.group).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<RecvOutcome, TransportError> {
        match timeout(self.wait, self.socket.recv_from(&mut self.buffer)).await {
            Err(_) => Ok(RecvOutcome::Timeout),
            Ok(Err(err)) => Err(err.into()),
            Ok(Ok((len, origin))) => {
                let message = Message::from_bytes(&self.buffer[..len])?;
                let origin = match origin {
                    SocketAddr::V4(v4) => *v4.ip(),
                    // The socket is IPv4-only; nothing else can show up.
                    SocketAddr::V6(_) => return Ok(RecvOutcome::Timeout),
                };
                Ok(RecvOutcome::Message { origin, message })
            }
        }
    }
}

/// Find the local unicast address by connecting a throwaway socket toward
/// the broadcast range. Nothing is sent; the kernel just picks the route.
fn local_unicast_addr() -> Ipv4Addr {
    let probe = || -> std::io::Result<Ipv4Addr> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(10, 255, 255, 255), 1))?;
        match socket.local_addr()? {
            SocketAddr::V4(v4) => Ok(*v4.ip()),
            SocketAddr::V6(_) => Ok(Ipv4Addr::LOCALHOST),
        }
    };
    probe().unwrap_or(Ipv4Addr::LOCALHOST)
}
