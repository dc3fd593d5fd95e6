// Network Configuration - knobs for the session protocol
//
// All timing values come from the protocol design, not from gameplay:
// the socket wait bounds the poll loops, the broadcast delay paces
// discovery announcements, and the expiry window governs both peer
// staleness and the session-level handshake timeout.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the session protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    /// Multicast group address
    pub group_addr: Ipv4Addr,
    /// UDP port shared by all hosts
    pub port: u16,
    /// Datagram time-to-live (1 keeps traffic on the local segment)
    pub ttl: u32,
    /// Bounded wait for each receive attempt
    pub socket_time_out: Duration,
    /// Interval between discovery announcements
    pub broadcast_delay: Duration,
    /// Peer staleness window, also the session handshake timeout
    pub time_to_expire: Duration,
    /// Total number of game IDs available for one session
    pub max_games: u32,
    /// Whether this host will run computer-controlled games
    pub run_ai: bool,
    /// Receive buffer size in bytes
    pub buffer_size: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            group_addr: Ipv4Addr::new(224, 3, 29, 71),
            port: 10_420,
            ttl: 1,
            socket_time_out: Duration::from_millis(100),
            broadcast_delay: Duration::from_secs(1),
            time_to_expire: Duration::from_secs(5),
            max_games: 8,
            run_ai: false,
            buffer_size: 1024,
        }
    }
}

impl NetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group_addr(mut self, addr: Ipv4Addr) -> Self {
        self.group_addr = addr;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_socket_time_out(mut self, wait: Duration) -> Self {
        self.socket_time_out = wait;
        self
    }

    pub fn with_broadcast_delay(mut self, delay: Duration) -> Self {
        self.broadcast_delay = delay;
        self
    }

    pub fn with_time_to_expire(mut self, expiry: Duration) -> Self {
        self.time_to_expire = expiry;
        self
    }

    pub fn with_max_games(mut self, max_games: u32) -> Self {
        self.max_games = max_games;
        self
    }

    pub fn with_run_ai(mut self, run_ai: bool) -> Self {
        self.run_ai = run_ai;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.group_addr.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "{} is not a multicast address",
                self.group_addr
            )));
        }
        if self.max_games == 0 {
            return Err(ConfigError::Invalid("max_games cannot be 0".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size cannot be 0".to_string()));
        }
        if self.socket_time_out.is_zero() {
            return Err(ConfigError::Invalid(
                "socket_time_out cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(NetConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unicast_group() {
        let config = NetConfig::default().with_group_addr(Ipv4Addr::new(192, 168, 1, 1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_max_games() {
        let config = NetConfig::default().with_max_games(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = NetConfig::new()
            .with_port(9999)
            .with_max_games(12)
            .with_run_ai(true);
        assert_eq!(config.port, 9999);
        assert_eq!(config.max_games, 12);
        assert!(config.run_ai);
    }
}
