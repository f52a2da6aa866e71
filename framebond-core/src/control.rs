//! Configuration and session statistics.
//!
//! This module holds the serde-backed configuration for sender and receiver
//! sessions (loaded from TOML by the binaries), configuration validation, and
//! the health counters each session exposes.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::proto::PacketHeader;

fn default_send_rounds() -> u32 {
    1
}

fn default_channel_depth() -> usize {
    1024
}

fn default_frame_interval() -> Duration {
    Duration::from_millis(33)
}

fn default_health_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_frame_length() -> usize {
    65_536
}

/// Size limits shared by every socket in a bonded set.
///
/// Both sides of a link must be constructed from identical limits: the
/// receiver sizes its reassembly buffers from them and the sender derives its
/// fragmentation geometry from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Upper bound on any single datagram, header included
    pub max_packet_length: usize,
    /// Upper bound on any single logical frame
    pub max_payload_length: usize,
}

impl LinkConfig {
    /// Validate the size parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_packet_length <= PacketHeader::SIZE {
            return Err(ConfigError::PacketLengthTooSmall(self.max_packet_length));
        }
        if self.max_payload_length == 0 {
            return Err(ConfigError::ZeroPayloadLength);
        }
        Ok(())
    }

    /// Payload bytes that fit in one packet after the header
    pub fn max_packet_body_length(&self) -> usize {
        self.max_packet_length - PacketHeader::SIZE
    }

    /// Packets needed for the largest frame, with one packet of slack
    pub fn max_packets_per_payload(&self) -> usize {
        self.max_payload_length / self.max_packet_body_length() + 1
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_packet_length: 1400,
            max_payload_length: 1024 * 1024,
        }
    }
}

/// One bonded path on the send side: a local bind address and the remote
/// endpoint packets travel to over that path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderEndpoint {
    /// Local address to bind the path's socket to
    pub local: SocketAddr,
    /// Remote address every packet on this path is sent to
    pub remote: SocketAddr,
}

/// Configuration for the sending side of a bonded link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Ordered bonded endpoint set, one entry per physical path
    pub endpoints: Vec<SenderEndpoint>,

    /// Upper bound on any single datagram, header included
    pub max_packet_length: usize,

    /// Upper bound on any single logical frame
    pub max_payload_length: usize,

    /// Redundancy factor: how many times each frame's packets are repeated
    #[serde(default = "default_send_rounds")]
    pub send_rounds: u32,

    /// Interval between frames sent by the `framebond-sender` runtime
    #[serde(with = "humantime_serde", default = "default_frame_interval")]
    pub frame_interval: Duration,

    /// Interval between health log lines
    #[serde(with = "humantime_serde", default = "default_health_interval")]
    pub health_interval: Duration,

    /// Length of the synthetic payload sent when `input` is not set
    #[serde(default = "default_frame_length")]
    pub frame_length: usize,

    /// Optional file whose contents are sent as each frame's payload
    #[serde(default)]
    pub input: Option<PathBuf>,
}

impl SenderConfig {
    /// The size limits of this configuration
    pub fn link(&self) -> LinkConfig {
        LinkConfig {
            max_packet_length: self.max_packet_length,
            max_payload_length: self.max_payload_length,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link().validate()?;
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.send_rounds == 0 {
            return Err(ConfigError::ZeroSendRounds);
        }
        Ok(())
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![SenderEndpoint {
                local: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
                remote: SocketAddr::from((Ipv4Addr::LOCALHOST, 5600)),
            }],
            max_packet_length: LinkConfig::default().max_packet_length,
            max_payload_length: LinkConfig::default().max_payload_length,
            send_rounds: default_send_rounds(),
            frame_interval: default_frame_interval(),
            health_interval: default_health_interval(),
            frame_length: default_frame_length(),
            input: None,
        }
    }
}

/// Configuration for the receiving side of a bonded link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Local addresses to bind, one per bonded path
    pub binds: Vec<SocketAddr>,

    /// Upper bound on any single datagram, header included
    pub max_packet_length: usize,

    /// Upper bound on any single logical frame
    pub max_payload_length: usize,

    /// Depth of the channel funnelling datagrams from all paths into the
    /// reassembly loop
    #[serde(default = "default_channel_depth")]
    pub channel_depth: usize,

    /// Interval between health log lines
    #[serde(with = "humantime_serde", default = "default_health_interval")]
    pub health_interval: Duration,

    /// Optional file the `framebond-receiver` runtime overwrites with the
    /// latest completed payload
    #[serde(default)]
    pub dump_path: Option<PathBuf>,
}

impl ReceiverConfig {
    /// The size limits of this configuration
    pub fn link(&self) -> LinkConfig {
        LinkConfig {
            max_packet_length: self.max_packet_length,
            max_payload_length: self.max_payload_length,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.link().validate()?;
        if self.binds.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.channel_depth == 0 {
            return Err(ConfigError::ZeroChannelDepth);
        }
        Ok(())
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            binds: vec![SocketAddr::from((Ipv4Addr::UNSPECIFIED, 5600))],
            max_packet_length: LinkConfig::default().max_packet_length,
            max_payload_length: LinkConfig::default().max_payload_length,
            channel_depth: default_channel_depth(),
            health_interval: default_health_interval(),
            dump_path: None,
        }
    }
}

/// Configuration errors, surfaced at session construction and never retried
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_packet_length {0} must exceed the {} byte header", PacketHeader::SIZE)]
    PacketLengthTooSmall(usize),

    #[error("max_payload_length must be non-zero")]
    ZeroPayloadLength,

    #[error("bonded endpoint set is empty")]
    NoEndpoints,

    #[error("send_rounds must be at least 1")]
    ZeroSendRounds,

    #[error("channel_depth must be at least 1")]
    ZeroChannelDepth,

    #[error("failed to bind UDP socket on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Health counters for a sender session
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderStats {
    /// Frames accepted by `send_frame`
    pub frames_sent: u64,
    /// Datagrams written across all paths and rounds
    pub packets_sent: u64,
    /// Total bytes written across all paths and rounds
    pub bytes_sent: u64,
    /// Writes that failed on an individual path and were skipped
    pub path_send_errors: u64,
}

/// Health counters for a receiver session
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverStats {
    /// Datagrams accepted from all bonded paths
    pub datagrams_received: u64,
    /// Total bytes accepted from all bonded paths
    pub bytes_received: u64,
    /// Frames fully reassembled and surfaced
    pub frames_completed: u64,
    /// Incomplete frames abandoned when a newer timestamp arrived
    pub frames_abandoned: u64,
    /// Redundant copies suppressed by the seen bitmap
    pub duplicate_packets: u64,
    /// Malformed datagrams dropped without aborting the session
    pub protocol_violations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_config_derived_constants() {
        let link = LinkConfig {
            max_packet_length: 1200,
            max_payload_length: 65_536,
        };

        assert_eq!(link.max_packet_body_length(), 1180);
        assert_eq!(link.max_packets_per_payload(), 65_536 / 1180 + 1);
    }

    #[test]
    fn test_link_config_rejects_tiny_packets() {
        let link = LinkConfig {
            max_packet_length: PacketHeader::SIZE,
            max_payload_length: 65_536,
        };

        let result = link.validate();
        assert!(matches!(result, Err(ConfigError::PacketLengthTooSmall(_))));
    }

    #[test]
    fn test_link_config_rejects_zero_payload() {
        let link = LinkConfig {
            max_packet_length: 1200,
            max_payload_length: 0,
        };

        let result = link.validate();
        assert!(matches!(result, Err(ConfigError::ZeroPayloadLength)));
    }

    #[test]
    fn test_sender_config_default_is_valid() {
        let config = SenderConfig::default();
        config.validate().expect("default config should validate");
        assert_eq!(config.send_rounds, 1);
    }

    #[test]
    fn test_sender_config_rejects_empty_endpoints() {
        let config = SenderConfig {
            endpoints: Vec::new(),
            ..Default::default()
        };

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::NoEndpoints)));
    }

    #[test]
    fn test_sender_config_rejects_zero_rounds() {
        let config = SenderConfig {
            send_rounds: 0,
            ..Default::default()
        };

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::ZeroSendRounds)));
    }

    #[test]
    fn test_receiver_config_default_is_valid() {
        let config = ReceiverConfig::default();
        config.validate().expect("default config should validate");
    }

    #[test]
    fn test_receiver_config_rejects_zero_channel_depth() {
        let config = ReceiverConfig {
            channel_depth: 0,
            ..Default::default()
        };

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::ZeroChannelDepth)));
    }
}
