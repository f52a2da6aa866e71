//! Bonded sending session.
//!
//! A `BondedSender` fragments one timestamped payload into packets and writes
//! every packet to every bonded path, repeating the whole round `send_rounds`
//! times. The receiver deduplicates, so the redundancy is idempotent: more
//! paths and more rounds only buy resilience against per-path loss.

use std::io;

use crate::control::{ConfigError, SenderConfig, SenderStats};
use crate::proto::PacketHeader;
use crate::transport::LinkPath;

/// Errors surfaced by `send_frame`
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("payload is empty")]
    EmptyPayload,

    #[error("payload length {length} exceeds max payload length {max}")]
    PayloadTooLarge { length: usize, max: usize },

    #[error("send_rounds must be at least 1")]
    ZeroSendRounds,

    #[error("sending failed on all {} bonded paths", .errors.len())]
    AllPathsFailed { errors: Vec<(usize, io::Error)> },
}

/// Sending half of a bonded link.
///
/// Owns one socket per configured endpoint and a scratch packet buffer that
/// is reused across calls; `send_frame` performs no allocation.
pub struct BondedSender {
    paths: Vec<LinkPath>,
    scratch: Vec<u8>,
    max_packet_body_length: usize,
    max_payload_length: usize,
    stats: SenderStats,
}

impl BondedSender {
    /// Bind every configured local address and aim it at its remote.
    ///
    /// Any bind failure is fatal to construction.
    pub async fn connect(config: &SenderConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let link = config.link();
        let mut paths = Vec::with_capacity(config.endpoints.len());
        for (id, endpoint) in config.endpoints.iter().enumerate() {
            let path = LinkPath::bound(id, endpoint.local, Some(endpoint.remote))
                .await
                .map_err(|source| ConfigError::Bind {
                    addr: endpoint.local,
                    source,
                })?;
            paths.push(path);
        }

        Ok(Self {
            paths,
            scratch: vec![0u8; link.max_packet_length],
            max_packet_body_length: link.max_packet_body_length(),
            max_payload_length: link.max_payload_length,
            stats: SenderStats::default(),
        })
    }

    /// Number of packets `payload_length` bytes fragment into
    pub fn packet_count(&self, payload_length: usize) -> u32 {
        payload_length.div_ceil(self.max_packet_body_length) as u32
    }

    /// Fragment `payload` and transmit it redundantly across the bonded set.
    ///
    /// Each of the `send_rounds` rounds writes every packet to every path. A
    /// path that fails to send is skipped for that packet and the remaining
    /// paths keep the frame going; the call only aborts when a packet could
    /// not be delivered to a single path.
    pub async fn send_frame(
        &mut self,
        timestamp: u64,
        payload: &[u8],
        send_rounds: u32,
    ) -> Result<(), SendError> {
        if payload.is_empty() {
            return Err(SendError::EmptyPayload);
        }
        if payload.len() > self.max_payload_length {
            return Err(SendError::PayloadTooLarge {
                length: payload.len(),
                max: self.max_payload_length,
            });
        }
        if send_rounds == 0 {
            return Err(SendError::ZeroSendRounds);
        }

        let packet_count = self.packet_count(payload.len());

        for _round in 0..send_rounds {
            for packet_index in 0..packet_count {
                let offset = packet_index as usize * self.max_packet_body_length;
                let end = usize::min(offset + self.max_packet_body_length, payload.len());
                let body = &payload[offset..end];

                let header =
                    PacketHeader::new(timestamp, packet_index, packet_count, body.len() as u32);
                self.scratch[..PacketHeader::SIZE].copy_from_slice(&header.encode());
                self.scratch[PacketHeader::SIZE..PacketHeader::SIZE + body.len()]
                    .copy_from_slice(body);
                let wire = &self.scratch[..PacketHeader::SIZE + body.len()];

                let mut delivered = 0u32;
                let mut errors = Vec::new();
                for path in &self.paths {
                    match path.send(wire).await {
                        Ok(_) => {
                            delivered += 1;
                            self.stats.packets_sent += 1;
                            self.stats.bytes_sent += wire.len() as u64;
                        }
                        Err(error) => {
                            self.stats.path_send_errors += 1;
                            tracing::warn!(
                                path_id = path.id,
                                %error,
                                "send failed on bonded path, continuing on the others"
                            );
                            errors.push((path.id, error));
                        }
                    }
                }

                if delivered == 0 {
                    return Err(SendError::AllPathsFailed { errors });
                }
            }
        }

        self.stats.frames_sent += 1;
        Ok(())
    }

    /// Health counters accumulated since construction
    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// Number of bonded paths in this session
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }
}
