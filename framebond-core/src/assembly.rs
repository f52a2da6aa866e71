//! Frame reassembly state machine.
//!
//! This is the pure core of the receiver: datagrams go in, completed frames
//! come out. No sockets, no clocks, fully deterministic for testability.
//!
//! The assembler tracks exactly one in-flight frame at a time, keyed by the
//! packet timestamp. A packet carrying a new timestamp abandons whatever was
//! in flight and starts the new frame; remaining packets of the old frame are
//! dropped as duplicates of nothing. Bounded memory and low latency are
//! traded for completeness here: a frame that loses the race never completes.
//!
//! Redundant copies of a packet (bonded paths, extra send rounds) are
//! suppressed through a seen bitmap sized at construction, so feeding the
//! same datagram any number of times neither advances reassembly nor
//! corrupts the payload.

use crate::control::{ConfigError, LinkConfig, ReceiverStats};
use crate::proto::{PacketHeader, ProtocolError};

/// What `FrameAssembler::accept` did with a datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// Packet stored; the frame is still missing packets
    Stored,
    /// Redundant copy suppressed; nothing changed
    Duplicate,
    /// This packet completed the current frame
    Completed,
}

/// Reassembles packets into frames, one frame in flight at a time.
///
/// All buffers are allocated once at construction and reused for every frame.
pub struct FrameAssembler {
    /// Payload bytes carried by every packet except possibly the last
    max_packet_body_length: usize,
    /// Frame assembly buffer, `max_payload_length` bytes
    payload: Vec<u8>,
    /// Seen bitmap for the current frame
    seen: Vec<bool>,
    /// Packets of the current frame seen so far
    seen_count: u32,
    /// Timestamp of the frame currently being assembled
    current_timestamp: Option<u64>,
    /// Whether the current frame has already completed
    current_complete: bool,
    /// Timestamp of the most recently completed frame
    completed_timestamp: u64,
    /// Assembled length of the most recently completed frame
    completed_length: usize,
    /// Whether any frame has completed yet
    has_completed: bool,
    stats: ReceiverStats,
}

impl FrameAssembler {
    /// Create an assembler for the given size limits
    pub fn new(link: LinkConfig) -> Result<Self, ConfigError> {
        link.validate()?;
        Ok(Self {
            max_packet_body_length: link.max_packet_body_length(),
            payload: vec![0u8; link.max_payload_length],
            seen: vec![false; link.max_packets_per_payload()],
            seen_count: 0,
            current_timestamp: None,
            current_complete: false,
            completed_timestamp: 0,
            completed_length: 0,
            has_completed: false,
            stats: ReceiverStats::default(),
        })
    }

    /// Feed one received datagram into the assembler.
    ///
    /// A malformed datagram is reported as a `ProtocolError` and counted, but
    /// leaves reassembly state untouched; the caller is expected to drop it
    /// and keep the receive loop going.
    pub fn accept(&mut self, datagram: &[u8]) -> Result<Accept, ProtocolError> {
        self.stats.datagrams_received += 1;
        self.stats.bytes_received += datagram.len() as u64;

        match self.accept_datagram(datagram) {
            Ok(accept) => Ok(accept),
            Err(violation) => {
                self.stats.protocol_violations += 1;
                Err(violation)
            }
        }
    }

    fn accept_datagram(&mut self, datagram: &[u8]) -> Result<Accept, ProtocolError> {
        let header = PacketHeader::decode(datagram)?;
        header.validate(datagram.len())?;

        let capacity = self.seen.len() as u32;
        if header.packet_count > capacity {
            return Err(ProtocolError::CountTooLarge {
                count: header.packet_count,
                max: capacity,
            });
        }

        let body = &datagram[PacketHeader::SIZE..];
        let offset = header.packet_index as usize * self.max_packet_body_length;
        if offset + body.len() > self.payload.len() {
            return Err(ProtocolError::BodyOutOfBounds {
                offset,
                length: body.len(),
                max: self.payload.len(),
            });
        }

        // Frame boundary: a new timestamp abandons the in-flight frame.
        if self.current_timestamp != Some(header.timestamp) {
            if self.current_timestamp.is_some() && !self.current_complete && self.seen_count > 0 {
                self.stats.frames_abandoned += 1;
                tracing::debug!(
                    abandoned = ?self.current_timestamp,
                    started = header.timestamp,
                    packets_seen = self.seen_count,
                    "abandoning incomplete frame"
                );
            }
            self.seen.fill(false);
            self.seen_count = 0;
            self.current_timestamp = Some(header.timestamp);
            self.current_complete = false;
        }

        if self.seen[header.packet_index as usize] {
            self.stats.duplicate_packets += 1;
            return Ok(Accept::Duplicate);
        }

        self.payload[offset..offset + body.len()].copy_from_slice(body);

        if header.packet_index == header.packet_count - 1 {
            self.completed_length =
                (header.packet_count as usize - 1) * self.max_packet_body_length + body.len();
            self.completed_timestamp = header.timestamp;
        }

        self.seen[header.packet_index as usize] = true;
        self.seen_count += 1;

        if self.seen_count == header.packet_count {
            self.current_complete = true;
            self.has_completed = true;
            self.stats.frames_completed += 1;
            return Ok(Accept::Completed);
        }

        Ok(Accept::Stored)
    }

    /// The most recently completed frame: its timestamp and assembled bytes.
    ///
    /// The view is valid until the next call to `accept`, which may begin
    /// overwriting the buffer with a newer frame.
    pub fn completed(&self) -> Option<(u64, &[u8])> {
        if self.has_completed {
            Some((
                self.completed_timestamp,
                &self.payload[..self.completed_length],
            ))
        } else {
            None
        }
    }

    /// Health counters accumulated since construction
    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: LinkConfig = LinkConfig {
        max_packet_length: PacketHeader::SIZE + 10,
        max_payload_length: 100,
    };

    fn packet(timestamp: u64, index: u32, count: u32, body: &[u8]) -> Vec<u8> {
        let header = PacketHeader::new(timestamp, index, count, body.len() as u32);
        let mut datagram = Vec::with_capacity(PacketHeader::SIZE + body.len());
        datagram.extend_from_slice(&header.encode());
        datagram.extend_from_slice(body);
        datagram
    }

    fn fragments(timestamp: u64, payload: &[u8]) -> Vec<Vec<u8>> {
        let body_len = LINK.max_packet_body_length();
        let count = payload.len().div_ceil(body_len) as u32;
        payload
            .chunks(body_len)
            .enumerate()
            .map(|(i, chunk)| packet(timestamp, i as u32, count, chunk))
            .collect()
    }

    #[test]
    fn test_single_packet_frame() {
        let mut assembler = FrameAssembler::new(LINK).expect("assembler");

        let accept = assembler.accept(&packet(7, 0, 1, b"hello")).expect("accept");
        assert_eq!(accept, Accept::Completed);

        let (timestamp, payload) = assembler.completed().expect("completed frame");
        assert_eq!(timestamp, 7);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn test_multi_packet_frame_with_remainder() {
        let mut assembler = FrameAssembler::new(LINK).expect("assembler");
        let payload: Vec<u8> = (0..25u8).collect();

        let packets = fragments(1, &payload);
        assert_eq!(packets.len(), 3);

        assert_eq!(assembler.accept(&packets[0]).expect("accept"), Accept::Stored);
        assert_eq!(assembler.accept(&packets[1]).expect("accept"), Accept::Stored);
        assert_eq!(
            assembler.accept(&packets[2]).expect("accept"),
            Accept::Completed
        );

        let (_, assembled) = assembler.completed().expect("completed frame");
        assert_eq!(assembled, payload.as_slice());
    }

    #[test]
    fn test_exact_multiple_payload() {
        let mut assembler = FrameAssembler::new(LINK).expect("assembler");
        let payload: Vec<u8> = (0..20u8).collect();

        // 20 bytes over 10-byte bodies: exactly two full packets.
        let packets = fragments(2, &payload);
        assert_eq!(packets.len(), 2);

        assembler.accept(&packets[0]).expect("accept");
        assembler.accept(&packets[1]).expect("accept");

        let (_, assembled) = assembler.completed().expect("completed frame");
        assert_eq!(assembled, payload.as_slice());
    }

    #[test]
    fn test_out_of_order_completion() {
        let mut assembler = FrameAssembler::new(LINK).expect("assembler");
        let payload: Vec<u8> = (0..25u8).collect();
        let packets = fragments(3, &payload);

        assert_eq!(assembler.accept(&packets[2]).expect("accept"), Accept::Stored);
        assert_eq!(assembler.accept(&packets[0]).expect("accept"), Accept::Stored);
        assert_eq!(
            assembler.accept(&packets[1]).expect("accept"),
            Accept::Completed
        );

        let (_, assembled) = assembler.completed().expect("completed frame");
        assert_eq!(assembled, payload.as_slice());
    }

    #[test]
    fn test_duplicate_is_idempotent() {
        let mut assembler = FrameAssembler::new(LINK).expect("assembler");
        let payload: Vec<u8> = (0..25u8).collect();
        let packets = fragments(4, &payload);

        assembler.accept(&packets[0]).expect("accept");
        assert_eq!(
            assembler.accept(&packets[0]).expect("accept"),
            Accept::Duplicate
        );
        assert_eq!(
            assembler.accept(&packets[0]).expect("accept"),
            Accept::Duplicate
        );

        // Duplicates must not have advanced reassembly: the two remaining
        // packets still have to arrive before the frame completes.
        assert_eq!(assembler.accept(&packets[1]).expect("accept"), Accept::Stored);
        assert_eq!(
            assembler.accept(&packets[2]).expect("accept"),
            Accept::Completed
        );

        let (_, assembled) = assembler.completed().expect("completed frame");
        assert_eq!(assembled, payload.as_slice());
        assert_eq!(assembler.stats().duplicate_packets, 2);
    }

    #[test]
    fn test_duplicates_after_completion_are_suppressed() {
        let mut assembler = FrameAssembler::new(LINK).expect("assembler");

        assembler.accept(&packet(5, 0, 1, b"frame")).expect("accept");

        // A redundant send round delivers the whole frame again.
        let accept = assembler.accept(&packet(5, 0, 1, b"frame")).expect("accept");
        assert_eq!(accept, Accept::Duplicate);
        assert_eq!(assembler.stats().frames_completed, 1);
    }

    #[test]
    fn test_new_timestamp_abandons_incomplete_frame() {
        let mut assembler = FrameAssembler::new(LINK).expect("assembler");

        // Frame 10 starts with a distinctive pattern but never completes.
        let stale = [0xAAu8; 10];
        assembler.accept(&packet(10, 0, 3, &stale)).expect("accept");

        // Frame 11 arrives and completes.
        let payload: Vec<u8> = (1..=15u8).collect();
        let packets = fragments(11, &payload);
        assert_eq!(assembler.accept(&packets[0]).expect("accept"), Accept::Stored);
        assert_eq!(
            assembler.accept(&packets[1]).expect("accept"),
            Accept::Completed
        );

        let (timestamp, assembled) = assembler.completed().expect("completed frame");
        assert_eq!(timestamp, 11);
        assert_eq!(assembled, payload.as_slice());
        assert!(!assembled.contains(&0xAA));
        assert_eq!(assembler.stats().frames_abandoned, 1);
    }

    #[test]
    fn test_malformed_datagrams_are_dropped() {
        let mut assembler = FrameAssembler::new(LINK).expect("assembler");

        // Shorter than the header.
        let result = assembler.accept(&[0u8; PacketHeader::SIZE - 1]);
        assert!(matches!(result, Err(ProtocolError::Truncated { .. })));

        // Declared body length disagrees with the datagram length.
        let mut mismatched = packet(1, 0, 1, b"0123456789");
        mismatched.truncate(mismatched.len() - 3);
        let result = assembler.accept(&mismatched);
        assert!(matches!(result, Err(ProtocolError::LengthMismatch { .. })));

        // Index beyond the declared count.
        let result = assembler.accept(&packet(1, 9, 3, b"0123456789"));
        assert!(matches!(result, Err(ProtocolError::IndexOutOfRange { .. })));

        // Count beyond what the configuration can hold.
        let capacity = LINK.max_packets_per_payload() as u32;
        let result = assembler.accept(&packet(1, 0, capacity + 1, b"0123456789"));
        assert!(matches!(result, Err(ProtocolError::CountTooLarge { .. })));

        // Body landing past the payload buffer.
        let result = assembler.accept(&packet(1, capacity - 1, capacity, b"0123456789"));
        assert!(matches!(result, Err(ProtocolError::BodyOutOfBounds { .. })));

        assert_eq!(assembler.stats().protocol_violations, 5);

        // The session survives: a well-formed frame still assembles.
        let accept = assembler.accept(&packet(2, 0, 1, b"ok")).expect("accept");
        assert_eq!(accept, Accept::Completed);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut assembler = FrameAssembler::new(LINK).expect("assembler");

        let datagram = packet(1, 0, 1, b"abcde");
        assembler.accept(&datagram).expect("accept");
        assembler.accept(&datagram).expect("accept");

        let stats = assembler.stats();
        assert_eq!(stats.datagrams_received, 2);
        assert_eq!(stats.bytes_received, 2 * datagram.len() as u64);
        assert_eq!(stats.frames_completed, 1);
        assert_eq!(stats.duplicate_packets, 1);
    }
}
