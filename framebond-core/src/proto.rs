//! Wire format for the bonded frame transport.
//!
//! Every datagram carries a fixed 20-byte header followed by a contiguous
//! slice of the frame payload. All multi-byte fields use network byte order
//! (big-endian). Independently built senders and receivers must agree on this
//! layout bit for bit.
//!
//! # Packet Format
//!
//! - Timestamp (8 bytes): identifies the frame this packet belongs to
//! - Packet index (4 bytes): zero-based position of the body within the frame
//! - Packet count (4 bytes): total packets composing the frame
//! - Body length (4 bytes): valid payload bytes carried in this packet
//! - Body (variable): raw payload bytes
//!
//! Total header size: 20 bytes + variable body

/// Packet header structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Frame identifier; packets with equal timestamps belong to one frame
    pub timestamp: u64,
    /// Zero-based packet position within the frame
    pub packet_index: u32,
    /// Total number of packets composing the frame
    pub packet_count: u32,
    /// Valid payload bytes carried in this packet's body
    pub body_length: u32,
}

impl PacketHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 20;

    /// Create a new packet header
    pub fn new(timestamp: u64, packet_index: u32, packet_count: u32, body_length: u32) -> Self {
        Self {
            timestamp,
            packet_index,
            packet_count,
            body_length,
        }
    }

    /// Encode header to bytes (network byte order)
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.packet_index.to_be_bytes());
        buf[12..16].copy_from_slice(&self.packet_count.to_be_bytes());
        buf[16..20].copy_from_slice(&self.body_length.to_be_bytes());
        buf
    }

    /// Decode header from bytes (network byte order)
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < Self::SIZE {
            return Err(ProtocolError::Truncated { actual: buf.len() });
        }

        let timestamp = u64::from_be_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        let packet_index = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let packet_count = u32::from_be_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let body_length = u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]);

        Ok(Self {
            timestamp,
            packet_index,
            packet_count,
            body_length,
        })
    }

    /// Validate the header against the datagram it arrived in.
    ///
    /// The declared body length plus the header size must equal the number of
    /// bytes actually received, and the index/count pair must be coherent.
    pub fn validate(&self, datagram_length: usize) -> Result<(), ProtocolError> {
        if self.packet_count == 0 {
            return Err(ProtocolError::ZeroPacketCount);
        }
        if self.packet_index >= self.packet_count {
            return Err(ProtocolError::IndexOutOfRange {
                index: self.packet_index,
                count: self.packet_count,
            });
        }
        if self.body_length == 0 {
            return Err(ProtocolError::EmptyBody);
        }
        let declared = Self::SIZE + self.body_length as usize;
        if declared != datagram_length {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: datagram_length,
            });
        }
        Ok(())
    }
}

/// Protocol-related errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("datagram too short: {actual} bytes, header needs {}", PacketHeader::SIZE)]
    Truncated { actual: usize },

    #[error("declared length {declared} does not match datagram length {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("packet index {index} out of range for packet count {count}")]
    IndexOutOfRange { index: u32, count: u32 },

    #[error("packet count {count} exceeds configured capacity {max}")]
    CountTooLarge { count: u32, max: u32 },

    #[error("body at offset {offset} with length {length} exceeds payload capacity {max}")]
    BodyOutOfBounds {
        offset: usize,
        length: usize,
        max: usize,
    },

    #[error("zero packet count")]
    ZeroPacketCount,

    #[error("empty packet body")]
    EmptyBody,
}
