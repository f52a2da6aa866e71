//! Core library for the framebond bonded frame transport.
//!
//! framebond delivers large timestamped payloads (video frames) over one or
//! more independent UDP paths at once, trading bandwidth redundancy for
//! resilience against per-path packet loss: every packet of a frame travels
//! over every bonded path, and the receiver suppresses the redundant copies
//! while reassembling.
//!
//! # Architecture
//!
//! The library is organized into several key modules:
//!
//! - `proto`: Wire format for the fixed packet header and its validation
//! - `assembly`: Pure frame reassembly state machine (no I/O)
//! - `transport`: Socket provisioning for the bonded paths
//! - `sender`: Fragmentation and redundant fan-out across all paths
//! - `receiver`: Multiplexed fan-in from all paths into one assembler
//! - `control`: Configuration, validation, and health counters
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use framebond_core::{BondedReceiver, BondedSender, ReceiverConfig, SenderConfig};
//!
//! let mut receiver = BondedReceiver::bind(&ReceiverConfig::default()).await?;
//! let mut sender = BondedSender::connect(&SenderConfig::default()).await?;
//!
//! sender.send_frame(1, b"frame payload", 2).await?;
//! if let Some(frame) = receiver.recv_frame().await? {
//!     println!("frame {} ({} bytes)", frame.timestamp, frame.payload.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod control;
pub mod proto;
pub mod receiver;
pub mod sender;
pub mod transport;

pub use assembly::{Accept, FrameAssembler};
pub use control::{
    ConfigError, LinkConfig, ReceiverConfig, ReceiverStats, SenderConfig, SenderEndpoint,
    SenderStats,
};
pub use proto::{PacketHeader, ProtocolError};
pub use receiver::{BondedReceiver, Frame, ReceiveError, RecvPoll, ShutdownHandle};
pub use sender::{BondedSender, SendError};
