//! Bonded receiving session.
//!
//! A `BondedReceiver` listens on every bonded local address at once: each
//! bound socket gets its own receive task that funnels datagrams into one
//! bounded channel, and `recv_frame` drains that channel through a single
//! `FrameAssembler`. Waiting on the channel is the multiplexed wait over the
//! union of all sockets; whichever path delivers a packet first advances the
//! same reassembly state.
//!
//! Shutdown is cooperative: a `ShutdownHandle` flips a watch channel, the
//! receive tasks exit, the event channel closes, and a blocked `recv_frame`
//! returns `Ok(None)` so callers can distinguish deliberate shutdown from
//! failure.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::assembly::{Accept, FrameAssembler};
use crate::control::{ConfigError, ReceiverConfig, ReceiverStats};
use crate::transport::LinkPath;

/// One fully reassembled frame.
///
/// The payload borrows the session's assembly buffer and is valid until the
/// next receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Timestamp the sender stamped on the frame
    pub timestamp: u64,
    /// Assembled payload bytes
    pub payload: &'a [u8],
}

/// Outcome of a deadline-bounded receive
#[derive(Debug)]
pub enum RecvPoll<'a> {
    /// A frame completed before the deadline
    Frame(Frame<'a>),
    /// The deadline expired; partial reassembly state is kept for the next call
    TimedOut,
    /// The session was shut down
    Closed,
}

/// Receive errors that compromise a bonded path
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("bonded path #{path_id} failed")]
    Path {
        path_id: usize,
        #[source]
        source: io::Error,
    },
}

enum PathEvent {
    Datagram { path_id: usize, bytes: Vec<u8> },
    Failed { path_id: usize, error: io::Error },
}

/// Cloneable handle that unblocks a waiting receiver from another task
#[derive(Clone)]
pub struct ShutdownHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask every receive task to exit; a blocked `recv_frame` then returns
    /// `Ok(None)` once the funnel drains.
    pub fn shutdown(&self) {
        let _ = self.stop.send(true);
    }
}

/// Receiving half of a bonded link
pub struct BondedReceiver {
    events: mpsc::Receiver<PathEvent>,
    assembler: FrameAssembler,
    stop: Arc<watch::Sender<bool>>,
    local_addrs: Vec<SocketAddr>,
}

impl BondedReceiver {
    /// Bind every configured local address and start its receive task.
    ///
    /// Any bind failure is fatal to construction.
    pub async fn bind(config: &ReceiverConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let assembler = FrameAssembler::new(config.link())?;
        let (events_tx, events) = mpsc::channel(config.channel_depth);
        let (stop_tx, _) = watch::channel(false);
        let stop = Arc::new(stop_tx);

        let mut local_addrs = Vec::with_capacity(config.binds.len());
        for (id, addr) in config.binds.iter().enumerate() {
            let path = LinkPath::bound(id, *addr, None)
                .await
                .map_err(|source| ConfigError::Bind { addr: *addr, source })?;
            local_addrs.push(path.local_addr().map_err(|source| ConfigError::Bind {
                addr: *addr,
                source,
            })?);
            tokio::spawn(run_path(
                path,
                events_tx.clone(),
                stop.subscribe(),
                config.max_packet_length,
            ));
        }

        Ok(Self {
            events,
            assembler,
            stop,
            local_addrs,
        })
    }

    /// Addresses the bonded sockets actually bound to (useful when binding
    /// port 0)
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Handle for unblocking this receiver from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// Block until a frame completes, the session closes, or a path fails.
    ///
    /// Malformed datagrams are dropped and counted without disturbing the
    /// wait. A path failure is surfaced as an error but leaves reassembly
    /// state intact, so the call may be retried on the surviving paths.
    pub async fn recv_frame(&mut self) -> Result<Option<Frame<'_>>, ReceiveError> {
        loop {
            let Some(event) = self.events.recv().await else {
                return Ok(None);
            };

            match event {
                PathEvent::Failed { path_id, error } => {
                    return Err(ReceiveError::Path {
                        path_id,
                        source: error,
                    });
                }
                PathEvent::Datagram { path_id, bytes } => {
                    match self.assembler.accept(&bytes) {
                        Ok(Accept::Completed) => break,
                        Ok(_) => {}
                        Err(violation) => {
                            tracing::debug!(path_id, %violation, "dropping malformed datagram");
                        }
                    }
                }
            }
        }

        Ok(self
            .assembler
            .completed()
            .map(|(timestamp, payload)| Frame { timestamp, payload }))
    }

    /// Like `recv_frame`, but gives up after `wait`.
    ///
    /// Expiry is a recoverable outcome, not an error: packets accepted so far
    /// stay in the assembler and the next call picks up where this one left
    /// off.
    pub async fn recv_frame_timeout(
        &mut self,
        wait: Duration,
    ) -> Result<RecvPoll<'_>, ReceiveError> {
        match tokio::time::timeout(wait, self.recv_frame()).await {
            Ok(Ok(Some(frame))) => Ok(RecvPoll::Frame(frame)),
            Ok(Ok(None)) => Ok(RecvPoll::Closed),
            Ok(Err(error)) => Err(error),
            Err(_elapsed) => Ok(RecvPoll::TimedOut),
        }
    }

    /// Health counters accumulated since construction
    pub fn stats(&self) -> &ReceiverStats {
        self.assembler.stats()
    }
}

impl Drop for BondedReceiver {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

async fn run_path(
    path: LinkPath,
    events: mpsc::Sender<PathEvent>,
    mut stop: watch::Receiver<bool>,
    max_packet_length: usize,
) {
    let mut buf = vec![0u8; max_packet_length];
    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            received = path.recv(&mut buf) => match received {
                Ok((n, _peer)) => {
                    let event = PathEvent::Datagram {
                        path_id: path.id,
                        bytes: buf[..n].to_vec(),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::warn!(path_id = path.id, %error, "bonded path receive failed");
                    let _ = events
                        .send(PathEvent::Failed {
                            path_id: path.id,
                            error,
                        })
                        .await;
                    break;
                }
            }
        }
    }
}
