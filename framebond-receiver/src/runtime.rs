use anyhow::{Context, Result};
use framebond_core::control::ReceiverConfig;
use framebond_core::receiver::BondedReceiver;
use std::fs;
use std::sync::Arc;
use tokio::sync::watch;

pub type LogFn = Box<dyn Fn(String) + Send + Sync + 'static>;

pub async fn run_receiver(
    cfg: ReceiverConfig,
    mut stop: watch::Receiver<bool>,
    log: LogFn,
) -> Result<()> {
    let log = Arc::new(log);

    (log.as_ref())(format!(
        "Receiver config: binds={} max_packet={} max_payload={}",
        cfg.binds.len(),
        cfg.max_packet_length,
        cfg.max_payload_length
    ));

    let mut receiver = BondedReceiver::bind(&cfg)
        .await
        .context("failed to construct bonded receiver")?;

    for addr in receiver.local_addrs() {
        (log.as_ref())(format!("Listening on {addr}"));
    }

    let mut health = tokio::time::interval(cfg.health_interval);
    let mut health_due = false;

    loop {
        tokio::select! {
            received = receiver.recv_frame() => match received {
                Ok(Some(frame)) => {
                    (log.as_ref())(format!(
                        "Recv frame ts={} bytes={}",
                        frame.timestamp,
                        frame.payload.len()
                    ));
                    if let Some(path) = &cfg.dump_path {
                        if let Err(e) = fs::write(path, frame.payload) {
                            (log.as_ref())(format!(
                                "Failed to dump frame to {}: {e}",
                                path.display()
                            ));
                        }
                    }
                }
                Ok(None) => {
                    (log.as_ref())("Session closed".to_string());
                    break;
                }
                Err(e) => {
                    // One failing path degrades redundancy but the others
                    // keep the stream alive.
                    (log.as_ref())(format!(
                        "Path failure: {e}; continuing on remaining paths"
                    ));
                }
            },
            _ = health.tick() => {
                health_due = true;
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    (log.as_ref())("Stop requested".to_string());
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                (log.as_ref())("Ctrl+C received".to_string());
                break;
            }
        }

        if health_due {
            health_due = false;
            let stats = receiver.stats();
            (log.as_ref())(format!(
                "Health: datagrams={} frames={} dup={} violations={} abandoned={}",
                stats.datagrams_received,
                stats.frames_completed,
                stats.duplicate_packets,
                stats.protocol_violations,
                stats.frames_abandoned
            ));
        }
    }

    Ok(())
}
