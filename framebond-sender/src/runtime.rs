use anyhow::{Context, Result};
use framebond_core::control::SenderConfig;
use framebond_core::sender::{BondedSender, SendError};
use std::fs;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

pub type LogFn = Box<dyn Fn(String) + Send + Sync + 'static>;

fn unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Synthetic payload used when no input file is configured. The modulus is
/// prime so the pattern does not align with packet boundaries.
fn test_pattern(length: usize) -> Vec<u8> {
    (0..length).map(|i| (i % 251) as u8).collect()
}

pub async fn run_sender(
    cfg: SenderConfig,
    mut stop: watch::Receiver<bool>,
    log: LogFn,
) -> Result<()> {
    let log = Arc::new(log);

    (log.as_ref())(format!(
        "Sender config: endpoints={} max_packet={} max_payload={} rounds={} interval={:?}",
        cfg.endpoints.len(),
        cfg.max_packet_length,
        cfg.max_payload_length,
        cfg.send_rounds,
        cfg.frame_interval
    ));

    let payload = match &cfg.input {
        Some(path) => fs::read(path)
            .with_context(|| format!("failed to read input file: {}", path.display()))?,
        None => test_pattern(cfg.frame_length),
    };

    let mut sender = BondedSender::connect(&cfg)
        .await
        .context("failed to construct bonded sender")?;

    (log.as_ref())(format!(
        "Bonded sender ready: {} paths, {} bytes per frame",
        sender.path_count(),
        payload.len()
    ));

    let mut tick = tokio::time::interval(cfg.frame_interval);
    let mut health = tokio::time::interval(cfg.health_interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let timestamp = unix_micros();
                match sender.send_frame(timestamp, &payload, cfg.send_rounds).await {
                    Ok(()) => {
                        (log.as_ref())(format!(
                            "Sent frame ts={timestamp} bytes={}",
                            payload.len()
                        ));
                    }
                    Err(e @ SendError::AllPathsFailed { .. }) => {
                        return Err(e).context("every bonded path failed");
                    }
                    Err(e) => {
                        return Err(e).context("frame rejected before sending");
                    }
                }
            }
            _ = health.tick() => {
                let stats = sender.stats();
                (log.as_ref())(format!(
                    "Health: frames={} packets={} bytes={} path_errors={}",
                    stats.frames_sent,
                    stats.packets_sent,
                    stats.bytes_sent,
                    stats.path_send_errors
                ));
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
    }

    Ok(())
}
