//! ResilIoT base station
//!
//! Usage: `resiliot-node --config <path> [--json-logs] [--once]`
//!
//! A dedicated thread receives radio frames and stores validated readings.
//! Every `alerts.interval_secs` the alert level is evaluated from the latest
//! readings and today's forecast, then broadcast encrypted over UDP.
//! `--once` runs a single evaluation and broadcast, then exits.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::{anyhow, bail, Context};
use chrono::Local;
use resiliot_alerts::{AlertEngine, ThresholdSet};
use resiliot_core::{logging, Config, CryptoConfig};
use resiliot_crypto::{AeadEnvelope, NonceBuilder, PersistentCounter, SharedKey};
use resiliot_radio::{
    run_receive_loop, BroadcastOutcome, BroadcastSender, IngestStats, Ingestor, UdpBroadcast,
    UdpFrameSource,
};
use resiliot_telemetry::{PacketValidator, SqliteStore};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

#[derive(Debug)]
struct Args {
    config: PathBuf,
    json_logs: bool,
    once: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut config = None;
    let mut json_logs = false;
    let mut once = false;

    let mut args_iter = args.iter().skip(1);
    while let Some(arg) = args_iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = args_iter
                    .next()
                    .ok_or_else(|| anyhow!("--config was provided without a path"))?;
                config = Some(PathBuf::from(path));
            }
            "--json-logs" => json_logs = true,
            "--once" => once = true,
            other => bail!("unrecognised argument {other:?}"),
        }
    }

    Ok(Args {
        config: config.ok_or_else(|| anyhow!("missing required --config <path> argument"))?,
        json_logs,
        once,
    })
}

fn load_key(crypto: &CryptoConfig) -> anyhow::Result<SharedKey> {
    match (&crypto.psk_hex, &crypto.key_file) {
        (Some(hex), _) => SharedKey::from_hex(hex).context("invalid crypto.psk_hex"),
        (None, Some(path)) => SharedKey::from_file(path)
            .with_context(|| format!("failed to load key from {}", path.display())),
        (None, None) => bail!("no key configured"),
    }
}

struct AlertCycle {
    store: SqliteStore,
    engine: AlertEngine,
    sender: BroadcastSender<UdpBroadcast, Arc<PersistentCounter>>,
    thresholds_path: PathBuf,
}

impl AlertCycle {
    /// Evaluate and broadcast once. Nothing is sent unless evaluation succeeds.
    fn run(&mut self) -> anyhow::Result<BroadcastOutcome> {
        let thresholds =
            ThresholdSet::load(&self.thresholds_path).context("failed to load thresholds")?;
        self.engine.set_thresholds(thresholds);

        let today = Local::now().date_naive();
        let evaluation = self
            .engine
            .evaluate(&self.store, &self.store, today)
            .context("alert evaluation failed")?;

        self.sender
            .send(evaluation.level)
            .context("failed to reserve a nonce")
    }
}

fn spawn_receiver(
    config: &Config,
    key: &SharedKey,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<thread::JoinHandle<IngestStats>> {
    let mut source = UdpFrameSource::bind(config.radio.listen, config.radio.max_frame_len)
        .with_context(|| format!("failed to listen on {}", config.radio.listen))?;
    let store = SqliteStore::open(&config.storage.db_path, config.busy_timeout())
        .context("failed to open reading store for ingest")?;
    let mut ingestor = Ingestor::new(
        AeadEnvelope::new(key),
        PacketValidator::new(config.node.address),
        store,
    );

    let handle = thread::Builder::new()
        .name("radio-rx".to_string())
        .spawn(move || run_receive_loop(&mut source, &mut ingestor, &shutdown))?;
    Ok(handle)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    if args.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    let key = load_key(&config.crypto)?;

    info!(
        address = %config.node.address,
        db = %config.storage.db_path.display(),
        broadcast = %config.broadcast_target(),
        "ResilIoT base station starting"
    );

    let counter = Arc::new(PersistentCounter::new(&config.crypto.counter_path));
    let mut cycle = AlertCycle {
        store: SqliteStore::open(&config.storage.db_path, config.busy_timeout())
            .context("failed to open reading store for alerts")?,
        engine: AlertEngine::new(ThresholdSet::default()),
        sender: BroadcastSender::new(
            AeadEnvelope::new(&key),
            NonceBuilder::new(counter),
            UdpBroadcast::from_config(&config.broadcast),
        ),
        thresholds_path: config.storage.thresholds_path.clone(),
    };

    if args.once {
        let outcome = cycle.run()?;
        info!(?outcome, "Single alert cycle complete");
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let receiver = spawn_receiver(&config, &key, Arc::clone(&shutdown))?;
    let cycle = Arc::new(Mutex::new(cycle));

    let mut interval = tokio::time::interval(config.alert_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let cycle = Arc::clone(&cycle);
                let result = tokio::task::spawn_blocking(move || {
                    cycle.lock().unwrap_or_else(PoisonError::into_inner).run()
                })
                .await;

                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        let reason = format!("{e:#}");
                        error!(reason = %reason, "Alert cycle skipped");
                    }
                    Err(e) => error!(error = %e, "Alert task failed"),
                }
            }
            _ = &mut ctrl_c => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    let stats = tokio::task::spawn_blocking(move || receiver.join())
        .await?
        .map_err(|_| anyhow!("receive thread panicked"))?;

    info!(
        stored = stats.stored,
        duplicate = stats.duplicate,
        discarded = stats.discarded,
        dropped = stats.dropped,
        "ResilIoT base station stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("resiliot-node")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args(&argv(&["--config", "node.toml", "--once"])).unwrap();
        assert_eq!(args.config, PathBuf::from("node.toml"));
        assert!(args.once);
        assert!(!args.json_logs);
    }

    #[test]
    fn test_parse_args_requires_config() {
        assert!(parse_args(&argv(&["--json-logs"])).is_err());
        assert!(parse_args(&argv(&["--config"])).is_err());
        assert!(parse_args(&argv(&["--config", "a.toml", "--verbose"])).is_err());
    }

    #[test]
    fn test_load_key_from_hex() {
        let crypto = CryptoConfig {
            psk_hex: Some("11".repeat(32)),
            key_file: None,
            counter_path: PathBuf::from("/tmp/unused"),
        };
        assert_eq!(load_key(&crypto).unwrap().as_bytes(), &[0x11u8; 32]);
    }
}
