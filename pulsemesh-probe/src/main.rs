//! Pulsemesh Probe - node-side health reporter
//!
//! The probe samples the host it runs on and ships batches to the
//! pulsemesh control plane:
//! - Periodic collection into a bounded buffer
//! - Batch pushes once the buffer reaches a full batch
//! - Keepalive flushes that retry batches missed while a push was in flight
//! - One-shot inspection mode for operators (--once)

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::time::interval;
use tracing::{info, warn};

use pulsemesh_probe::buffer::{flush_once, FlushOutcome, SampleBuffer, SharedBuffer};
use pulsemesh_probe::config::ProbeConfig;
use pulsemesh_probe::pusher::Pusher;
use pulsemesh_probe::sampler::{SampleSource, SystemSampler};

/// Node-side telemetry probe for the pulsemesh control plane.
#[derive(Debug, Parser)]
#[command(name = "pulsemesh-probe", version)]
struct Cli {
    /// Collect a single sample, print it as JSON and exit.
    #[arg(long)]
    once: bool,

    /// With --once: also push the sample to the configured endpoint.
    #[arg(long)]
    push: bool,
}

struct Probe<S: SampleSource> {
    config: ProbeConfig,
    source: S,
    buffer: SharedBuffer,
    pusher: Arc<Pusher>,
}

impl<S: SampleSource> Probe<S> {
    fn new(config: ProbeConfig, source: S) -> Result<Self> {
        let pusher = Pusher::new(&config).context("Failed to build HTTP client")?;
        let buffer = SampleBuffer::shared(&config);
        Ok(Self {
            config,
            source,
            buffer,
            pusher: Arc::new(pusher),
        })
    }

    async fn run(&mut self) -> Result<()> {
        info!(
            "Probe running as {} ({} / {}), pushing to {}",
            self.config.node_id, self.config.region, self.config.role, self.config.endpoint
        );

        let mut sample_timer = interval(self.config.push_interval);
        let mut keepalive_timer = interval(self.config.keepalive_interval());
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = sample_timer.tick() => {
                    let sample = self.source.collect();
                    let (dropped, ready) = {
                        let mut buf = self.buffer.lock();
                        let dropped = buf.push(sample);
                        (dropped, buf.over_threshold())
                    };
                    if dropped {
                        warn!("Buffer at capacity, dropped the oldest unsent sample");
                    }
                    if ready {
                        self.spawn_flush();
                    }
                }

                _ = keepalive_timer.tick() => {
                    self.spawn_flush();
                }

                _ = &mut shutdown => break,
            }
        }

        info!("Shutting down, flushing remaining samples");
        self.final_flush().await
    }

    /// Fires a flush without blocking the sampling loop. The buffer's
    /// in-flight guard makes overlapping spawns harmless.
    fn spawn_flush(&self) {
        let buffer = Arc::clone(&self.buffer);
        let pusher = Arc::clone(&self.pusher);
        tokio::spawn(async move {
            flush_once(&buffer, &pusher, false).await;
        });
    }

    /// Waits out any in-flight flush (bounded by the push timeout), then
    /// makes one forced attempt to drain what is left.
    async fn final_flush(&self) -> Result<()> {
        for _ in 0..150 {
            if !self.buffer.lock().is_flushing() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        match flush_once(&self.buffer, &self.pusher, true).await {
            FlushOutcome::Retrying(left) => {
                bail!("final flush failed, {left} samples undelivered")
            }
            FlushOutcome::Delivered(_) | FlushOutcome::Idle => {
                let left = self.buffer.lock().len();
                if left > 0 {
                    warn!("Exiting with {left} samples still buffered");
                }
                Ok(())
            }
        }
    }
}

/// Collects one sample, prints it, optionally pushes it.
async fn run_once(config: ProbeConfig, push: bool) -> Result<()> {
    let mut sampler = SystemSampler::new(&config);
    let sample = sampler.collect();
    let rendered = serde_json::to_string_pretty(&sample).context("Failed to render sample")?;
    println!("{rendered}");

    if push {
        let pusher = Pusher::new(&config).context("Failed to build HTTP client")?;
        let buffer = SampleBuffer::shared(&config);
        buffer.lock().push(sample);
        match flush_once(&buffer, &pusher, true).await {
            FlushOutcome::Delivered(_) => {}
            FlushOutcome::Retrying(_) | FlushOutcome::Idle => {
                bail!("Push to {} failed", config.endpoint)
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulsemesh_probe=info,info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ProbeConfig::from_env();

    if cli.once {
        return run_once(config, cli.push).await;
    }

    info!("Pulsemesh probe starting...");
    let sampler = SystemSampler::new(&config);
    let mut probe = Probe::new(config, sampler).context("Failed to initialize probe")?;
    probe.run().await
}
