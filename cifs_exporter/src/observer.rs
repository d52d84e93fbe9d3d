//! Periodically sample the CIFS statistics report
//!
//! The observer reads the report, parses it and publishes the result as
//! gauges once per sample period. A failed read or parse is logged and
//! counted, the observer then waits for the next tick. Only a shutdown signal
//! ends [`Server::run`].

mod publish;

use std::{path::PathBuf, time::Duration};

use cifs_stats::Parsed;
use metrics::{counter, gauge};
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{config::Config, source};

#[derive(thiserror::Error, Debug)]
/// Errors produced by a single sample of [`Server`]
pub enum Error {
    /// Wrapper for [`source::Error`]
    #[error("Source error: {0}")]
    Source(#[from] source::Error),
    /// Wrapper for [`cifs_stats::Error`]
    #[error("Parse error: {0}")]
    Parse(#[from] cifs_stats::Error),
}

#[derive(Debug)]
/// The observer server.
///
/// Nothing is read until [`Server::run`] is called.
pub struct Server {
    stats_path: PathBuf,
    sample_period: Duration,
    publisher: publish::Publisher,
}

impl Server {
    /// Create a new [`Server`] instance
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            stats_path: config.stats_path.clone(),
            sample_period: config.sample_period(),
            publisher: publish::Publisher::default(),
        }
    }

    /// Run this [`Server`] until `shutdown` is cancelled.
    ///
    /// The first sample is taken immediately, later samples once per sample
    /// period. A slow sample delays the next tick rather than triggering a
    /// burst of catch-up reads.
    pub async fn run(mut self, shutdown: CancellationToken) {
        publish::describe();
        info!(
            "observing {} every {:?}",
            self.stats_path.display(),
            self.sample_period
        );

        let mut sample_delay = sample_interval(self.sample_period);
        loop {
            tokio::select! {
                _ = sample_delay.tick() => {
                    if let Err(err) = self.sample().await {
                        warn!("sample failed: {err}");
                    }
                }
                () = shutdown.cancelled() => {
                    info!("shutdown signal received");
                    return;
                }
            }
        }
    }

    /// Take one sample: read, parse and publish.
    ///
    /// # Errors
    ///
    /// Function will error if the report cannot be read or its header is
    /// malformed. The matching error counter is incremented and
    /// `cifs_exporter_up` set to zero before returning.
    pub async fn sample(&mut self) -> Result<Parsed, Error> {
        let report = match source::read_report(&self.stats_path).await {
            Ok(report) => report,
            Err(err) => {
                counter!(publish::READ_ERRORS).increment(1);
                gauge!(publish::UP).set(0.0);
                return Err(err.into());
            }
        };

        let parsed = match cifs_stats::parse(&report) {
            Ok(parsed) => parsed,
            Err(err) => {
                error!("report at {} is malformed", self.stats_path.display());
                counter!(publish::PARSE_ERRORS).increment(1);
                gauge!(publish::UP).set(0.0);
                return Err(err.into());
            }
        };

        for warning in &parsed.warnings {
            warn!(?warning, "connection block not fully parsed");
        }
        debug!(
            blocks = parsed.snapshot.blocks.len(),
            skipped = parsed.skipped_blocks(),
            truncated = parsed.truncated_blocks(),
            "report parsed"
        );

        self.publisher.publish(&parsed);
        gauge!(publish::UP).set(1.0);
        Ok(parsed)
    }
}

fn sample_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
