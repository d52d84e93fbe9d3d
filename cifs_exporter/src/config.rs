//! This module controls configuration parsing from the end user, providing a
//! convenience mechanism for the rest of the program. Every field has a
//! default, an empty document is a valid configuration.
use std::{
    io,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use rustc_hash::FxHashMap;
use serde::Deserialize;

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// The sample period is zero
    #[error("sample_period_milliseconds must be greater than zero")]
    ZeroSamplePeriod,
}

fn default_stats_path() -> PathBuf {
    PathBuf::from("/proc/fs/cifs/Stats")
}

fn default_sample_period() -> u64 {
    1_000
}

/// Main configuration struct for this program
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Location of the CIFS statistics report
    #[serde(default = "default_stats_path")]
    pub stats_path: PathBuf,
    /// The period on which the report is read and published.
    #[serde(default = "default_sample_period")]
    pub sample_period_milliseconds: u64,
    /// The method by which to expose metrics
    #[serde(default)]
    pub telemetry: Telemetry,
    /// Seconds after which a series that is no longer published, a share
    /// that was unmounted say, disappears from exposition. Unset means two
    /// sample periods.
    #[serde(default)]
    pub expiration_seconds: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stats_path: default_stats_path(),
            sample_period_milliseconds: default_sample_period(),
            telemetry: Telemetry::default(),
            expiration_seconds: None,
        }
    }
}

impl Config {
    /// Parse a YAML document into a [`Config`].
    ///
    /// # Errors
    ///
    /// Function will error if the document is not valid YAML, carries unknown
    /// fields or sets a zero sample period.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        // An empty document deserializes to unit, not to an empty map.
        let config: Self = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the YAML configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Function will error if the file cannot be read or does not parse, see
    /// [`Config::from_yaml`].
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        Self::from_yaml(&contents)
    }

    /// Reject configurations the exporter cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroSamplePeriod`] if the sample period is zero.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_period_milliseconds == 0 {
            return Err(Error::ZeroSamplePeriod);
        }
        Ok(())
    }

    /// The sample period as a [`Duration`].
    #[must_use]
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_milliseconds)
    }

    /// The expiration as a [`Duration`], two sample periods unless set.
    #[must_use]
    pub fn expiration(&self) -> Duration {
        self.expiration_seconds
            .map_or_else(|| self.sample_period() * 2, Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(untagged)]
/// Defines the manner in which metrics are exposed.
pub enum Telemetry {
    /// Metrics are served for scraping over HTTP.
    Prometheus {
        /// Address and port for prometheus exporter
        addr: SocketAddr,
        /// Additional labels to include in every metric
        #[serde(default)]
        global_labels: FxHashMap<String, String>,
    },
    /// Metrics are served for scraping on a unix socket.
    PrometheusSocket {
        /// Path of the socket for the prometheus exporter
        path: PathBuf,
        /// Additional labels to include in every metric
        #[serde(default)]
        global_labels: FxHashMap<String, String>,
    },
}

impl Telemetry {
    /// Mutable access to the global labels, whatever the variant.
    pub fn global_labels_mut(&mut self) -> &mut FxHashMap<String, String> {
        match self {
            Telemetry::Prometheus { global_labels, .. }
            | Telemetry::PrometheusSocket { global_labels, .. } => global_labels,
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::Prometheus {
            addr: SocketAddr::from(([0, 0, 0, 0], 9812)),
            global_labels: FxHashMap::default(),
        }
    }
}
