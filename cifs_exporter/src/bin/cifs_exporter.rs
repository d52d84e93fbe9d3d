use std::{
    env,
    fmt::{self, Display},
    io,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use cifs_exporter::{
    config::{self, Config, Telemetry},
    observer, source,
};
use clap::{ArgGroup, Args, Parser, Subcommand};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use metrics_util::MetricKindMask;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use tokio::{runtime::Builder, signal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

/// Environment variable holding YAML configuration, preferred over any file.
const CONFIG_ENV_VAR: &str = "CIFS_EXPORTER_CONFIG";

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::Error),
    #[error("Failed to read report: {0}")]
    Source(#[from] source::Error),
    #[error("Failed to parse report: {0}")]
    Parse(#[from] cifs_stats::Error),
    #[error("Failed to serialize report: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Parsing Prometheus address failed: {0}")]
    PrometheusAddr(#[from] std::net::AddrParseError),
    #[error("Failed to install Prometheus exporter: {0}")]
    Prometheus(#[from] BuildError),
    #[error("Observer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

fn default_config_path() -> String {
    "/etc/cifs_exporter/cifs_exporter.yaml".to_string()
}

#[derive(Default, Clone, Debug)]
struct CliKeyValues {
    inner: FxHashMap<String, String>,
}

impl CliKeyValues {
    #[cfg(test)]
    fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }
}

impl Display for CliKeyValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        for (k, v) in &self.inner {
            write!(f, "{k}={v},")?;
        }
        Ok(())
    }
}

impl FromStr for CliKeyValues {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        // Keys are `[[:alpha:]_]+` followed by '='. Values may themselves
        // contain ',' so the next key, not the next comma, ends a value.
        static RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"([[:alpha:]_]+)=").expect("Invalid regex pattern provided"));

        let mut labels = FxHashMap::default();

        for cap in RE.captures_iter(input) {
            let (Some(whole), Some(key)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            let start = whole.end();
            let end = RE.find_at(input, start).map_or(input.len(), |m| m.start());
            let value = input[start..end].trim_end_matches(',').to_string();

            labels.insert(key.as_str().to_string(), value);
        }

        Ok(Self { inner: labels })
    }
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve CIFS statistics for Prometheus
    Run(Box<RunCommand>),
    /// Validate configuration file and exit
    ConfigCheck(ConfigCheckCommand),
    /// Parse the statistics report once and print it as JSON
    Parse(ParseCommand),
}

#[derive(Args)]
struct RunCommand {
    #[command(flatten)]
    args: ExporterArgs,
}

#[derive(clap::Args)]
#[clap(group(
    ArgGroup::new("telemetry")
        .required(false)
        .args(&["prometheus_addr", "prometheus_path"]),
))]
struct ExporterArgs {
    /// path on disk to the configuration file
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
    /// path of the CIFS statistics report, overrides the configuration
    #[clap(long)]
    stats_path: Option<PathBuf>,
    /// milliseconds between reads of the report, overrides the configuration
    #[clap(long)]
    sample_period_milliseconds: Option<u64>,
    /// additional labels to apply to all metrics, format KEY=VAL,KEY2=VAL
    #[clap(long)]
    global_labels: Option<CliKeyValues>,
    /// address to bind prometheus exporter to, exclusive of prometheus-path
    #[clap(long)]
    prometheus_addr: Option<String>,
    /// socket to bind prometheus exporter to, exclusive of prometheus-addr
    #[clap(long)]
    prometheus_path: Option<PathBuf>,
    /// the maximum time to wait, in seconds, for controlled shutdown
    #[clap(long, default_value_t = 30)]
    max_shutdown_delay: u16,
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
}

#[derive(Args)]
struct ParseCommand {
    /// path of the CIFS statistics report
    #[clap(long, default_value = "/proc/fs/cifs/Stats")]
    stats_path: PathBuf,
}

/// Load configuration: the environment variable wins, then the file at
/// `config_path`. A missing file at the default path means defaults.
fn load_config(config_path: &str) -> Result<Config, Error> {
    if let Ok(contents) = env::var(CONFIG_ENV_VAR) {
        debug!("Using config from env var '{CONFIG_ENV_VAR}'");
        return Ok(Config::from_yaml(&contents)?);
    }

    let path = PathBuf::from(config_path);
    if !path.exists() && config_path == default_config_path() {
        debug!("No configuration file at {config_path}, using defaults");
        return Ok(Config::default());
    }
    debug!("Attempting to open configuration file at: {config_path}");
    Config::from_path(&path).map_err(|err| {
        error!("Configuration validation failed: {err}");
        Error::Config(err)
    })
}

fn validate_config(config_path: &str) -> Result<Config, Error> {
    let config = load_config(config_path)?;
    info!("Configuration file is valid");
    Ok(config)
}

/// Apply command line overrides on top of `config`.
fn get_config(args: &ExporterArgs, mut config: Config) -> Result<Config, Error> {
    if let Some(stats_path) = &args.stats_path {
        config.stats_path.clone_from(stats_path);
    }
    if let Some(period) = args.sample_period_milliseconds {
        config.sample_period_milliseconds = period;
    }

    let options_global_labels = args.global_labels.clone().unwrap_or_default();
    if let Some(prom_addr) = &args.prometheus_addr {
        config.telemetry = Telemetry::Prometheus {
            addr: prom_addr.parse()?,
            global_labels: options_global_labels.inner,
        };
    } else if let Some(prom_path) = &args.prometheus_path {
        config.telemetry = Telemetry::PrometheusSocket {
            path: prom_path.clone(),
            global_labels: options_global_labels.inner,
        };
    } else {
        config
            .telemetry
            .global_labels_mut()
            .extend(options_global_labels.inner);
    }

    config.validate()?;
    Ok(config)
}

fn install_exporter(config: &Config) -> Result<(), Error> {
    let (mut builder, global_labels) = match &config.telemetry {
        Telemetry::Prometheus {
            addr,
            global_labels,
        } => (PrometheusBuilder::new().with_http_listener(*addr), global_labels),
        Telemetry::PrometheusSocket {
            path,
            global_labels,
        } => (
            PrometheusBuilder::new().with_http_uds_listener(path.clone()),
            global_labels,
        ),
    };
    for (k, v) in global_labels {
        builder = builder.add_global_label(k, v);
    }
    builder
        .idle_timeout(MetricKindMask::GAUGE, Some(config.expiration()))
        .install()?;
    Ok(())
}

async fn inner_main(config: Config) -> Result<(), Error> {
    install_exporter(&config)?;

    let shutdown = CancellationToken::new();
    let observer_server = observer::Server::new(&config);
    let mut observer_handle = tokio::spawn(observer_server.run(shutdown.clone()));

    let res = tokio::select! {
        res = signal::ctrl_c() => {
            info!("received ctrl-c");
            res.map_err(Error::from)
        }
        res = &mut observer_handle => {
            // The observer only returns once cancelled, nothing has cancelled it.
            error!("observer stopped unexpectedly");
            return res.map_err(Error::from);
        }
    };

    shutdown.cancel();
    if let Err(err) = observer_handle.await {
        warn!("Could not join the observer task: {err}");
    }
    res
}

/// Read and parse the report once, printing the snapshot as JSON.
async fn parse_once(stats_path: PathBuf) -> Result<(), Error> {
    let report = source::read_report(&stats_path).await?;
    let parsed = cifs_stats::parse(&report)?;
    for warning in &parsed.warnings {
        warn!(?warning, "connection block not fully parsed");
    }
    println!("{}", serde_json::to_string_pretty(&parsed.snapshot)?);
    Ok(())
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let cli = Cli::parse();
    let args = match cli.command {
        Commands::Run(run_cmd) => run_cmd.args,
        Commands::ConfigCheck(config_check_cmd) => {
            match validate_config(&config_check_cmd.config_path) {
                Ok(_) => std::process::exit(0),
                Err(_) => std::process::exit(1),
            }
        }
        Commands::Parse(parse_cmd) => {
            let runtime = Builder::new_current_thread().enable_io().build()?;
            return runtime.block_on(parse_once(parse_cmd.stats_path));
        }
    };

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting cifs_exporter {version} run.");

    let config = get_config(&args, load_config(&args.config_path)?)?;
    let max_shutdown_delay = Duration::from_secs(args.max_shutdown_delay.into());

    let runtime = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    let res = runtime.block_on(inner_main(config));
    info!(
        "Shutting down runtime with a {} second delay. May leave orphaned tasks.",
        max_shutdown_delay.as_secs(),
    );
    runtime.shutdown_timeout(max_shutdown_delay);
    info!("Bye. :)");
    res
}
