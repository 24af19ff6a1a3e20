//! cluster-enroll - join this node to a cluster and provision its TLS certificate

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cluster_enroll::agent::{
    CommandRestarter, EnrollmentAgent, EnrollmentContext, LocalService, StaticCredentials,
};
use cluster_enroll::bootstrap::decode_bootstrap_key;
use cluster_enroll::cluster::ClusterClient;
use cluster_enroll::config::AgentConfig;
use cluster_enroll::pki::RsaCsrGenerator;
use cluster_enroll::state::{
    ArtifactStore, EnrollmentStore, FileStateBackend, StateBackend,
};

/// cluster-enroll - cluster bootstrap and certificate provisioning agent
#[derive(Parser, Debug)]
#[command(name = "cluster-enroll", version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the enrollment agent until interrupted
    ///
    /// SIGHUP re-reads the configuration file and applies a changed bootstrap key.
    Run {
        /// Path to the agent configuration file
        #[arg(short = 'c', long = "config", default_value = "cluster-enroll.yaml")]
        config: PathBuf,

        /// Bootstrap key, overriding the one in the configuration file
        #[arg(long, env = "BOOTSTRAP_KEY")]
        bootstrap_key: Option<String>,
    },

    /// Print the persisted enrollment state as JSON
    Status {
        /// Path to the agent configuration file
        #[arg(short = 'c', long = "config", default_value = "cluster-enroll.yaml")]
        config: PathBuf,
    },

    /// Decode a bootstrap key and print the cluster endpoint it points at
    DecodeKey {
        /// Base64 bootstrap key
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run {
            config,
            bootstrap_key,
        } => run_agent(&config, bootstrap_key).await,
        Commands::Status { config } => print_status(&config).await,
        Commands::DecodeKey { key } => {
            let location = decode_bootstrap_key(&key)?;
            println!("host:          {}", location.host);
            println!("port:          {}", location.port);
            println!("api_base_path: {}", location.api_base_path);
            println!("join url:      {}", location.join_url("https"));
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn load_config(path: &Path) -> anyhow::Result<AgentConfig> {
    let config = AgentConfig::load(path).await?;
    config.validate()?;
    Ok(config)
}

/// Run the monitor and poller until Ctrl-C
async fn run_agent(config_path: &Path, key_override: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config_path).await?;
    info!(config = %config_path.display(), "Starting enrollment agent");

    let store = Arc::new(EnrollmentStore::open(FileStateBackend::new(
        &config.storage.state_file,
    ))?);

    let node_name = config.cluster.node_name.clone();
    if !node_name.is_empty() && store.snapshot().name != node_name {
        store.commit(|s| s.name = node_name)?;
    }

    let ctx = Arc::new(EnrollmentContext {
        store: store.clone(),
        artifacts: ArtifactStore::new(&config.storage.data_dir),
        client: ClusterClient::new(&config.transport())?,
        credentials: Arc::new(StaticCredentials::new(config.users.clone())),
        restarter: Arc::new(CommandRestarter::new(config.restart_command.clone())),
        csr_generator: Arc::new(RsaCsrGenerator),
        local: LocalService {
            address: config.server.host.clone(),
            port: config.server.port,
            api_base_path: config.server.api_base_path.clone(),
        },
        poll_interval: config.poll_interval(),
    });

    let agent = EnrollmentAgent::spawn(ctx);

    let initial_key = key_override.or(config.cluster.bootstrap_key);
    apply_bootstrap_key(&store, initial_key.as_deref());

    wait_for_shutdown(config_path, &store).await?;

    info!("Shutting down enrollment agent");
    agent.shutdown();
    Ok(())
}

/// Push a configured bootstrap key into the store if it differs
///
/// `None` leaves the stored key alone; `Some("")` clears enrollment.
fn apply_bootstrap_key(store: &EnrollmentStore, key: Option<&str>) {
    let Some(key) = key.map(str::trim) else {
        return;
    };
    if key == store.bootstrap_key() {
        return;
    }

    info!(cleared = key.is_empty(), "Bootstrap key changed");
    if let Err(e) = store.set_bootstrap_key(key) {
        error!(error = %e, kind = "persistence", "Failed to save bootstrap key");
        // The new key is kept in memory; handle it anyway
        store.reload_bootstrap_key();
    }
}

async fn reload_config(config_path: &Path, store: &EnrollmentStore) {
    match load_config(config_path).await {
        Ok(config) => apply_bootstrap_key(store, config.cluster.bootstrap_key.as_deref()),
        Err(e) => error!(error = %e, "Failed to reload configuration, keeping current key"),
    }
}

#[cfg(unix)]
async fn wait_for_shutdown(config_path: &Path, store: &EnrollmentStore) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return result.map_err(Into::into),
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading configuration");
                reload_config(config_path, store).await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_config_path: &Path, _store: &EnrollmentStore) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.map_err(Into::into)
}

/// Print the persisted state with the node token redacted
async fn print_status(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path).await?;
    let mut state = FileStateBackend::new(&config.storage.state_file)
        .load()?
        .unwrap_or_default();
    if !state.token.is_empty() {
        state.token = "<redacted>".to_string();
    }
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
