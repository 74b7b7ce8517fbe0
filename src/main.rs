use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use k8sd_features::controller::leader::node_name_from_identity;
use k8sd_features::controller::{
    trigger_queue, ConfigService, FeatureController, KubeUpgradeStatus, LeaderGate,
    LeaseLeadership, LeadershipSource, PeerNotifier, Trigger, UpgradeStatusSource,
};
use k8sd_features::daemon::DaemonConfig;
use k8sd_features::features::{default_components, FeatureReconciler, KubeLookup};
use k8sd_features::helm::HelmCli;
use k8sd_features::store::{ConfigStore, ConfigWriter, FileStore};
use k8sd_features::{telemetry, Error};
use tokio::sync::watch;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the feature reconciliation daemon
    Run(RunArgs),
    /// Show version and build information
    Version,
    /// Show leadership and upgrade state of the cluster
    Info(InfoArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Name of this node (defaults to the host name)
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Daemon settings file (TOML)
    #[arg(long, env = "K8SD_FEATURES_CONFIG")]
    config: Option<PathBuf>,

    /// Cluster configuration state file
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Base directory of the component charts
    #[arg(long)]
    manifests_dir: Option<PathBuf>,

    /// Address of the REST API
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Peer address to notify on configuration changes (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,

    #[arg(long)]
    fallback_interval_secs: Option<u64>,

    #[arg(long)]
    pass_timeout_secs: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Name of this node (defaults to the host name)
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,
}

impl RunArgs {
    /// File settings with command-line values applied on top
    fn daemon_config(&self) -> Result<DaemonConfig, Error> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load(path)?,
            None => DaemonConfig::default(),
        };
        if let Some(node_name) = &self.node_name {
            config.node_name = Some(node_name.clone());
        }
        if let Some(state_file) = &self.state_file {
            config.state_file = state_file.clone();
        }
        if let Some(manifests_dir) = &self.manifests_dir {
            config.manifests_dir = manifests_dir.clone();
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if !self.peers.is_empty() {
            config.peers = self.peers.clone();
        }
        if let Some(secs) = self.fallback_interval_secs {
            config.fallback_interval_secs = secs;
        }
        if let Some(secs) = self.pass_timeout_secs {
            config.pass_timeout_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

fn resolve_node_name(configured: Option<String>) -> Result<String, Error> {
    if let Some(name) = configured.filter(|n| !n.is_empty()) {
        return Ok(name);
    }
    hostname::get()?
        .into_string()
        .map_err(|_| Error::ConfigError("host name is not valid UTF-8".to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("k8sd-features v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            println!("Git SHA: {}", env!("GIT_SHA"));
            println!("Rust Version: {}", env!("RUST_VERSION"));
            Ok(())
        }
        Commands::Info(info_args) => run_info(info_args).await,
        Commands::Run(run_args) => run_daemon(run_args).await,
    }
}

async fn run_info(args: InfoArgs) -> Result<(), Error> {
    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    let node_name = resolve_node_name(args.node_name)?;

    let holder = LeaseLeadership::new(client.clone()).holder_identity().await?;
    let leader = holder
        .as_deref()
        .is_some_and(|h| node_name_from_identity(h) == node_name);
    println!("Lease holder: {}", holder.as_deref().unwrap_or("<none>"));
    println!("This node ({}) is leader: {}", node_name, leader);

    match KubeUpgradeStatus::new(client).in_progress().await? {
        Some(phase) => println!("Upgrade in progress: {:?}", phase),
        None => println!("Upgrade in progress: none"),
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true)));

    if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let otel_layer = telemetry::init_telemetry(&registry);
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }
}

async fn run_daemon(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_json);

    let config = args.daemon_config()?;
    let node_name = resolve_node_name(config.node_name.clone())?;
    info!(
        node = %node_name,
        "Starting k8sd-features v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let store: Arc<dyn ConfigStore> = Arc::new(FileStore::open(&config.state_file).await?);
    let helm = Arc::new(
        HelmCli::new(&config.manifests_dir)
            .with_binary(&config.helm_binary)
            .with_kubeconfig(config.kubeconfig.clone()),
    );
    let leader = LeaderGate::new(Arc::new(LeaseLeadership::new(client.clone())), &node_name);

    let (triggers, receiver) = trigger_queue();
    let peers = Arc::new(PeerNotifier::new(
        config.peers.clone(),
        config.notify_settings(),
    )?);
    let config_service = Arc::new(ConfigService::new(
        store.clone(),
        leader.clone(),
        triggers.clone(),
        peers,
    ));

    let writer: Arc<dyn ConfigWriter> = config_service.clone();
    let components = default_components(Arc::new(KubeLookup::new(client.clone())), writer);
    let reconciler = FeatureReconciler::new(helm, components);
    info!(components = ?reconciler.component_names(), "Registered feature components");

    let controller = FeatureController::new(
        store,
        reconciler,
        Arc::new(KubeUpgradeStatus::new(client)),
        leader,
        config.controller_settings(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    #[cfg(feature = "rest-api")]
    let server = {
        let state = Arc::new(k8sd_features::rest_api::ApiState {
            config: config_service.clone(),
            status: controller.status(),
        });
        let listen = config.listen;
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = k8sd_features::rest_api::run_server(state, listen, shutdown).await {
                error!("REST API server error: {:?}", e);
            }
        })
    };

    // Evaluate once at startup; followers drop this like any other trigger.
    if let Err(e) = config_service.on_config_changed(Trigger::ConfigChanged).await {
        error!("Initial leadership check failed: {}", e);
    }

    let controller_task = tokio::spawn(controller.run(receiver, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    drop(triggers);

    if let Err(e) = controller_task.await {
        error!("Feature controller task failed: {:?}", e);
    }
    #[cfg(feature = "rest-api")]
    {
        if let Err(e) = server.await {
            error!("REST API server task failed: {:?}", e);
        }
    }

    telemetry::shutdown_telemetry();
    Ok(())
}
