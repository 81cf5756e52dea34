//! Tunnel broker
//!
//! Loads the account registry from disk, enforces per-period traffic quotas,
//! and serves the operator admin API.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use broker_api::{AdminServer, AdminServerConfig};
use broker_registry::{
    load_registry, spawn_period_reset, AdmissionConfig, AdmissionController, UserRegistry,
};
use broker_store::{AccountStore, DiskAccountStore, DiskStore, DiskStoreOptions};
use broker_tls::{generate_self_signed, load_server_config, self_signed::DEFAULT_NAMES};

/// Tunnel broker - account registry and admission control
#[derive(Parser, Debug)]
#[command(name = "tunnel-broker")]
#[command(about = "Run the tunnel broker account registry and admin API", long_about = None)]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    server_args: ServerArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a self-signed certificate and key for the admin listener
    GenerateCert {
        /// Certificate output path (PEM)
        #[arg(long, default_value = "admin-cert.pem")]
        cert_out: PathBuf,

        /// Private key output path (PEM)
        #[arg(long, default_value = "admin-key.pem")]
        key_out: PathBuf,

        /// Subject alternative names (repeatable, defaults to localhost names)
        #[arg(long = "name")]
        names: Vec<String>,
    },
}

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Admin API bind address
    #[arg(long, env = "BROKER_ADMIN_ADDR", default_value = "0.0.0.0:4446")]
    admin_addr: SocketAddr,

    /// Shared secret operators send in the `Auth` header
    #[arg(long, env = "BROKER_ADMIN_SECRET", hide_env_values = true)]
    admin_secret: Option<String>,

    /// Directory holding the account records
    #[arg(long, env = "BROKER_DATA_DIR", default_value = "/tmp/db-diskv")]
    data_dir: PathBuf,

    /// Namespace for account keys in the store
    #[arg(long, env = "BROKER_KEY_PREFIX", default_value = "broker")]
    key_prefix: String,

    /// Read cache size in bytes (0 disables caching)
    #[arg(long, env = "BROKER_CACHE_SIZE", default_value_t = broker_store::DEFAULT_CACHE_SIZE)]
    cache_size: usize,

    /// Bytes an account may move per period before logins are refused
    #[arg(long, env = "BROKER_QUOTA_BYTES", default_value_t = broker_proto::DEFAULT_QUOTA_LIMIT)]
    quota_bytes: u64,

    /// Seconds between period counter resets
    #[arg(long, env = "BROKER_RESET_INTERVAL_SECS", default_value = "86400")]
    reset_interval_secs: u64,

    /// How long provisioning waits for the store, in milliseconds
    #[arg(long, env = "BROKER_STORE_TIMEOUT_MS", default_value = "5000")]
    store_timeout_ms: u64,

    /// Directory served under /static/ on the admin listener
    #[arg(long, env = "BROKER_STATIC_DIR")]
    static_dir: Option<PathBuf>,

    /// Serve the admin API over HTTPS
    #[arg(long, env = "BROKER_ADMIN_TLS")]
    admin_tls: bool,

    /// TLS certificate file path (PEM format)
    /// If not specified with --admin-tls, a self-signed certificate is generated
    #[arg(long, env = "BROKER_TLS_CERT")]
    tls_cert: Option<PathBuf>,

    /// TLS private key file path (PEM format)
    #[arg(long, env = "BROKER_TLS_KEY")]
    tls_key: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl ServerArgs {
    fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig::default()
            .with_quota_limit(self.quota_bytes)
            .with_reset_interval(Duration::from_secs(self.reset_interval_secs))
    }

    fn open_store(&self) -> Result<Arc<dyn AccountStore>> {
        let options = DiskStoreOptions::new(&self.data_dir).with_cache_size(self.cache_size);
        let disk = DiskStore::open(options).with_context(|| {
            format!("Failed to open data directory {}", self.data_dir.display())
        })?;

        Ok(Arc::new(DiskAccountStore::with_prefix(
            disk,
            self.key_prefix.clone(),
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for TLS)
    rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let cli = Cli::parse();

    if let Some(command) = cli.command {
        return match command {
            Commands::GenerateCert {
                cert_out,
                key_out,
                names,
            } => generate_cert(&cert_out, &key_out, &names),
        };
    }

    let args = cli.server_args;
    init_logging(&args.log_level)?;

    run(args).await
}

async fn run(args: ServerArgs) -> Result<()> {
    let admin_secret = args
        .admin_secret
        .clone()
        .filter(|s| !s.is_empty())
        .context("An admin secret is required (--admin-secret or BROKER_ADMIN_SECRET)")?;

    info!("Starting tunnel broker");
    info!("Data directory: {}", args.data_dir.display());

    let store = args.open_store()?;
    let registry = Arc::new(UserRegistry::new());

    let report = load_registry(&registry, store.as_ref());
    if report.skipped() > 0 {
        warn!(
            loaded = report.loaded,
            corrupt = report.corrupt,
            unreadable = report.unreadable,
            conflicts = report.conflicts,
            "Some account records were skipped at startup"
        );
    }

    let admission = args.admission_config();
    let reset_interval = admission.reset_interval;
    info!(
        quota_bytes = admission.quota_limit,
        reset_interval_secs = reset_interval.as_secs(),
        "Admission control configured"
    );

    let controller = Arc::new(AdmissionController::new(registry, store, admission));
    let reset_handle = spawn_period_reset(controller.clone(), reset_interval);

    let tls = if args.admin_tls {
        let config = load_server_config(args.tls_cert.as_deref(), args.tls_key.as_deref())
            .context("Failed to load admin TLS configuration")?;
        Some(Arc::new(config))
    } else {
        None
    };

    let server = AdminServer::new(
        AdminServerConfig {
            bind_addr: args.admin_addr,
            admin_secret,
            store_timeout: Duration::from_millis(args.store_timeout_ms),
            static_dir: args.static_dir.clone(),
            tls,
        },
        controller,
    );

    let admin_handle = tokio::spawn(async move {
        if let Err(e) = server.start().await {
            error!("Admin server error: {}", e);
        }
    });

    info!("Tunnel broker is running");
    info!("  - Admin API: {}", args.admin_addr);
    if let Some(dir) = &args.static_dir {
        info!("  - Static files: {}", dir.display());
    }
    info!("Press Ctrl+C to stop");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, stopping...");
        }
        Err(err) => {
            error!("Error listening for shutdown signal: {}", err);
        }
    }

    admin_handle.abort();
    reset_handle.abort();
    info!("Tunnel broker stopped");

    Ok(())
}

fn generate_cert(cert_out: &Path, key_out: &Path, names: &[String]) -> Result<()> {
    let names: Vec<&str> = if names.is_empty() {
        DEFAULT_NAMES.to_vec()
    } else {
        names.iter().map(String::as_str).collect()
    };

    let identity = generate_self_signed(&names).context("Failed to generate certificate")?;
    identity
        .save_to_files(cert_out, key_out)
        .context("Failed to write certificate files")?;

    println!();
    println!("Generated self-signed certificate for: {}", names.join(", "));
    println!("  Certificate: {}", cert_out.display());
    println!("  Private key: {}", key_out.display());
    println!();
    println!("Start the broker with:");
    println!(
        "  tunnel-broker --admin-tls --tls-cert {} --tls-key {}",
        cert_out.display(),
        key_out.display()
    );

    Ok(())
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
