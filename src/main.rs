//! Vault Deployer
//!
//! Builds the declarative configuration tree and applies it to Vault.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vault_deployer::{
    Deployer, VaultClient,
    auth::create_auth_provider,
    config::{LogFormat, load_config, require_token, validate_config},
    identity::HttpDirectory,
    util::SecretString,
};

/// Vault Deployer - declarative configuration for HashiCorp Vault
#[derive(Parser, Debug)]
#[command(name = "vault-deployer")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "VAULT_DEPLOYER_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VAULT_DEPLOYER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Vault address
    #[arg(long)]
    addr: Option<String>,

    /// Vault token
    #[arg(short, long)]
    token: Option<String>,

    /// Directory environment
    #[arg(short, long)]
    env: Option<String>,

    /// Skip the build phase and deploy the existing build directory
    #[arg(long)]
    no_build: bool,

    /// Build only, do not talk to Vault
    #[arg(long)]
    no_deploy: bool,

    /// Never delete remote configuration
    #[arg(long)]
    no_cleanup: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;

    if let Some(addr) = args.addr {
        config.vault.addr = addr;
    }
    if let Some(token) = args.token {
        config.vault.token = Some(SecretString::new(token));
    }
    if let Some(env) = args.env {
        config.directory.env = env;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    validate_config(&config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Vault deployer");

    let cleanup = config.deploy.cleanup && !args.no_cleanup;
    let deployer = Deployer::new(config);

    if !args.no_build {
        deployer
            .build()
            .inspect_err(|e| error!(error = %e, "Build failed"))?;
    }

    if args.no_deploy {
        info!("Deploy disabled, stopping after build");
        return Ok(());
    }

    let config = deployer.config();
    require_token(config)?;

    let auth = create_auth_provider(&config.vault)
        .inspect_err(|e| error!(error = %e, "Failed to create auth provider"))?;
    info!(addr = %config.vault.addr, auth = auth.auth_type(), "Connecting to Vault");
    let client = VaultClient::new(&config.vault, auth)
        .inspect_err(|e| error!(error = %e, "Failed to create Vault client"))?;
    client
        .ensure_ready()
        .await
        .inspect_err(|e| error!(error = %e, "Vault is not usable"))?;

    let directory = HttpDirectory::new(&config.directory, &config.identity.service_prefix)
        .inspect_err(|e| error!(error = %e, "Failed to create directory client"))?;

    deployer
        .deploy(&client, &directory, cleanup)
        .await
        .inspect_err(|e| error!(error = %e, "Deployment failed"))?;

    Ok(())
}
