//! the `serve` subcommand - runs the http api.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use color_eyre::eyre::{Context, Result, bail};
use keygate_access::AccessOrchestrator;
use keygate_db::KeygateDb;
use keygate_shell::{GatewayCredentials, SshShell};
use keygate_types::{Config, DatabaseConfig};
use tokio::net::TcpListener;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::{AppState, create_app, ensure_jump_host};

/// default config file search paths (in order of priority).
const CONFIG_SEARCH_PATHS: &[&str] = &["/etc/keygate/config.toml", "./config.toml"];

/// run the keygate http api
#[derive(Args, Debug, Default)]
pub struct ServeCommand {
    /// path to config file (toml format)
    #[arg(short, long, env = "KEYGATE_CONFIG")]
    config: Option<PathBuf>,

    /// database url (sqlite:// or postgres://)
    #[arg(long, env = "KEYGATE_DATABASE_URL")]
    database_url: Option<String>,

    /// address to listen on
    #[arg(long, env = "KEYGATE_LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// gateway private key used for servers without a password
    #[arg(long = "private-key", env = "KEYGATE_PRIVATE_KEY")]
    private_key_path: Option<PathBuf>,

    /// known_hosts file used to verify server host keys
    #[arg(long = "known-hosts", env = "KEYGATE_KNOWN_HOSTS")]
    known_hosts_path: Option<PathBuf>,

    /// login used on servers that don't set their own
    #[arg(long, env = "KEYGATE_LOGIN")]
    login: Option<String>,

    /// timeout for opening a session and for each remote command
    #[arg(long, env = "KEYGATE_SESSION_TIMEOUT_SECS")]
    session_timeout_secs: Option<u64>,

    /// log level
    #[arg(long, env = "KEYGATE_LOG_LEVEL")]
    log_level: Option<String>,
}

impl ServeCommand {
    /// find and load config file, returning none if no config file is found.
    fn load_config_file(config_path: Option<&PathBuf>) -> Result<Option<Config>> {
        // an explicit path must exist
        if let Some(path) = config_path {
            return read_config(path).map(Some);
        }

        for path_str in CONFIG_SEARCH_PATHS {
            let path = Path::new(path_str);
            if path.exists() {
                debug!("Found config file at {:?}", path);
                return read_config(path).map(Some);
            }
        }

        Ok(None)
    }

    /// convert cli arguments into a config struct, merging with config file if present.
    ///
    /// priority order: defaults -> config file -> cli flags
    fn into_config(self) -> Result<Config> {
        let mut config = match Self::load_config_file(self.config.as_ref())? {
            Some(file_config) => {
                info!("Loaded configuration from file");
                file_config
            }
            None => {
                debug!("No config file found, using defaults");
                Config::default()
            }
        };

        if let Some(db_url) = self.database_url {
            config.database = parse_database_url(&db_url)?;
        }
        if let Some(listen_addr) = self.listen_addr {
            config.listen_addr = listen_addr;
        }
        if let Some(path) = self.private_key_path {
            config.gateway.private_key_path = Some(path);
        }
        if let Some(path) = self.known_hosts_path {
            config.gateway.known_hosts_path = Some(path);
        }
        if let Some(login) = self.login {
            config.gateway.login = login;
        }
        if let Some(secs) = self.session_timeout_secs {
            config.gateway.session_timeout_secs = secs;
        }

        if config.gateway.login.trim().is_empty() {
            bail!("gateway login must not be empty");
        }
        if config.gateway.session_timeout_secs == 0 {
            bail!("session timeout must be at least one second");
        }

        Ok(config)
    }

    /// run the serve command
    pub async fn run(self) -> Result<()> {
        let log_level = parse_log_level(self.log_level.as_deref().unwrap_or("info"));
        let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
        tracing::subscriber::set_global_default(subscriber)?;

        info!("Starting keygate...");

        let config = self.into_config()?;
        info!("Database: {}", config.database.connection_string);
        info!("Listen address: {}", config.listen_addr);
        info!("Gateway login: {}", config.gateway.login);

        // ensure parent directory exists for sqlite databases
        if config.database.db_type == "sqlite" {
            let db_path = Path::new(&config.database.connection_string);
            if let Some(parent) = db_path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                info!("Creating database directory: {:?}", parent);
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory: {:?}", parent)
                })?;
            }
        }

        let db = KeygateDb::new(&config)
            .await
            .context("failed to initialize database")?;
        info!("Running database migrations...");
        db.migrate()
            .await
            .context("failed to run database migrations")?;
        info!("Database initialized successfully");

        let credentials = match &config.gateway.private_key_path {
            Some(path) => {
                info!("Loading gateway key from {:?}", path);
                GatewayCredentials::load(path, config.gateway.private_key_passphrase.as_deref())
                    .context("failed to load gateway private key")?
            }
            None => {
                warn!("No gateway private key configured, only password servers are reachable");
                GatewayCredentials::none()
            }
        };
        if config.gateway.known_hosts_path.is_none() {
            warn!("No known_hosts file configured, server host keys are not verified");
        }

        let shell = SshShell::new(
            Arc::new(credentials),
            config.gateway.login.clone(),
            config.gateway.known_hosts_path.clone(),
        );
        let access = Arc::new(AccessOrchestrator::new(
            db.clone(),
            shell,
            config.gateway.session_timeout(),
        ));

        let jump_host = match &config.gateway.jump_host {
            Some(jump) => Some(
                ensure_jump_host(&db, jump)
                    .await
                    .context("failed to register jump host")?,
            ),
            None => None,
        };

        let addr: SocketAddr = config
            .listen_addr
            .parse()
            .context("invalid listen address")?;

        let app = create_app(AppState {
            db,
            access,
            config: Arc::new(config),
            jump_host,
        });

        info!("Starting HTTP server on {}", addr);
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("keygate stopped");
        Ok(())
    }
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("failed to parse config file: {:?}", path))
}

fn parse_log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// parse a database url into databaseconfig.
fn parse_database_url(db_url: &str) -> Result<DatabaseConfig> {
    let parsed =
        url::Url::parse(db_url).with_context(|| format!("invalid database URL: {}", db_url))?;
    match parsed.scheme() {
        "postgres" | "postgresql" => Ok(DatabaseConfig {
            db_type: "postgres".to_string(),
            connection_string: db_url.to_string(),
        }),
        "sqlite" => Ok(DatabaseConfig {
            db_type: "sqlite".to_string(),
            connection_string: parsed.path().to_string(),
        }),
        scheme => bail!(
            "unsupported database scheme '{}', expected 'sqlite' or 'postgres'",
            scheme
        ),
    }
}
