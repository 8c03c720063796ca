use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use chatroom_server::bootstrap::BootstrapServer;
use chatroom_server::cert::{tls::server_tls_config, TrustMaterial};
use chatroom_server::config::{generate_config_template, Cli, Config};
use chatroom_server::registry::{JsonUserStore, SessionRegistry};
use chatroom_server::{routes, state};

/// Grace period for in-flight requests on Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chatroom_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Chatroom server v{} starting", env!("CARGO_PKG_VERSION"));

    // Root and server certificates; RSA-4096 generation can take a while.
    let cert_dir = config.cert_dir();
    let domain = config.domain.clone();
    let trust =
        tokio::task::spawn_blocking(move || TrustMaterial::load_or_create(&cert_dir, &domain))
            .await?
            .inspect_err(|e| tracing::error!(error = %e, "Certificate setup failed"))?;
    let tls_config = server_tls_config(&trust.leaf)?;

    // User table
    let store = Arc::new(JsonUserStore::new(config.users_path()));
    let registry = SessionRegistry::load(config.registry_settings(), store)
        .inspect_err(|e| tracing::error!(error = %e, "Failed to load user table"))?;
    let registry = Arc::new(registry);

    for admin in &config.admins {
        if registry.lookup_by_username(admin).is_some() {
            registry.set_admin(admin, true)?;
        }
    }

    let app_state = state::AppState::new(
        registry,
        config.admins.iter().cloned(),
        config.subscriber_buffer,
    );

    // CA bootstrap listener (plain TCP, unauthenticated)
    let bootstrap_addr = format!("{}:{}", config.bind_address, config.bootstrap_port());
    let bootstrap_listener = TcpListener::bind(&bootstrap_addr).await?;
    tracing::info!("CA bootstrap listening on {}", bootstrap_addr);
    let bootstrap = BootstrapServer::new(trust.root.cert_pem.clone()).spawn(bootstrap_listener);

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve over TLS
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port).parse()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    tracing::info!(domain = %config.domain, "Listening on https://{}", addr);
    axum_server::bind_openssl(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    bootstrap.abort();
    tracing::info!("Chatroom server stopped");
    Ok(())
}
