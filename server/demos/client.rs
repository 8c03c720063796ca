//! Minimal command-line client showing the trust-on-first-use flow.
//!
//! Fetches (or reuses) the server's root certificate over the bootstrap port,
//! then talks HTTPS validated against that root: register, login, post one
//! message, list who is online and log out.
//!
//! ```text
//! cargo run --example client -- --username alice --password secret --message hi
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chatroom_server::bootstrap::CaCache;
use clap::Parser;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "chatroom-client", about = "Chatroom demo client")]
struct Args {
    /// Server address (host:port) for HTTPS
    #[arg(long, default_value = "localhost:8421")]
    server: String,

    /// Bootstrap address (defaults to the server port + 1)
    #[arg(long)]
    bootstrap: Option<String>,

    /// Name the server certificate was issued for (defaults to the server host)
    #[arg(long)]
    domain: Option<String>,

    /// Directory holding fetched root certificates
    #[arg(long, default_value = "./ca-cache")]
    cache_dir: PathBuf,

    #[arg(long)]
    username: String,

    #[arg(long)]
    password: String,

    #[arg(long)]
    server_password: Option<String>,

    /// Message to post after logging in
    #[arg(long, default_value = "hello world")]
    message: String,
}

const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chatroom_server=info,client=info")),
        )
        .init();

    let args = Args::parse();

    let server_addr: SocketAddr = tokio::net::lookup_host(&args.server)
        .await?
        .next()
        .ok_or("server address did not resolve")?;
    let host = args
        .server
        .rsplit_once(':')
        .map(|(host, _)| host)
        .unwrap_or(&args.server);
    let domain = args.domain.clone().unwrap_or_else(|| host.to_string());
    let bootstrap = args
        .bootstrap
        .clone()
        .unwrap_or_else(|| format!("{host}:{}", server_addr.port() + 1));

    let ca_pem = CaCache::new(&args.cache_dir)
        .load_or_fetch(&bootstrap, BOOTSTRAP_TIMEOUT)
        .await?;
    tracing::info!(bootstrap = %bootstrap, "Root certificate ready");

    let client = reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(&ca_pem)?)
        .resolve(&domain, server_addr)
        .timeout(Duration::from_secs(10))
        .build()?;
    let base = format!("https://{domain}:{}", server_addr.port());

    let register = client
        .post(format!("{base}/api/register"))
        .json(&json!({ "username": args.username, "password": args.password }))
        .send()
        .await?;
    match register.status() {
        StatusCode::CREATED => tracing::info!(username = %args.username, "Registered"),
        StatusCode::CONFLICT => tracing::info!(username = %args.username, "Already registered"),
        status => return Err(format!("register failed: {status} {}", register.text().await?).into()),
    }

    let login = client
        .post(format!("{base}/api/login"))
        .json(&json!({
            "username": args.username,
            "password": args.password,
            "server_password": args.server_password,
        }))
        .send()
        .await?;
    if !login.status().is_success() {
        let status = login.status();
        return Err(format!("login failed: {status} {}", login.text().await?).into());
    }
    let body: Value = login.json().await?;
    let token = body["token"]
        .as_str()
        .ok_or("login response carried no token")?
        .to_string();

    client
        .post(format!("{base}/api/messages"))
        .bearer_auth(&token)
        .json(&json!({ "text": args.message }))
        .send()
        .await?
        .error_for_status()?;

    let users: Value = client
        .get(format!("{base}/api/users"))
        .bearer_auth(&token)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    println!("online: {}", users["users"]);

    client
        .post(format!("{base}/api/logout"))
        .bearer_auth(&token)
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}
