//! # Command Line Interface
//!
//! Ad-hoc access to region controllers: liveness probes, raw calls, gateway
//! port and address queries, region registration and the forwarding proxy.

pub mod output;
pub mod region;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::observability::{init_logging, log_config_info};
use crate::region::{proxy, GatewayApi, RegionClient, RequestOptions, ReverseProxyForwarder};
use crate::storage::{create_pool, SqlxRegionRepository};
use output::print_json;
use region::RegionCommands;

#[derive(Parser)]
#[command(name = "regionctl")]
#[command(about = "Region controller client and gateway tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the version a region controller reports
    Probe { region: String },

    /// Call any region endpoint and print the status and decoded body
    Call {
        region: String,

        /// HTTP method, e.g. GET or PUT
        method: String,

        /// Request path, e.g. /v2/nodes
        path: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,

        /// Read timeout in seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Retry budget for transport failures
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Addresses the region's gateway listens on
    GatewayIps { region: String },

    /// Ask a region for a free gateway port
    FreePort {
        region: String,

        /// Reserve the port
        #[arg(long)]
        lock: bool,
    },

    /// Serve /proxy/{region}/{path} and forward to region controllers
    Proxy {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8090")]
        listen: SocketAddr,
    },

    /// Region registration commands
    Region {
        #[command(subcommand)]
        command: RegionCommands,
    },
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    config.validate()?;

    init_logging(&config.observability)?;
    log_config_info(&config);

    let pool = create_pool(&config.database).await?;
    let regions = Arc::new(SqlxRegionRepository::new(pool));
    let client = RegionClient::new(regions.clone(), config.region.clone());

    match cli.command {
        Commands::Probe { region } => print_json(&client.probe(&region).await?)?,
        Commands::Call { region, method, path, body, timeout, retries } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .with_context(|| format!("Invalid HTTP method '{}'", method))?;
            let body = body
                .map(|b| serde_json::from_str::<Value>(&b))
                .transpose()
                .context("--body must be valid JSON")?;

            let mut options = RequestOptions::default();
            if let Some(seconds) = timeout {
                let timeout = Duration::try_from_secs_f64(seconds)
                    .with_context(|| format!("Invalid timeout '{}'", seconds))?;
                options = options.with_timeout(timeout);
            }
            if let Some(retries) = retries {
                options = options.with_retries(retries);
            }

            let response = client.call_with(&region, method, &path, body.as_ref(), options).await?;
            print_json(&json!({ "status": response.status.as_u16(), "body": response.body }))?
        }
        Commands::GatewayIps { region } => print_json(&client.gateway_ips(&region).await?)?,
        Commands::FreePort { region, lock } => {
            let port = client.free_port(&region, lock).await?;
            print_json(&json!({ "port": port }))?
        }
        Commands::Proxy { listen } => {
            let forwarder = Arc::new(ReverseProxyForwarder::new(client));
            proxy::serve(listen, forwarder).await?
        }
        Commands::Region { command } => region::handle_region_command(command, &regions).await?,
    }

    Ok(())
}
