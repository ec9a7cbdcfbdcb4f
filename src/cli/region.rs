//! Region registration commands

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use super::output::print_json;
use crate::domain::RegionEndpoint;
use crate::storage::SqlxRegionRepository;

#[derive(Subcommand)]
pub enum RegionCommands {
    /// Register a region controller or replace its connection details
    Add {
        /// Region name used by every other command
        name: String,

        /// Base URL of the region API, e.g. https://region-a:8443
        url: String,

        /// Value sent in the Authorization header
        #[arg(long)]
        token: Option<String>,

        /// Skip server certificate verification
        #[arg(long)]
        insecure: bool,

        /// CA bundle (PEM text or file path)
        #[arg(long)]
        ca_cert: Option<String>,

        /// Client certificate for mTLS (PEM text or file path)
        #[arg(long)]
        client_cert: Option<String>,

        /// Client private key for mTLS (PEM text or file path)
        #[arg(long)]
        client_key: Option<String>,

        /// Wildcard domain default HTTP rules are created under
        #[arg(long)]
        http_domain: Option<String>,

        /// Address TCP rules are exposed on
        #[arg(long)]
        tcp_domain: Option<String>,
    },

    /// List registered regions
    List,
}

#[derive(Serialize)]
struct RegionSummary {
    region_name: String,
    base_url: String,
    verify_tls: bool,
    mtls: bool,
    token_configured: bool,
    http_domain: Option<String>,
    tcp_domain: Option<String>,
}

impl From<RegionEndpoint> for RegionSummary {
    fn from(endpoint: RegionEndpoint) -> Self {
        Self {
            mtls: endpoint.has_client_identity(),
            token_configured: !endpoint.bearer_token.is_empty(),
            region_name: endpoint.region_name,
            base_url: endpoint.base_url,
            verify_tls: endpoint.verify_tls,
            http_domain: endpoint.http_domain,
            tcp_domain: endpoint.tcp_domain,
        }
    }
}

pub async fn handle_region_command(command: RegionCommands, regions: &SqlxRegionRepository) -> Result<()> {
    match command {
        RegionCommands::Add {
            name,
            url,
            token,
            insecure,
            ca_cert,
            client_cert,
            client_key,
            http_domain,
            tcp_domain,
        } => {
            url::Url::parse(&url).map_err(|e| anyhow::anyhow!("Invalid region URL '{}': {}", url, e))?;

            let mut endpoint = RegionEndpoint::new(name, url).with_token(token.unwrap_or_default());
            endpoint.verify_tls = !insecure;
            endpoint.ca_cert = ca_cert;
            endpoint.client_cert = client_cert;
            endpoint.client_key = client_key;
            endpoint.http_domain = http_domain;
            endpoint.tcp_domain = tcp_domain;

            regions.upsert(&endpoint).await?;
            print_json(&RegionSummary::from(endpoint))
        }
        RegionCommands::List => {
            let summaries: Vec<RegionSummary> =
                regions.list().await?.into_iter().map(RegionSummary::from).collect();
            print_json(&summaries)
        }
    }
}
