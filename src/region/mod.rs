//! # Region Control-Plane Client
//!
//! Pooled, TLS-configurable HTTP access to region controllers:
//!
//! - [`pool`]: one client per TLS identity, evicted after TLS or retry exhaustion
//! - [`executor`]: timeouts, flat retries and error classification
//! - [`client`]: region-name addressed calls resolved through the registry
//! - [`gateway_api`]: the gateway endpoints the rule engine drives
//! - [`proxy`]: transparent request forwarding

pub mod client;
pub mod executor;
pub mod gateway_api;
pub mod pool;
pub mod proxy;
pub mod response;
pub mod retry;

pub use client::{RegionClient, PROBE_PATH};
pub use executor::{RequestExecutor, RequestOptions};
pub use gateway_api::{
    CertificateBody, GatewayApi, HttpRuleBody, HttpRuleDeleteBody, RuleConfigBody, TcpRuleBody,
    TcpRuleDeleteBody,
};
pub use pool::{identity_key, ConnectionHandle, ConnectionPoolManager};
pub use proxy::{ProxyRequest, ReverseProxyForwarder};
pub use response::RegionResponse;
pub use retry::{FlatRetry, RetryPolicy};
