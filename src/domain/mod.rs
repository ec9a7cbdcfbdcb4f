//! # Domain Types
//!
//! Typed identifiers and the records exchanged between the gateway engine,
//! its repositories and the region controller.

pub mod certificate;
pub mod gateway;
pub mod id;
pub mod region;

pub use certificate::{Certificate, CertificateUpdate, FanoutFailure, FanoutReport, NewCertificate};
pub use gateway::{
    BindHttpRule, BindTcpRule, DeleteOutcome, Endpoint, HeaderSetting, HttpProtocol, HttpRule, Rewrite,
    RuleConfig, RuleExtension, RuleTarget, StreamProtocol, TcpRule, UpdateHttpRule, UpdateOutcome,
    UpdateTcpRule,
    DEFAULT_RULE_PATH, DEFAULT_RULE_WEIGHT,
};
pub use id::{CertificateId, ComponentId, EnvId, HttpRuleId, TcpRuleId};
pub use region::{ComponentRef, GatewayScope, RegionEndpoint};
