//! Region client and gateway sync tests against mock region controllers.
//!
//! - `transport`: connection pooling, TLS material loading and eviction
//! - `gateway`: rule and certificate sync through the real client and store
//! - `proxy`: reverse proxy relay through the HTTP router

mod common;

mod region {
    pub mod gateway;
    pub mod proxy;
    pub mod transport;
}
