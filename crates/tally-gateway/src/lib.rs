//! Remote boundary for Tally.
//!
//! HTTP implementation of the session gateway against the billing/session
//! backend. The countdown controller only depends on the `SessionGateway`
//! trait from the core crate; this crate supplies the production wiring.

pub mod http;

pub use http::HttpSessionGateway;
