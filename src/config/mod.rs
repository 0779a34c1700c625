//! # Configuration
//!
//! Operator configuration loaded from environment variables.
//!
//! - `operator`: version, platform, payload location, requeue and backoff timings

pub mod operator;

pub use operator::{OperatorConfig, Platform, ProxySettings};
