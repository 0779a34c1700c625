//! # Controller
//!
//! Runtime plumbing shared by every watched kind.
//!
//! - `backoff`: Fibonacci error back-off per resource
//! - `reconciler`: kube-runtime entry point, finalizer and status persistence
//! - `server`: HTTP server for metrics and probes

pub mod backoff;
pub mod reconciler;
pub mod server;
