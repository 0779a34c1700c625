//! Tekton Installer Operator Library
//!
//! Installer-set reconciliation for Tekton components: the component
//! reconcilers, the umbrella `TektonConfig` reconciler, the manifest
//! pipeline and the kube-runtime plumbing that drives them.
//!
//! Unit tests live next to the code; cluster scenarios run against in-memory
//! stores under `tests/`.

pub mod component;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod dependency;
pub mod extension;
pub mod hash;
pub mod installerset;
pub mod labels;
pub mod manifest;
pub mod namespace;
pub mod observability;
pub mod outcome;
pub mod prelude;
pub mod retry;
pub mod runtime;
pub mod store;
pub mod tektonconfig;
