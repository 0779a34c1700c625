//! # Tekton Installer Operator
//!
//! Installs Tekton components into a cluster and keeps them reconciled.
//!
//! ## Overview
//!
//! 1. **Umbrella** - a single `TektonConfig` named `config` selects a profile
//!    and materialises one satellite CR per component
//! 2. **Components** - each satellite renders its payload manifests through
//!    the transformer pipeline into `TektonInstallerSet` bundles
//! 3. **Upgrades** - sets are replaced when the operator version, target
//!    namespace or spec changes, and torn down in order on deletion
//!
//! Metrics and probes are served on `METRICS_PORT`.

use anyhow::Result;
use tekton_installer_operator::runtime;

#[tokio::main]
async fn main() -> Result<()> {
    let init = runtime::initialize().await?;
    runtime::run(init).await
}
