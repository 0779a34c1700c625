//! # CRD Generator
//!
//! Prints the CustomResourceDefinition YAML of every kind the operator
//! serves, or of a single kind.
//!
//! ```bash
//! cargo run --bin crdgen > config/crds.yaml
//! cargo run --bin crdgen -- --kind tektonconfig | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tekton_installer_operator::crd;

#[derive(Parser)]
#[command(name = "crdgen", about = "Print operator.tekton.dev CRDs as YAML", long_about = None)]
struct Cli {
    /// Only print the CRD whose kind or plural matches (case-insensitive)
    #[arg(short, long, value_name = "KIND")]
    kind: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let crds: Vec<_> = crd::all()
        .into_iter()
        .filter(|c| {
            cli.kind.as_deref().is_none_or(|k| {
                c.spec.names.kind.eq_ignore_ascii_case(k) || c.spec.names.plural.eq_ignore_ascii_case(k)
            })
        })
        .collect();
    if crds.is_empty() {
        anyhow::bail!("no CRD matches kind {:?}", cli.kind.unwrap_or_default());
    }
    for crd in crds {
        let yaml = serde_yaml::to_string(&crd).context("Failed to serialize CRD")?;
        println!("---\n{yaml}");
    }
    Ok(())
}
