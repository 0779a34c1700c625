//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use tekton_installer_operator::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Reconcilers
pub use crate::component::{ComponentContext, ComponentError, TektonComponent};
pub use crate::controller::reconciler::{reconcile, Driver, Reconciler, ReconcilerError};
pub use crate::tektonconfig::{ConfigContext, ConfigError};

// Seams to the cluster
pub use crate::extension::{Extension, NoopExtension};
pub use crate::store::{ClusterApi, ObjectStore, StoreError};

pub use crate::config::{OperatorConfig, Platform};
pub use crate::outcome::ReconcileOutcome;
