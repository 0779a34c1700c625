//! Object predicates for [`super::Manifest::filter`].

use serde_json::Value;

/// Boxed predicate over a raw object
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync>;

#[must_use]
pub fn by_kind(kind: &str) -> Predicate {
    let kind = kind.to_string();
    Box::new(move |r| super::kind(r) == kind)
}

#[must_use]
pub fn by_name(name: &str) -> Predicate {
    let name = name.to_string();
    Box::new(move |r| super::name(r) == name)
}

#[must_use]
pub fn not(predicate: Predicate) -> Predicate {
    Box::new(move |r| !predicate(r))
}

/// Every predicate must match
#[must_use]
pub fn all(predicates: Vec<Predicate>) -> Predicate {
    Box::new(move |r| predicates.iter().all(|p| p(r)))
}

/// At least one predicate must match
#[must_use]
pub fn any(predicates: Vec<Predicate>) -> Predicate {
    Box::new(move |r| predicates.iter().any(|p| p(r)))
}

#[must_use]
pub fn crds() -> Predicate {
    by_kind("CustomResourceDefinition")
}

/// Objects that live in a namespace; cluster-scoped kinds are listed explicitly
#[must_use]
pub fn is_namespaced(resource: &Value) -> bool {
    !matches!(
        super::kind(resource),
        "Namespace"
            | "CustomResourceDefinition"
            | "ClusterRole"
            | "ClusterRoleBinding"
            | "ValidatingWebhookConfiguration"
            | "MutatingWebhookConfiguration"
            | "APIService"
            | "PriorityClass"
            | "StorageClass"
            | "SecurityContextConstraints"
            | "ConsoleCLIDownload"
            | "ConsoleQuickStart"
            | "ConsoleYAMLSample"
            | "ClusterTask"
            | "ClusterTriggerBinding"
            | "ClusterInterceptor"
            | "TektonInstallerSet"
    )
}
