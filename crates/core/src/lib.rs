//! set-value core types: resource identity, selectors and kpt-style diagnostics.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

mod object;

pub use object::{KubeObject, ObjectError, ResourceList};

pub const RESOURCE_LIST_API_VERSION: &str = "config.kubernetes.io/v1";
pub const RESOURCE_LIST_KIND: &str = "ResourceList";

/// Annotations written by the pipeline host to locate a resource in its source file.
pub const PATH_ANNOTATION: &str = "internal.config.kubernetes.io/path";
pub const INDEX_ANNOTATION: &str = "internal.config.kubernetes.io/index";
pub const LEGACY_PATH_ANNOTATION: &str = "config.kubernetes.io/path";
pub const LEGACY_INDEX_ANNOTATION: &str = "config.kubernetes.io/index";

/// Annotations recording identities a resource had before earlier pipeline steps renamed it.
pub const PREVIOUS_KINDS_ANNOTATION: &str = "internal.config.kubernetes.io/previousKinds";
pub const PREVIOUS_NAMES_ANNOTATION: &str = "internal.config.kubernetes.io/previousNames";
pub const PREVIOUS_NAMESPACES_ANNOTATION: &str = "internal.config.kubernetes.io/previousNamespaces";

const DEFAULT_NAMESPACE: &str = "default";

/// Group/Version/Kind of a resource. Empty strings mean "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gvk {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl Gvk {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { group: group.into(), version: version.into(), kind: kind.into() }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() { self.version.clone() } else { format!("{}/{}", self.group, self.version) }
    }
}

/// Split an `apiVersion` into `(group, version)`. `"v1"` has no group.
pub fn parse_group_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Canonical identity of one resource document within a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ResId {
    pub gvk: Gvk,
    pub name: String,
    pub namespace: String,
}

/// Identities of one document; the current one first, then any previous ones.
pub type ResIds = SmallVec<[ResId; 2]>;

impl ResId {
    pub fn new_with_namespace(gvk: Gvk, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self { gvk, name: name.into(), namespace: namespace.into() }
    }

    /// Namespaces compare equal when both are the default namespace, spelled either way.
    pub fn is_ns_equals(&self, namespace: &str) -> bool {
        let norm = |ns: &str| if ns.is_empty() { DEFAULT_NAMESPACE.to_string() } else { ns.to_string() };
        norm(&self.namespace) == norm(namespace)
    }

    pub fn is_selected_by(&self, sel: &Selector) -> bool {
        field_matches(&sel.group, &self.gvk.group)
            && field_matches(&sel.version, &self.gvk.version)
            && field_matches(&sel.kind, &self.gvk.kind)
            && field_matches(&sel.name, &self.name)
            && (is_any(&sel.namespace) || self.is_ns_equals(&sel.namespace))
    }
}

impl std::fmt::Display for ResId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ns = if self.namespace.is_empty() { "~X" } else { self.namespace.as_str() };
        let gv = self.gvk.api_version();
        let gv = if gv.is_empty() { "~V".to_string() } else { gv };
        write!(f, "{}.{}/{}.{}", self.gvk.kind, gv, self.name, ns)
    }
}

fn is_any(want: &str) -> bool { want.is_empty() || want == "*" }

fn field_matches(want: &str, got: &str) -> bool { is_any(want) || want == got }

/// Resource identity filter. Every empty or `"*"` field matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selector {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub group: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

// ---- diagnostics ----

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldRef {
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default)]
    pub index: usize,
}

/// One entry of `ResourceList.results`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ref: Option<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileRef>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self { message: message.into(), severity, resource_ref: None, field: None, file: None }
    }

    pub fn error(message: impl Into<String>) -> Self { Self::new(Severity::Error, message) }

    /// Result tied to an object (the functionConfig or a batch item). `None` leaves it unattached.
    pub fn for_object(severity: Severity, message: impl std::fmt::Display, obj: Option<&KubeObject>) -> Self {
        let mut d = Self::new(severity, message.to_string());
        if let Some(o) = obj {
            d.resource_ref = o.resource_ref();
            d.file = o.file_ref();
        }
        d
    }

    pub fn error_for_object(err: impl std::fmt::Display, obj: Option<&KubeObject>) -> Self {
        Self::for_object(Severity::Error, err, obj)
    }

    pub fn with_field(mut self, path: impl Into<String>) -> Self {
        self.field = Some(FieldRef { path: path.into() });
        self
    }

    pub fn is_error(&self) -> bool { self.severity == Severity::Error }
}

pub mod prelude {
    pub use super::{
        Diagnostic, FieldRef, FileRef, Gvk, KubeObject, ObjectError, ResId, ResIds, ResourceList, ResourceRef,
        Selector, Severity,
    };
}
