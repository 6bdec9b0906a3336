use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::{
    parse_group_version, Diagnostic, FileRef, ResourceRef, INDEX_ANNOTATION, LEGACY_INDEX_ANNOTATION,
    LEGACY_PATH_ANNOTATION, PATH_ANNOTATION, RESOURCE_LIST_API_VERSION, RESOURCE_LIST_KIND,
};

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("parsing YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("expected a mapping, found {0}")]
    NotAnObject(&'static str),
    #[error("expected kind {expected:?}, found {found:?}")]
    WrongListKind { expected: &'static str, found: String },
}

/// One KRM resource document: a YAML mapping with `apiVersion`, `kind` and `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct KubeObject(Value);

impl TryFrom<Value> for KubeObject {
    type Error = ObjectError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Mapping(_) => Ok(Self(v)),
            other => Err(ObjectError::NotAnObject(value_kind_name(&other))),
        }
    }
}

impl From<KubeObject> for Value {
    fn from(o: KubeObject) -> Self { o.0 }
}

pub(crate) fn value_kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

impl KubeObject {
    pub fn parse(yaml: &str) -> Result<Self, ObjectError> {
        let v: Value = serde_yaml::from_str(yaml)?;
        Self::try_from(v)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> { serde_yaml::to_string(&self.0) }

    pub fn as_value(&self) -> &Value { &self.0 }

    /// True for `{}`; such a functionConfig counts as missing.
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Mapping(m) => m.is_empty(),
            _ => true,
        }
    }

    fn str_at(&self, path: &[&str]) -> Option<&str> {
        let mut cur = &self.0;
        for key in path {
            cur = cur.get(*key)?;
        }
        cur.as_str()
    }

    pub fn api_version(&self) -> &str { self.str_at(&["apiVersion"]).unwrap_or("") }

    pub fn kind(&self) -> &str { self.str_at(&["kind"]).unwrap_or("") }

    pub fn name(&self) -> &str { self.str_at(&["metadata", "name"]).unwrap_or("") }

    pub fn namespace(&self) -> &str { self.str_at(&["metadata", "namespace"]).unwrap_or("") }

    pub fn annotation(&self, key: &str) -> Option<&str> { self.str_at(&["metadata", "annotations", key]) }

    pub fn is_gvk(&self, group: &str, version: &str, kind: &str) -> bool {
        let (g, v) = parse_group_version(self.api_version());
        g == group && v == version && self.kind() == kind
    }

    pub fn resource_ref(&self) -> Option<ResourceRef> {
        if self.kind().is_empty() && self.name().is_empty() {
            return None;
        }
        Some(ResourceRef {
            api_version: self.api_version().to_string(),
            kind: self.kind().to_string(),
            name: self.name().to_string(),
            namespace: self.namespace().to_string(),
        })
    }

    /// Source file location recorded by the pipeline host, if any.
    pub fn file_ref(&self) -> Option<FileRef> {
        let path = self.annotation(PATH_ANNOTATION).or_else(|| self.annotation(LEGACY_PATH_ANNOTATION));
        let index = self
            .annotation(INDEX_ANNOTATION)
            .or_else(|| self.annotation(LEGACY_INDEX_ANNOTATION))
            .and_then(|s| s.trim().parse::<usize>().ok());
        if path.is_none() && index.is_none() {
            return None;
        }
        Some(FileRef { path: path.unwrap_or("").to_string(), index: index.unwrap_or(0) })
    }
}

fn default_api_version() -> String { RESOURCE_LIST_API_VERSION.to_string() }

fn default_kind() -> String { RESOURCE_LIST_KIND.to_string() }

/// The KRM function wire object: input batch, function config and accumulated results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub items: Vec<KubeObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_config: Option<KubeObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<Diagnostic>,
}

impl ResourceList {
    pub fn new(items: Vec<KubeObject>, function_config: Option<KubeObject>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            items,
            function_config,
            results: Vec::new(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, ObjectError> {
        let rl: ResourceList = serde_yaml::from_str(input)?;
        if rl.kind != RESOURCE_LIST_KIND {
            return Err(ObjectError::WrongListKind { expected: RESOURCE_LIST_KIND, found: rl.kind });
        }
        Ok(rl)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> { serde_yaml::to_string(self) }

    pub fn has_errors(&self) -> bool { self.results.iter().any(Diagnostic::is_error) }
}
