//! set-value transformer: for each configured rule, select resources by identity and
//! copy the rule's value into their field paths.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use setval_core::{Diagnostic, FileRef, KubeObject, ResourceList, ResourceRef, Selector, Severity};
use tracing::{debug, info, warn};

mod copy;
mod resid;

pub use copy::{copy_value_to_target, set_field_value, should_create_field, CopyOutcome, FieldError, FieldWrite, Operation};
pub use resid::make_res_ids;

pub const FN_CONFIG_GROUP: &str = "fn.kpt.dev";
pub const FN_CONFIG_VERSION: &str = "v1alpha1";
pub const FN_CONFIG_KIND: &str = "SetValue";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FunctionConfig is missing. Expect `{}.{}.{}`", FN_CONFIG_KIND, FN_CONFIG_VERSION, FN_CONFIG_GROUP)]
    Missing,
    #[error(
        "unknown functionConfig Kind={kind} ApiVersion={api_version}, expect `{}.{}.{}`",
        FN_CONFIG_KIND, FN_CONFIG_VERSION, FN_CONFIG_GROUP
    )]
    UnknownKind { kind: String, api_version: String },
    #[error("invalid functionConfig: {0}")]
    Invalid(#[source] serde_yaml::Error),
    #[error("data is empty")]
    EmptyData,
    #[error("parsing data: {0}")]
    Data(#[source] serde_yaml::Error),
}

/// Per-field-path options of a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldOptions {
    /// Split the target scalar on this string and substitute one piece.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub delimiter: String,
    /// Piece to substitute; negative prepends, past-the-end appends.
    pub index: i64,
    /// Create the field path when it does not exist.
    pub create: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Selector>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reject: Vec<Selector>,
    pub field_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<FieldOptions>,
}

impl TargetSelector {
    fn rejects(&self, id: &setval_core::ResId) -> bool { self.reject.iter().any(|r| id.is_selected_by(r)) }
}

/// One rule: a literal YAML value and where to put it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetValueSpec {
    pub data: String,
    pub targets: Vec<TargetSelector>,
}

/// The `SetValue.v1alpha1.fn.kpt.dev` function config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetValue {
    pub spec: Vec<SetValueSpec>,
}

/// A field path written on one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub resource: Option<ResourceRef>,
    pub file: Option<FileRef>,
    pub field_path: String,
    pub operation: Operation,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TransformReport {
    pub mutations: Vec<Mutation>,
}

impl TransformReport {
    /// Number of individual fields written across all resources.
    pub fn fields_set(&self) -> usize { self.mutations.iter().map(|m| m.count).sum() }
}

/// Function entry point: read the config from `rl.function_config`, then transform.
/// Config problems become diagnostics; the run itself never fails.
pub fn run(rl: &mut ResourceList) -> TransformReport {
    let sv = match SetValue::from_function_config(rl.function_config.as_ref()) {
        Ok(sv) => sv,
        Err(e) => {
            warn!(error = %e, "functionConfig rejected");
            rl.results.push(Diagnostic::error_for_object(&e, rl.function_config.as_ref()));
            SetValue::default()
        }
    };
    sv.transform(rl)
}

fn parse_data(data: &str) -> Result<Value, ConfigError> {
    if data.trim().is_empty() {
        return Err(ConfigError::EmptyData);
    }
    serde_yaml::from_str(data).map_err(ConfigError::Data)
}

/// Re-read a resource from its serialized text so edits never go through a shared tree.
fn reparse(obj: &KubeObject) -> Result<Value> {
    let text = obj.to_yaml().context("serializing resource")?;
    serde_yaml::from_str(&text).context("parsing resource")
}

fn rebuild(node: &Value) -> Result<KubeObject> {
    let text = serde_yaml::to_string(node).context("serializing mutated resource")?;
    Ok(KubeObject::parse(&text)?)
}

impl SetValue {
    pub fn from_function_config(fc: Option<&KubeObject>) -> Result<Self, ConfigError> {
        match fc {
            None => Err(ConfigError::Missing),
            Some(o) if o.is_empty() => Err(ConfigError::Missing),
            Some(o) if o.is_gvk(FN_CONFIG_GROUP, FN_CONFIG_VERSION, FN_CONFIG_KIND) => {
                serde_yaml::from_value(o.as_value().clone()).map_err(ConfigError::Invalid)
            }
            Some(o) => Err(ConfigError::UnknownKind {
                kind: o.kind().to_string(),
                api_version: o.api_version().to_string(),
            }),
        }
    }

    /// Apply every rule to `rl.items` in order, appending diagnostics to `rl.results`.
    pub fn transform(&self, rl: &mut ResourceList) -> TransformReport {
        let mut report = TransformReport::default();
        if !self.spec.is_empty() {
            warn_bad_previous_ids(rl);
        }
        for (ri, rule) in self.spec.iter().enumerate() {
            let value = match parse_data(&rule.data) {
                Ok(v) => v,
                Err(e) => {
                    warn!(rule = ri, error = %e, "skipping rule");
                    let msg = format!("spec[{}]: {}", ri, e);
                    rl.results.push(Diagnostic::error_for_object(msg, rl.function_config.as_ref()));
                    continue;
                }
            };
            for (ti, target) in rule.targets.iter().enumerate() {
                let Some(select) = target.select.as_ref() else {
                    let msg = format!("spec[{}].targets[{}]: target must specify resources to select", ri, ti);
                    rl.results.push(Diagnostic::error_for_object(msg, rl.function_config.as_ref()));
                    continue;
                };
                if target.field_paths.is_empty() {
                    let msg = format!("spec[{}].targets[{}]: target must specify at least one field path", ri, ti);
                    rl.results.push(Diagnostic::error_for_object(msg, rl.function_config.as_ref()));
                    continue;
                }
                for i in 0..rl.items.len() {
                    if let Some(updated) = apply_target(&rl.items[i], &value, select, target, &mut report, &mut rl.results) {
                        rl.items[i] = updated;
                    }
                }
            }
        }
        report
    }
}

/// Report malformed `previous*` annotations once per resource; such resources are
/// still matched by their current identity.
fn warn_bad_previous_ids(rl: &mut ResourceList) {
    for obj in &rl.items {
        if let (_, Some(e)) = make_res_ids(obj) {
            let msg = format!("{:#}", e);
            warn!(kind = obj.kind(), name = obj.name(), error = %msg, "ignoring previous identities");
            rl.results.push(Diagnostic::for_object(Severity::Warning, msg, Some(obj)));
        }
    }
}

/// Run one target against one resource. Returns the replacement when the resource was selected.
fn apply_target(
    obj: &KubeObject,
    value: &Value,
    select: &Selector,
    target: &TargetSelector,
    report: &mut TransformReport,
    results: &mut Vec<Diagnostic>,
) -> Option<KubeObject> {
    let (ids, _) = make_res_ids(obj);
    // first selected identity wins; the rest are not consulted
    let id = ids.iter().find(|id| id.is_selected_by(select) && !target.rejects(id))?;
    debug!(resource = %id, "resource selected");

    let mut node = match reparse(obj) {
        Ok(n) => n,
        Err(e) => {
            results.push(Diagnostic::error_for_object(format!("{:#}", e), Some(obj)));
            return None;
        }
    };
    let outcome = copy_value_to_target(&mut node, value, target);
    for FieldError { field_path, error } in outcome.errors {
        let msg = format!("{:#}", error);
        warn!(resource = %id, field = %field_path, error = %msg, "field not set");
        results.push(Diagnostic::error_for_object(msg, Some(obj)).with_field(field_path));
    }
    for w in outcome.writes {
        info!(resource = %id, field = %w.field_path, count = w.count, op = ?w.operation, "field value set");
        report.mutations.push(Mutation {
            resource: obj.resource_ref(),
            file: obj.file_ref(),
            field_path: w.field_path,
            operation: w.operation,
            count: w.count,
        });
    }

    match rebuild(&node) {
        Ok(updated) => Some(updated),
        Err(e) => {
            results.push(Diagnostic::error_for_object(format!("{:#}", e), Some(obj)));
            None
        }
    }
}
