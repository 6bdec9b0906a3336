use anyhow::{anyhow, Context, Result};
use serde_yaml::Value;
use setval_yaml::{
    lookup_create, lookup_matches, node_kind, overwrite_scalar, parse_segments, scalar_text, smarter_path_split, untag,
    NodeKind, Segment, TreeError, WILDCARD,
};

use crate::{FieldOptions, TargetSelector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Updated,
    Created,
}

/// Fields written for one field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWrite {
    pub field_path: String,
    pub operation: Operation,
    pub count: usize,
}

#[derive(Debug)]
pub struct FieldError {
    pub field_path: String,
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
pub struct CopyOutcome {
    pub writes: Vec<FieldWrite>,
    pub errors: Vec<FieldError>,
}

impl CopyOutcome {
    fn fail(&mut self, field_path: &str, error: anyhow::Error) {
        self.errors.push(FieldError { field_path: field_path.to_string(), error });
    }

    fn wrote(&mut self, field_path: &str, operation: Operation, count: usize) {
        self.writes.push(FieldWrite { field_path: field_path.to_string(), operation, count });
    }

    pub fn fields_written(&self) -> usize { self.writes.iter().map(|w| w.count).sum() }
}

/// Whether a missing field path should be created instead of treated as "not found".
///
/// Creation has to land on exactly one node, so it cannot be combined with `*`.
pub fn should_create_field<S: AsRef<str>>(options: Option<&FieldOptions>, field_path: &[S]) -> Result<bool, TreeError> {
    if !options.map_or(false, |o| o.create) {
        return Ok(false);
    }
    if field_path.iter().any(|f| f.as_ref() == WILDCARD) {
        return Err(TreeError::MultiValueCreate);
    }
    Ok(true)
}

/// Copy `value` into `target_field`.
///
/// The value is cloned first, so the caller's node is never shared. With a delimiter,
/// the target's text is split, the value is inserted at `options.index` (negative
/// prepends, past-the-end appends, otherwise replaces) and the pieces are rejoined;
/// this is not idempotent. Scalar targets keep their type and only take the new text;
/// anything else is replaced wholesale.
pub fn set_field_value(options: Option<&FieldOptions>, target_field: &mut Value, value: &Value) -> Result<()> {
    let mut value = value.clone();
    if let Some(opts) = options.filter(|o| !o.delimiter.is_empty()) {
        let current = match node_kind(target_field) {
            NodeKind::Scalar => scalar_text(target_field).unwrap_or_default(),
            _ => return Err(anyhow!("delimiter option can only be used with scalar nodes")),
        };
        let inserted = scalar_text(&value).ok_or_else(|| anyhow!("delimiter option requires a scalar value"))?;
        let mut parts: Vec<String> = current.split(opts.delimiter.as_str()).map(str::to_string).collect();
        match usize::try_from(opts.index) {
            Err(_) => parts.insert(0, inserted),
            Ok(i) if i >= parts.len() => parts.push(inserted),
            Ok(i) => parts[i] = inserted,
        }
        overwrite_scalar(&mut value, parts.join(&opts.delimiter));
    }

    let keeps_type = node_kind(target_field) == NodeKind::Scalar
        && !untag(target_field).is_null()
        && node_kind(&value) == NodeKind::Scalar
        && !untag(&value).is_null();
    if keeps_type {
        overwrite_scalar(target_field, scalar_text(&value).unwrap_or_default());
    } else {
        *target_field = value;
    }
    Ok(())
}

fn prepare(options: Option<&FieldOptions>, field_path: &str) -> Result<(Vec<Segment>, bool)> {
    let parts = smarter_path_split(field_path, ".");
    let create = should_create_field(options, &parts)?;
    let segments = parse_segments(&parts).with_context(|| format!("invalid field path {:?}", field_path))?;
    Ok((segments, create))
}

/// Resolve every field path of `selector` inside `target` and copy `value` into each hit.
///
/// Errors are collected per field path (or per matched field) and never stop the
/// remaining paths from being processed.
pub fn copy_value_to_target(target: &mut Value, value: &Value, selector: &TargetSelector) -> CopyOutcome {
    let mut outcome = CopyOutcome::default();
    let options = selector.options.as_ref();
    for fp in &selector.field_paths {
        let (segments, create) = match prepare(options, fp) {
            Ok(p) => p,
            Err(e) => {
                outcome.fail(fp, e);
                continue;
            }
        };

        if create {
            let located = match lookup_create(target, node_kind(value), &segments) {
                Ok(l) => l,
                Err(e) => {
                    outcome.fail(fp, anyhow::Error::new(e).context("error creating node"));
                    continue;
                }
            };
            let operation = if located.created { Operation::Created } else { Operation::Updated };
            match set_field_value(options, located.node, value) {
                Ok(()) => outcome.wrote(fp, operation, 1),
                Err(e) => outcome.fail(fp, e),
            }
        } else {
            // may return several fields when the path holds wildcards
            let mut count = 0;
            for field in lookup_matches(target, &segments) {
                match set_field_value(options, field, value) {
                    Ok(()) => count += 1,
                    Err(e) => outcome.fail(fp, e),
                }
            }
            if count > 0 {
                outcome.wrote(fp, Operation::Updated, count);
            }
        }
    }
    outcome
}
