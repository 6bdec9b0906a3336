//! Tree capabilities over `serde_yaml::Value`: field path splitting, path matching,
//! lookup-or-create and type-preserving scalar overwrite.
//!
//! Field paths follow the kustomize conventions:
//! - `spec.replicas` walks mapping keys; a numeric segment indexes a sequence
//! - `*` fans out over every value of a mapping or every element of a sequence
//! - `[name=app]` selects sequence elements whose `name` field is `app`
//! - `[=app]` selects scalar sequence elements equal to `app`
//! - `\.` escapes a literal dot inside a key

#![forbid(unsafe_code)]

use serde_yaml::{Mapping, Number, Value};
use tracing::trace;

pub const WILDCARD: &str = "*";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),
    #[error("cannot support create option in a multi-value target")]
    MultiValueCreate,
    #[error("cannot resolve {segment:?} in a {found} node")]
    WrongKind { segment: String, found: &'static str },
    #[error("index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Mapping,
    Sequence,
    Scalar,
}

pub fn node_kind(v: &Value) -> NodeKind {
    match untag(v) {
        Value::Mapping(_) => NodeKind::Mapping,
        Value::Sequence(_) => NodeKind::Sequence,
        _ => NodeKind::Scalar,
    }
}

/// Empty node of the given kind. Scalars start out as `null`.
pub fn empty_node(kind: NodeKind) -> Value {
    match kind {
        NodeKind::Mapping => Value::Mapping(Mapping::new()),
        NodeKind::Sequence => Value::Sequence(Vec::new()),
        NodeKind::Scalar => Value::Null,
    }
}

/// Look through `!tag` wrappers to the node they carry.
pub fn untag(v: &Value) -> &Value {
    match v {
        Value::Tagged(t) => untag(&t.value),
        other => other,
    }
}

pub fn untag_mut(v: &mut Value) -> &mut Value {
    match v {
        Value::Tagged(t) => untag_mut(&mut t.value),
        other => other,
    }
}

fn kind_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) | Value::Number(_) | Value::String(_) => "scalar",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

// ---- path splitting ----

/// Split on `delimiter`, gluing back pieces whose predecessor ends in `\`.
pub fn path_split(path: &str, delimiter: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for piece in path.split(delimiter) {
        match out.last_mut() {
            Some(last) if last.ends_with('\\') => {
                last.pop();
                last.push_str(delimiter);
                last.push_str(piece);
            }
            _ => out.push(piece.to_string()),
        }
    }
    out
}

/// Like [`path_split`], but a `[...]` segment is kept whole even if it contains the delimiter.
pub fn smarter_path_split(path: &str, delimiter: &str) -> Vec<String> {
    let split = path_split(path, delimiter);
    if !path.contains('[') || !path.contains(']') {
        return split;
    }
    let mut out = Vec::with_capacity(split.len());
    let mut pieces = split.into_iter();
    while let Some(elem) = pieces.next() {
        if elem.starts_with('[') && !elem.ends_with(']') {
            let mut bracketed = elem;
            for next in pieces.by_ref() {
                bracketed.push_str(delimiter);
                bracketed.push_str(&next);
                if next.ends_with(']') {
                    break;
                }
            }
            out.push(bracketed);
        } else {
            out.push(elem);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Mapping key, or sequence index when the name is numeric and the node is a sequence.
    Field(String),
    Wildcard,
    /// `[key=value]`; an empty key matches scalar elements.
    Match { key: String, value: String },
}

impl Segment {
    pub fn parse(raw: &str) -> Result<Self, TreeError> {
        if raw.is_empty() {
            return Err(TreeError::InvalidSegment(raw.to_string()));
        }
        if raw == WILDCARD {
            return Ok(Segment::Wildcard);
        }
        if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let (key, value) = inner.split_once('=').ok_or_else(|| TreeError::InvalidSegment(raw.to_string()))?;
            return Ok(Segment::Match { key: key.to_string(), value: value.to_string() });
        }
        Ok(Segment::Field(raw.to_string()))
    }
}

pub fn parse_segments<S: AsRef<str>>(parts: &[S]) -> Result<Vec<Segment>, TreeError> {
    parts.iter().map(|p| Segment::parse(p.as_ref())).collect()
}

// ---- lookup ----

/// Scalar text of a node; `None` for mappings and sequences. `null` reads as empty.
pub fn scalar_text(v: &Value) -> Option<String> {
    match untag(v) {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn element_matches(elem: &Value, key: &str, value: &str) -> bool {
    let found = if key.is_empty() { Some(elem) } else { untag(elem).get(key) };
    found.and_then(scalar_text).as_deref() == Some(value)
}

/// All existing nodes reached by `path`. Missing branches contribute nothing.
pub fn lookup_matches<'a>(root: &'a mut Value, path: &[Segment]) -> Vec<&'a mut Value> {
    let mut out = Vec::new();
    collect(root, path, &mut out);
    out
}

fn collect<'a>(node: &'a mut Value, path: &[Segment], out: &mut Vec<&'a mut Value>) {
    let Some((head, rest)) = path.split_first() else {
        out.push(node);
        return;
    };
    match (head, untag_mut(node)) {
        (Segment::Field(name), Value::Mapping(m)) => {
            if let Some(child) = m.get_mut(name.as_str()) {
                collect(child, rest, out);
            }
        }
        (Segment::Field(name), Value::Sequence(s)) => {
            if let Some(child) = name.parse::<usize>().ok().and_then(|i| s.get_mut(i)) {
                collect(child, rest, out);
            }
        }
        (Segment::Wildcard, Value::Mapping(m)) => {
            for child in m.values_mut() {
                collect(child, rest, out);
            }
        }
        (Segment::Wildcard, Value::Sequence(s)) => {
            for child in s.iter_mut() {
                collect(child, rest, out);
            }
        }
        (Segment::Match { key, value }, Value::Sequence(s)) => {
            for child in s.iter_mut().filter(|e| element_matches(e, key, value)) {
                collect(child, rest, out);
            }
        }
        _ => {}
    }
}

/// Node reached by [`lookup_create`] and whether any part of the path had to be created.
pub struct Located<'a> {
    pub node: &'a mut Value,
    pub created: bool,
}

/// Find the single node at `path`, creating missing pieces on the way.
///
/// Intermediate nodes become sequences before `[k=v]` segments and mappings otherwise;
/// a missing final node is created empty with `kind`. A `null` node on the way is
/// turned into the container the next segment needs.
pub fn lookup_create<'a>(root: &'a mut Value, kind: NodeKind, path: &[Segment]) -> Result<Located<'a>, TreeError> {
    let mut created = false;
    let node = create_at(root, kind, path, &mut created)?;
    Ok(Located { node, created })
}

fn container_for(seg: &Segment) -> NodeKind {
    match seg {
        Segment::Match { .. } => NodeKind::Sequence,
        _ => NodeKind::Mapping,
    }
}

/// Resolve `text` the way an untagged plain scalar would be: `80` is a number,
/// `true` a bool. Anything that does not resolve to a non-null scalar stays a string.
pub fn plain_scalar(text: &str) -> Value {
    match serde_yaml::from_str::<Value>(text) {
        Ok(v @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => v,
        _ => Value::String(text.to_string()),
    }
}

fn new_element(key: &str, value: &str) -> Value {
    if key.is_empty() {
        return plain_scalar(value);
    }
    let mut m = Mapping::new();
    m.insert(Value::String(key.to_string()), plain_scalar(value));
    Value::Mapping(m)
}

fn create_at<'a>(node: &'a mut Value, kind: NodeKind, path: &[Segment], created: &mut bool) -> Result<&'a mut Value, TreeError> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(node);
    };
    if *head == Segment::Wildcard {
        return Err(TreeError::MultiValueCreate);
    }
    let next_kind = rest.first().map(container_for).unwrap_or(kind);
    let node = untag_mut(node);
    if node.is_null() {
        *node = empty_node(container_for(head));
    }
    match (head, node) {
        (Segment::Field(name), Value::Mapping(m)) => {
            let key = Value::String(name.clone());
            if !m.contains_key(&key) {
                trace!(field = %name, "creating field");
                *created = true;
            }
            let child = m.entry(key).or_insert_with(|| empty_node(next_kind));
            create_at(child, kind, rest, created)
        }
        (Segment::Field(name), Value::Sequence(s)) => {
            let index = name
                .parse::<usize>()
                .map_err(|_| TreeError::WrongKind { segment: name.clone(), found: "sequence" })?;
            let len = s.len();
            let child = s.get_mut(index).ok_or(TreeError::IndexOutOfRange { index, len })?;
            create_at(child, kind, rest, created)
        }
        (Segment::Match { key, value }, Value::Sequence(s)) => {
            let idx = match s.iter().position(|e| element_matches(e, key, value)) {
                Some(i) => i,
                None => {
                    trace!(key = %key, value = %value, "appending sequence element");
                    s.push(new_element(key, value));
                    *created = true;
                    s.len() - 1
                }
            };
            create_at(&mut s[idx], kind, rest, created)
        }
        (seg, other) => {
            let segment = match seg {
                Segment::Field(name) => name.clone(),
                Segment::Match { key, value } => format!("[{}={}]", key, value),
                Segment::Wildcard => WILDCARD.to_string(),
            };
            Err(TreeError::WrongKind { segment, found: kind_name(other) })
        }
    }
}

// ---- scalar overwrite ----

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Some(Number::from(u));
    }
    match text.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Number::from(f)),
        _ => None,
    }
}

/// Replace the text of a scalar while keeping its type where the text allows it:
/// numbers stay numbers and booleans stay booleans; anything else becomes a string.
/// Tags on the target are kept.
pub fn overwrite_scalar(target: &mut Value, text: String) {
    let slot = untag_mut(target);
    let next = match slot {
        Value::Number(_) => parse_number(&text).map(Value::Number).unwrap_or(Value::String(text)),
        Value::Bool(_) => match text.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(text),
        },
        _ => Value::String(text),
    };
    *slot = next;
}
