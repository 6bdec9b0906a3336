use anyhow::{anyhow, Result};
use setval_core::{
    parse_group_version, Gvk, KubeObject, ResId, ResIds, PREVIOUS_KINDS_ANNOTATION, PREVIOUS_NAMES_ANNOTATION,
    PREVIOUS_NAMESPACES_ANNOTATION,
};
use smallvec::smallvec;

/// All identities of a resource: the current one first, then those recorded by
/// earlier renames in the `previous*` annotations.
///
/// The current identity is always present. Malformed `previous*` annotations are
/// returned as the error half; only the previous identities are lost.
pub fn make_res_ids(obj: &KubeObject) -> (ResIds, Option<anyhow::Error>) {
    let (group, version) = parse_group_version(obj.api_version());
    let gvk = Gvk::new(group, version, obj.kind());
    let mut ids: ResIds = smallvec![ResId::new_with_namespace(gvk.clone(), obj.name(), obj.namespace())];
    match previous_res_ids(obj, &gvk) {
        Ok(prev) => {
            ids.extend(prev);
            (ids, None)
        }
        Err(e) => (ids, Some(e)),
    }
}

fn previous_res_ids(obj: &KubeObject, gvk: &Gvk) -> Result<Vec<ResId>> {
    let Some(names) = obj.annotation(PREVIOUS_NAMES_ANNOTATION) else {
        return Ok(Vec::new());
    };
    let names: Vec<&str> = names.split(',').collect();
    let namespaces: Vec<&str> = obj.annotation(PREVIOUS_NAMESPACES_ANNOTATION).unwrap_or("").split(',').collect();
    let kinds: Vec<&str> = obj.annotation(PREVIOUS_KINDS_ANNOTATION).unwrap_or("").split(',').collect();
    if names.len() != namespaces.len() || names.len() != kinds.len() {
        return Err(anyhow!(
            "number of previous names, number of previous namespaces, number of previous kinds not equal"
        ));
    }
    Ok(names
        .iter()
        .zip(&namespaces)
        .zip(&kinds)
        .map(|((name, ns), kind)| {
            let prev = Gvk { kind: kind.to_string(), ..gvk.clone() };
            ResId::new_with_namespace(prev, *name, *ns)
        })
        .collect())
}
