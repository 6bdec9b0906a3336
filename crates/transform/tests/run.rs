#![forbid(unsafe_code)]

use serde_yaml::Value;
use setval_core::prelude::*;
use setval_transform::{run, Operation};

const DEPLOYMENT: &str = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  annotations:
    internal.config.kubernetes.io/path: app.yaml
    internal.config.kubernetes.io/index: '0'
spec:
  replicas: 1
  template:
    spec:
      containers:
      - name: app
        image: registry.local/app:1.0
      - name: proxy
        image: registry.local/proxy:1.0
";

const SERVICE: &str = "apiVersion: v1
kind: Service
metadata:
  name: app
spec:
  replicas: 1
  ports:
  - port: 80
";

fn obj(y: &str) -> KubeObject { KubeObject::parse(y).unwrap() }

fn config(spec: &str) -> KubeObject {
    obj(&format!("apiVersion: fn.kpt.dev/v1alpha1\nkind: SetValue\nmetadata:\n  name: set\nspec:\n{}", spec))
}

fn list(spec: &str) -> ResourceList { ResourceList::new(vec![obj(DEPLOYMENT), obj(SERVICE)], Some(config(spec))) }

fn at<'a>(o: &'a KubeObject, path: &[&str]) -> &'a Value {
    let mut cur = o.as_value();
    for p in path {
        cur = match p.parse::<usize>() {
            Ok(i) => &cur[i],
            Err(_) => &cur[*p],
        };
    }
    cur
}

#[test]
fn sets_replicas_only_on_selected_deployment() {
    let mut rl = list(
        "- data: '3'
  targets:
  - select: {kind: Deployment, name: app}
    fieldPaths: [spec.replicas]
",
    );
    let before_service = rl.items[1].clone();
    let report = run(&mut rl);

    assert!(rl.results.is_empty(), "{:?}", rl.results);
    assert_eq!(report.fields_set(), 1);
    assert_eq!(report.mutations[0].operation, Operation::Updated);
    assert_eq!(report.mutations[0].file.as_ref().unwrap().path, "app.yaml");
    assert_eq!(at(&rl.items[0], &["spec", "replicas"]), &Value::Number(3.into()));
    assert_eq!(rl.items[1], before_service);
}

#[test]
fn unselected_documents_serialize_identically() {
    let mut rl = list(
        "- data: x
  targets:
  - select: {kind: ConfigMap}
    fieldPaths: [data.key]
    options: {create: true}
",
    );
    let before: Vec<String> = rl.items.iter().map(|o| o.to_yaml().unwrap()).collect();
    let report = run(&mut rl);
    let after: Vec<String> = rl.items.iter().map(|o| o.to_yaml().unwrap()).collect();
    assert_eq!(report.fields_set(), 0);
    assert_eq!(before, after);
}

#[test]
fn wildcard_path_updates_every_container() {
    let mut rl = list(
        "- data: registry.local/base:2.0
  targets:
  - select: {group: apps, version: v1, kind: Deployment}
    fieldPaths: [spec.template.spec.containers.*.image]
",
    );
    let report = run(&mut rl);
    assert_eq!(report.fields_set(), 2);
    for i in 0..2 {
        let image = at(&rl.items[0], &["spec", "template", "spec", "containers", &i.to_string(), "image"]);
        assert_eq!(image, &Value::String("registry.local/base:2.0".into()));
    }
}

#[test]
fn create_with_wildcard_reports_field_and_file() {
    let mut rl = list(
        "- data: '2.0'
  targets:
  - select: {kind: Deployment}
    fieldPaths: [spec.template.spec.containers.*.tag]
    options: {create: true}
",
    );
    let before = rl.items[0].clone();
    let report = run(&mut rl);

    assert_eq!(report.fields_set(), 0);
    assert_eq!(rl.results.len(), 1);
    let d = &rl.results[0];
    assert_eq!(d.severity, Severity::Error);
    assert_eq!(d.message, "cannot support create option in a multi-value target");
    assert_eq!(d.field.as_ref().unwrap().path, "spec.template.spec.containers.*.tag");
    assert_eq!(d.resource_ref.as_ref().unwrap().kind, "Deployment");
    assert_eq!(d.file.as_ref().unwrap().path, "app.yaml");
    assert_eq!(rl.items[0], before);
}

#[test]
fn create_adds_missing_field() {
    let mut rl = list(
        "- data: '{tier: web}'
  targets:
  - select: {kind: Service}
    fieldPaths: [spec.selector]
    options: {create: true}
",
    );
    let report = run(&mut rl);
    assert_eq!(report.mutations.len(), 1);
    assert_eq!(report.mutations[0].operation, Operation::Created);
    assert_eq!(at(&rl.items[1], &["spec", "selector", "tier"]), &Value::String("web".into()));
}

#[test]
fn delimiter_substitutes_image_tag() {
    let mut rl = list(
        "- data: '2.1'
  targets:
  - select: {kind: Deployment}
    fieldPaths: ['spec.template.spec.containers.[name=app].image']
    options: {delimiter: ':', index: 1}
",
    );
    run(&mut rl);
    assert!(rl.results.is_empty(), "{:?}", rl.results);
    let image = at(&rl.items[0], &["spec", "template", "spec", "containers", "0", "image"]);
    assert_eq!(image, &Value::String("registry.local/app:2.1".into()));
}

#[test]
fn plain_overwrite_is_idempotent() {
    let spec = "- data: '5'
  targets:
  - select: {kind: Deployment}
    fieldPaths: [spec.replicas]
";
    let mut once = list(spec);
    run(&mut once);
    let mut twice = list(spec);
    run(&mut twice);
    run(&mut twice);
    assert_eq!(once.items, twice.items);
}

#[test]
fn wrong_config_kind_reports_once_and_changes_nothing() {
    let fc = obj("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\ndata:\n  a: b\n");
    let mut rl = ResourceList::new(vec![obj(DEPLOYMENT)], Some(fc));
    let before = rl.items.clone();
    let report = run(&mut rl);
    assert_eq!(report.fields_set(), 0);
    assert_eq!(rl.results.len(), 1);
    assert_eq!(rl.results[0].resource_ref.as_ref().unwrap().name, "cfg");
    assert_eq!(rl.items, before);
}

#[test]
fn bad_rules_and_targets_do_not_stop_the_rest() {
    let mut rl = list(
        "- data: 'a: [1'
  targets:
  - select: {kind: Deployment}
    fieldPaths: [spec.replicas]
- data: '7'
  targets:
  - fieldPaths: [spec.replicas]
  - select: {kind: Deployment}
  - select: {kind: Service}
    fieldPaths: [spec.replicas]
",
    );
    let report = run(&mut rl);
    let messages: Vec<&str> = rl.results.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages.len(), 3, "{:?}", messages);
    assert!(messages[0].starts_with("spec[0]: parsing data"), "{:?}", messages);
    assert_eq!(messages[1], "spec[1].targets[0]: target must specify resources to select");
    assert_eq!(messages[2], "spec[1].targets[1]: target must specify at least one field path");
    assert_eq!(report.fields_set(), 1);
    assert_eq!(at(&rl.items[1], &["spec", "replicas"]), &Value::Number(7.into()));
    assert_eq!(at(&rl.items[0], &["spec", "replicas"]), &Value::Number(1.into()));
}

#[test]
fn reject_excludes_selected_resource() {
    let mut rl = list(
        "- data: '9'
  targets:
  - select: {name: app}
    reject: [{kind: Service}]
    fieldPaths: [spec.replicas]
",
    );
    let report = run(&mut rl);
    assert_eq!(report.fields_set(), 1);
    assert_eq!(at(&rl.items[0], &["spec", "replicas"]), &Value::Number(9.into()));
    assert_eq!(at(&rl.items[1], &["spec", "replicas"]), &Value::Number(1.into()));
}

const RENAMED: &str = "apiVersion: v1
kind: ConfigMap
metadata:
  name: prod-settings
  annotations:
    internal.config.kubernetes.io/previousNames: settings
    internal.config.kubernetes.io/previousKinds: ConfigMap
    internal.config.kubernetes.io/previousNamespaces: default
data:
  flags: a
";

#[test]
fn previous_name_still_selects_renamed_resource() {
    let fc = config(
        "- data: b
  targets:
  - select: {kind: ConfigMap, name: settings}
    fieldPaths: [data.flags]
    options: {delimiter: ',', index: 99}
",
    );
    let mut rl = ResourceList::new(vec![obj(RENAMED)], Some(fc));
    run(&mut rl);
    assert_eq!(at(&rl.items[0], &["data", "flags"]), &Value::String("a,b".into()));
}

#[test]
fn resource_matching_several_identities_is_applied_once() {
    // both the current and the previous identity match a kind-only selector
    let fc = config(
        "- data: b
  targets:
  - select: {kind: ConfigMap}
    fieldPaths: [data.flags]
    options: {delimiter: ',', index: 99}
",
    );
    let mut rl = ResourceList::new(vec![obj(RENAMED)], Some(fc));
    let report = run(&mut rl);
    assert_eq!(report.fields_set(), 1);
    assert_eq!(at(&rl.items[0], &["data", "flags"]), &Value::String("a,b".into()));
}

#[test]
fn delimiter_on_mapping_is_reported_per_field() {
    let mut rl = list(
        "- data: x
  targets:
  - select: {kind: Deployment}
    fieldPaths: [spec.template, spec.replicas]
    options: {delimiter: '-', index: 0}
",
    );
    let report = run(&mut rl);
    assert_eq!(rl.results.len(), 1);
    assert_eq!(rl.results[0].message, "delimiter option can only be used with scalar nodes");
    assert_eq!(rl.results[0].field.as_ref().unwrap().path, "spec.template");
    // "1" split on '-' is ["1"]; index 0 replaces it, and the text cannot stay numeric
    assert_eq!(report.fields_set(), 1);
    assert_eq!(at(&rl.items[0], &["spec", "replicas"]), &Value::String("x".into()));
}

#[test]
fn malformed_previous_names_still_match_current_identity() {
    let doc = "apiVersion: apps/v1
kind: Deployment
metadata:
  name: app
  annotations:
    internal.config.kubernetes.io/previousNames: a,b
spec:
  replicas: 1
";
    let fc = config(
        "- data: '2'
  targets:
  - select: {kind: Deployment, name: app}
    fieldPaths: [spec.replicas]
  - select: {kind: Deployment, name: app}
    fieldPaths: [spec.replicas]
",
    );
    let mut rl = ResourceList::new(vec![obj(doc)], Some(fc));
    let report = run(&mut rl);

    assert_eq!(report.fields_set(), 2);
    assert_eq!(at(&rl.items[0], &["spec", "replicas"]), &Value::Number(2.into()));
    assert_eq!(rl.results.len(), 1, "{:?}", rl.results);
    assert_eq!(rl.results[0].severity, Severity::Warning);
    assert!(rl.results[0].message.contains("not equal"), "{}", rl.results[0].message);
    assert_eq!(rl.results[0].resource_ref.as_ref().unwrap().name, "app");
    assert!(!rl.has_errors());
}
