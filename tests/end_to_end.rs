//! Project to release, end to end
//!
//! Compiles the fixture project, checks dumps against it, freezes versions
//! and compares them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ncvocab::compatibility::Bump;
use ncvocab::compiler::{compile_file, compile_standard};
use ncvocab::diagnostics::Category;
use ncvocab::example::{synthesize, ExampleOptions};
use ncvocab::json_schema::check_document;
use ncvocab::project_registry::{ConventionSpec, ProjectRegistry, RegisteredProject};
use ncvocab::registry::{load_product_file, LATEST};
use ncvocab::{
    AttrValue, CompatibilityChecker, DataSource, Dataset, JsonDump, ProjectModelSet, SchemaError,
    Verbosity, VersionStore,
};
use tempfile::tempdir;

fn fixtures_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn project() -> ProjectModelSet {
    ProjectModelSet::open(fixtures_path().join("project")).unwrap()
}

fn core(project: &ProjectModelSet) -> Dataset {
    let path = project.find_definition_for("core_20240101.nc").unwrap().unwrap();
    compile_file(path, project).unwrap()
}

// =============================================================================
// Checking files
// =============================================================================

#[test]
fn test_compiled_definition_shape() {
    let dataset = core(&project());

    assert_eq!(dataset.product_name(), "core");
    let names: Vec<&str> = dataset
        .contents
        .attributes
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["Conventions", "institution", "title", "processing_level"]
    );

    let temperature = dataset.contents.variable("air_temperature").unwrap();
    let attrs: Vec<&str> = temperature.attributes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(attrs, vec!["long_name", "units", "valid_range", "flag_values"]);
    assert!(!dataset.contents.group("quality").unwrap().meta.required);
}

#[test]
fn test_conforming_file_is_clean() {
    let dataset = core(&project());
    let source = JsonDump::new(fixtures_path().join("core_20240101.nc.json"));
    let report = ncvocab::validate(&dataset, &source.root().unwrap());

    assert!(report.is_compliant());
    assert!(report.is_empty(), "{:?}", report.diagnostics);
    assert_eq!(report.summary(), "OK");
}

#[test]
fn test_every_problem_reported_in_one_pass() {
    let dataset = core(&project());
    let source = JsonDump::new(fixtures_path().join("core_20240102.nc.json"));
    let report = ncvocab::validate(&dataset, &source.root().unwrap());

    let found: Vec<(String, Category)> = report
        .diagnostics
        .iter()
        .map(|d| (d.path_string(), d.category))
        .collect();
    assert_eq!(
        found,
        vec![
            ("root -> attributes -> institution".to_string(), Category::Missing),
            ("root -> attributes -> processing_level".to_string(), Category::ValueMismatch),
            ("root -> dimensions -> bounds".to_string(), Category::DimensionMismatch),
            ("root -> variables -> air_temperature".to_string(), Category::DataTypeMismatch),
            (
                "root -> variables -> air_temperature -> attributes -> units".to_string(),
                Category::ValueMismatch
            ),
            (
                "root -> variables -> air_temperature -> attributes -> flag_values".to_string(),
                Category::TypeMismatch
            ),
        ]
    );
    assert!(!report.is_compliant());
    assert_eq!(report.error_count(), 6);

    let text = report.render(Verbosity::All, &source.describe(), "core");
    assert!(text.contains("value mismatch: expected K, got degC"));
    assert!(text.contains("type mismatch: expected Array[int8], got Array[int16]"));
    assert!(text.contains("ERROR (6 errors, 0 warnings)"));
    assert!(report.render(Verbosity::Quiet, "x", "core").is_empty());
}

#[test]
fn test_example_file_round_trips_through_disk() {
    let project = project();
    let dataset = core(&project);
    let dir = tempdir().unwrap();
    let out = dir.path().join("out").join("core_example.nc.json");

    let example = synthesize(&dataset, &ExampleOptions { unlimited_length: 3 });
    JsonDump::write(&out, &example).unwrap();

    let read_back = JsonDump::read(&out).unwrap();
    assert_eq!(read_back, example);
    assert!(ncvocab::validate(&dataset, &read_back).is_compliant());

    let schema = ncvocab::derive_json_schema(&dataset);
    let errors = check_document(&schema, &read_back.to_plain_json()).unwrap();
    assert!(errors.is_empty(), "{errors:?}");
}

#[test]
fn test_project_standard_alone() {
    let standard = compile_standard(&project()).unwrap();
    assert_eq!(standard.product_name(), "CF-1.8");

    let good = JsonDump::read(fixtures_path().join("core_20240101.nc.json")).unwrap();
    assert!(ncvocab::validate(&standard, &good).is_empty());

    let bad = JsonDump::read(fixtures_path().join("core_20240102.nc.json")).unwrap();
    let report = ncvocab::validate(&standard, &bad);
    let found: Vec<(String, Category)> = report
        .diagnostics
        .iter()
        .map(|d| (d.path_string(), d.category))
        .collect();
    assert_eq!(
        found,
        vec![("root -> attributes -> institution".to_string(), Category::Missing)]
    );
}

#[test]
fn test_registered_project_found_by_conventions() {
    let dir = tempdir().unwrap();
    let registry_path = dir.path().join("registry.yaml");
    let root = fixtures_path().join("project");

    let mut registry = ProjectRegistry::default();
    registry
        .add(
            RegisteredProject {
                spec: ConventionSpec::parse("CF-[]").unwrap(),
                definitions: root.join("definitions"),
                path: root,
            },
            false,
        )
        .unwrap();
    registry.save(&registry_path).unwrap();

    let file = JsonDump::read(fixtures_path().join("core_20240101.nc.json")).unwrap();
    let conventions = match file.attribute("Conventions") {
        Some(AttrValue::Scalar(value)) => value.as_text().unwrap().to_string(),
        other => panic!("unexpected Conventions {other:?}"),
    };

    let registry = ProjectRegistry::load(&registry_path).unwrap();
    let matched = registry.matching(&conventions);
    assert_eq!(matched.len(), 1);

    let project = matched[0].open().unwrap();
    assert!(project.find_definition_for("core_20240101.nc").unwrap().is_some());
}

// =============================================================================
// Releases
// =============================================================================

fn products(dataset: Dataset) -> BTreeMap<String, Dataset> {
    let mut products = BTreeMap::new();
    products.insert(dataset.product_name().to_string(), dataset);
    products
}

#[test]
fn test_release_lifecycle() {
    let project = project();
    let dataset = core(&project);
    let dir = tempdir().unwrap();
    let store = VersionStore::open(dir.path().join("products"));

    let v1 = store.freeze_all(products(dataset.clone()), "1.0").unwrap();
    assert_eq!(v1.version.to_string(), "1.0.0");

    let again = store.freeze_all(products(dataset.clone()), "1.0");
    assert!(matches!(again, Err(SchemaError::VersionConflict { .. })));

    // Released product files can be used directly as definitions
    let frozen = load_product_file(store.version_dir("1.0").join("core.json")).unwrap();
    assert_eq!(frozen, dataset);
    let source = JsonDump::read(fixtures_path().join("core_20240101.nc.json")).unwrap();
    assert!(ncvocab::validate(&frozen, &source).is_compliant());

    // Drop the required `institution` attribute for 1.1
    let mut changed = dataset.clone();
    changed.contents.attributes.retain(|a| a.name != "institution");
    store.freeze_all(products(changed), "1.1").unwrap();

    let latest = store.load(LATEST).unwrap();
    assert_eq!(latest.tag, "1.1");

    let old = store.load("1.0").unwrap();
    let results = CompatibilityChecker::new().check_versions(&old, &latest);
    let core_result = &results["core"];
    assert!(!core_result.is_compatible);
    assert_eq!(core_result.required_bump(), Bump::Major);
    assert!(!latest.is_major_bump_from(&old));

    let tags: Vec<String> = store.list().unwrap().into_iter().map(|m| m.tag).collect();
    assert_eq!(tags, vec!["1.0", "1.1"]);
}

#[test]
fn test_tampered_release_refuses_to_load() {
    let dataset = core(&project());
    let dir = tempdir().unwrap();
    let store = VersionStore::open(dir.path());
    store.freeze_all(products(dataset), "2.0").unwrap();

    let file = store.version_dir("2.0").join("core.json");
    let mut content = fs::read_to_string(&file).unwrap();
    content.push('\n');
    fs::write(&file, content).unwrap();

    assert!(matches!(
        store.load("2.0"),
        Err(SchemaError::ChecksumMismatch { .. })
    ));
}
