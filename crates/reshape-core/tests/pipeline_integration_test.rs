//! Integration tests for the upload pipeline
//!
//! Tests use temporary directories with real project fixtures to verify:
//! - Project, template and profile loading
//! - Detection and parsing of every supported format
//! - Mapping with coercion and row-error policies
//! - Profile validation against target templates

use tempfile::TempDir;
use reshape_core::{
    Config, Error, FieldKind, Format, OnRowError, Value, detect, map_rows, parse_bytes,
};

/// Helper to create a temporary project directory with the people fixtures.
///
/// Returns a `TempDir` that automatically cleans up when dropped.
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("templates")).unwrap();
    std::fs::create_dir_all(dir.path().join("profiles")).unwrap();

    std::fs::write(
        dir.path().join("reshape.yaml"),
        r#"
name: integration-test
settings:
  xml_record_element: person
"#,
    )
    .unwrap();

    std::fs::write(
        dir.path().join("templates/people-csv.yaml"),
        r#"
name: people-csv
format: csv
fields:
  - name: Name
    kind: String
  - name: Age
    kind: String
"#,
    )
    .unwrap();

    std::fs::write(
        dir.path().join("templates/people-json.yaml"),
        r#"
name: people-json
format: json
fields:
  - name: FullName
    kind: String
  - name: Years
    kind: Integer
"#,
    )
    .unwrap();

    std::fs::write(
        dir.path().join("profiles/people.yaml"),
        r#"
name: people
source_template: people-csv
target_template: people-json
rules:
  - source: Name
    target: FullName
    kind: String
  - source: Age
    target: Years
    kind: Integer
"#,
    )
    .unwrap();

    dir
}

fn convert(config: &Config, bytes: &[u8], hint: Option<&str>, policy: OnRowError) -> reshape_core::Result<Vec<reshape_core::Row>> {
    let profile = config.profile("people")?;
    let rows = parse_bytes(bytes, hint, &config.settings().parsing)?;
    map_rows(rows.into_iter().map(Ok), &profile, policy)
}

// =============================================================================
// End-to-end conversion
// =============================================================================

#[test]
fn test_csv_to_target_rows() {
    let dir = setup_project();
    let config = Config::load(dir.path()).unwrap();

    let rows = convert(&config, b"Name,Age\nAlice,30\nBob,25\n", Some("people.csv"), OnRowError::StopOnError).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("FullName"), Some(&Value::from("Alice")));
    assert_eq!(rows[0].get("Years"), Some(&Value::Integer(30)));
    assert_eq!(rows[1].get("FullName"), Some(&Value::from("Bob")));
    assert_eq!(rows[1].get("Years"), Some(&Value::Integer(25)));

    let json = serde_json::to_string(&rows[0]).unwrap();
    assert_eq!(json, r#"{"FullName":"Alice","Years":30}"#);
}

#[test]
fn test_same_rows_from_every_text_format() {
    let dir = setup_project();
    let config = Config::load(dir.path()).unwrap();

    let json = br#"[{"Name": "Alice", "Age": 30}, {"Name": "Bob", "Age": "25"}]"#;
    let xml = b"<people><person><Name>Alice</Name><Age>30</Age></person><person><Name>Bob</Name><Age>25</Age></person></people>";
    let csv = b"Name,Age\nAlice,30\nBob,25\n";

    let from_csv = convert(&config, csv, None, OnRowError::StopOnError).unwrap();
    let from_json = convert(&config, json, None, OnRowError::StopOnError).unwrap();
    let from_xml = convert(&config, xml, None, OnRowError::StopOnError).unwrap();

    assert_eq!(detect(json, None), Format::Json);
    assert_eq!(detect(xml, None), Format::Xml);
    assert_eq!(from_csv, from_json);
    assert_eq!(from_csv, from_xml);
}

#[test]
fn test_bad_row_policies() {
    let dir = setup_project();
    let config = Config::load(dir.path()).unwrap();
    let input = b"Name,Age\nAlice,30\nEve,unknown\nBob,25\n";

    let err = convert(&config, input, None, OnRowError::StopOnError).unwrap_err();
    match err {
        Error::Coercion { value, kind, .. } => {
            assert_eq!(value, "unknown");
            assert_eq!(kind, FieldKind::Integer);
        }
        other => panic!("Expected coercion error, got {other:?}"),
    }

    let rows = convert(&config, input, None, OnRowError::LogAndSkip).unwrap();
    assert_eq!(rows.len(), 2);
}

#[test]
fn test_malformed_input_is_format_error_under_any_policy() {
    let dir = setup_project();
    let config = Config::load(dir.path()).unwrap();

    let err = convert(&config, b"[{\"Name\": ", Some("people.json"), OnRowError::LogAndSkip).unwrap_err();
    assert!(err.is_format_error());
}

// =============================================================================
// Validation
// =============================================================================

#[test]
fn test_profile_targets_match_template() {
    let dir = setup_project();
    let config = Config::load(dir.path()).unwrap();

    let profile = config.profile("people").unwrap();
    let target = config.template("people-json").unwrap();
    assert!(profile.validate_targets(&target.flat_fields()).is_ok());

    let source = config.template("people-csv").unwrap();
    assert!(profile.validate_targets(&source.flat_fields()).is_err());
}

#[test]
fn test_upload_limit_from_project_settings() {
    let dir = setup_project();
    std::fs::write(
        dir.path().join("reshape.yaml"),
        "name: limited\nsettings:\n  max_upload_bytes: 10\n",
    )
    .unwrap();
    let config = Config::load(dir.path()).unwrap();

    let input = b"Name,Age\nAlice,30\n";
    let err = config
        .settings()
        .check_upload_size(detect(input, None), input.len() as u64)
        .unwrap_err();
    assert!(matches!(err, Error::UploadTooLarge { size: 18, limit: 10, .. }));
}
