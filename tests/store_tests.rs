//! File-backed store and bulk ingestion

use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;
use unitforge::ingest::{self, IngestOutcome, Records};
use unitforge::store::{GraphStore, InverseOutcome, StoreGateway};
use unitforge::types::{ConversionRelation, UnitPair};

fn open(path: &std::path::Path) -> StoreGateway {
    StoreGateway::new(Arc::new(GraphStore::open(path).unwrap()))
}

fn pair(from: &str, to: &str) -> UnitPair {
    UnitPair::new(from, to).unwrap()
}

const RECORDS_YAML: &str = r#"
length:
  from_unit: Meters
  to_unit: Centimeters
  formula: centimeters = meters * 100
  author: ops
temperature:
  from_unit: celsius
  to_unit: fahrenheit
  formula: fahrenheit = celsius * 1.8 + 32
square:
  from_unit: side
  to_unit: area
  formula: area = side ** 2
broken:
  from_unit: grams
  to_unit: kilograms
  formula: kilograms = grams /
two_inputs:
  from_unit: a
  to_unit: b
  formula: b = a * c
no_units:
  formula: y = x
"#;

#[test]
fn test_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("kb").join("conversions.yaml");

    {
        let gateway = open(&path);
        let report = gateway
            .store(
                &ConversionRelation::new(&pair("meters", "centimeters"), "centimeters = meters * 100")
                    .with_provenance("author", "ops"),
            )
            .unwrap();
        assert!(matches!(report.inverse, InverseOutcome::Stored { .. }));
    }

    assert!(path.exists());
    assert!(!path.with_extension("yaml.tmp").exists());

    let reopened = open(&path);
    assert_eq!(
        reopened.lookup(&pair("Meters", "centimeters")).unwrap().as_deref(),
        Some("centimeters = meters * 100")
    );
    let inverse = reopened
        .lookup_relation(&pair("centimeters", "meters"))
        .unwrap()
        .unwrap();
    assert_eq!(inverse.formula, "meters = centimeters / 100");
    assert_eq!(inverse.provenance["author"], "ops");
}

#[test]
fn test_snapshot_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conversions.yaml");
    open(&path)
        .store(&ConversionRelation::new(
            &pair("kilograms", "grams"),
            "grams = kilograms * 1000",
        ))
        .unwrap();

    let snapshot: serde_yaml::Value =
        serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(snapshot["version"].as_u64(), Some(1));
    let conversions = snapshot["conversions"].as_sequence().unwrap();
    assert_eq!(conversions.len(), 2);
    // Sorted by (from_unit, to_unit)
    assert_eq!(conversions[0]["from_unit"].as_str(), Some("grams"));
    assert_eq!(conversions[1]["formula"].as_str(), Some("grams = kilograms * 1000"));
}

#[test]
fn test_second_store_keeps_existing_inverse() {
    let dir = TempDir::new().unwrap();
    let gateway = open(&dir.path().join("conversions.yaml"));
    let relation = ConversionRelation::new(&pair("meters", "centimeters"), "centimeters = meters * 100");

    gateway.store(&relation).unwrap();
    let again = gateway.store(&relation).unwrap();

    assert!(matches!(again.inverse, InverseOutcome::AlreadyPresent { .. }));
    assert_eq!(gateway.conversions().unwrap().len(), 2);
}

#[test]
fn test_failed_write_is_not_visible_to_lookups() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conversions.yaml");
    std::fs::create_dir(path.with_extension("yaml.tmp")).unwrap();

    let gateway = open(&path);
    let relation = ConversionRelation::new(&pair("meters", "centimeters"), "centimeters = meters * 100");
    assert!(gateway.store(&relation).is_err());

    assert_eq!(gateway.lookup(&pair("meters", "centimeters")).unwrap(), None);
    assert_eq!(gateway.lookup(&pair("centimeters", "meters")).unwrap(), None);
    assert!(gateway.conversions().unwrap().is_empty());
    assert!(!path.exists());
}

#[test]
fn test_ingest_file_partial_failure() {
    let dir = TempDir::new().unwrap();
    let records_path = dir.path().join("records.yaml");
    std::fs::write(&records_path, RECORDS_YAML).unwrap();
    let store_path = dir.path().join("conversions.yaml");

    let records = ingest::load_records(&records_path).unwrap();
    let report = ingest::ingest_records(&open(&store_path), records);

    assert_eq!(report.stored(), 3);
    assert_eq!(report.skipped(), 3);
    assert_eq!(report.errored(), 0);
    assert!(matches!(
        report.get("square"),
        Some(IngestOutcome::Stored {
            inverse: InverseOutcome::Skipped { .. }
        })
    ));
    assert!(matches!(
        report.get("broken"),
        Some(IngestOutcome::SkippedInvalid { .. })
    ));

    // Everything valid was persisted, including inverses where they exist
    let reopened = open(&store_path);
    assert_eq!(reopened.conversions().unwrap().len(), 5);
    let length = reopened
        .lookup_relation(&pair("meters", "centimeters"))
        .unwrap()
        .unwrap();
    assert_eq!(length.provenance["author"], "ops");
    assert!(reopened.lookup(&pair("area", "side")).unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_ingest_matches_sequential() {
    let dir = TempDir::new().unwrap();
    let records: Records = serde_yaml::from_str(RECORDS_YAML).unwrap();

    let sequential = open(&dir.path().join("sequential.yaml"));
    let concurrent = open(&dir.path().join("concurrent.yaml"));

    let seq_report = ingest::ingest_records(&sequential, records.clone());
    let conc_report = ingest::ingest_records_concurrent(&concurrent, records).await;

    assert_eq!(seq_report.entries, conc_report.entries);
    assert_eq!(
        sequential.conversions().unwrap(),
        concurrent.conversions().unwrap()
    );
}

#[tokio::test]
async fn test_concurrent_ingest_many_records() {
    let dir = TempDir::new().unwrap();
    let gateway = open(&dir.path().join("conversions.yaml"));

    let mut records = Records::new();
    for i in 1..=40 {
        records.insert(
            format!("q{:02}", i),
            serde_json::json!({
                "from_unit": format!("unit_{}", i),
                "to_unit": "base",
                "formula": format!("base = unit_{} * {}", i, i),
            }),
        );
    }

    let report = ingest::ingest_records_concurrent(&gateway, records).await;
    assert_eq!(report.stored(), 40);
    assert_eq!(gateway.conversions().unwrap().len(), 80);
    assert_eq!(open(&dir.path().join("conversions.yaml")).conversions().unwrap().len(), 80);
}
