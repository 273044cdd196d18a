//! Bulk ingestion of known conversions
//!
//! Accepts a mapping of arbitrary keys to `{from_unit, to_unit, formula, ...}`
//! records. Each record is validated and stored on its own; a bad record is
//! logged and recorded in the report, never aborting its siblings.

use crate::error::KbResult;
use crate::store::{InverseOutcome, StoreGateway};
use crate::types::ConversionRelation;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Raw records keyed by an arbitrary name
pub type Records = BTreeMap<String, serde_json::Value>;

/// Read records from a `.json` file, or YAML for any other extension
pub fn load_records(path: &Path) -> KbResult<Records> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else if content.trim().is_empty() {
        Ok(Records::new())
    } else {
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// What happened to one record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
    Stored { inverse: InverseOutcome },
    SkippedInvalid { reason: String },
    Errored { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestEntry {
    pub key: String,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

/// Per-key outcomes of a batch, ordered by key
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub entries: Vec<IngestEntry>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl IngestReport {
    fn new(mut entries: Vec<IngestEntry>, start: Instant) -> Self {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let report = Self {
            entries,
            elapsed: start.elapsed(),
        };
        info!(
            stored = report.stored(),
            skipped = report.skipped(),
            errored = report.errored(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "All conversions processed"
        );
        report
    }

    fn count(&self, pred: impl Fn(&IngestOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }

    pub fn stored(&self) -> usize {
        self.count(|o| matches!(o, IngestOutcome::Stored { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, IngestOutcome::SkippedInvalid { .. }))
    }

    pub fn errored(&self) -> usize {
        self.count(|o| matches!(o, IngestOutcome::Errored { .. }))
    }

    pub fn get(&self, key: &str) -> Option<&IngestOutcome> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.outcome)
    }
}

fn validate(key: &str, value: serde_json::Value) -> Result<ConversionRelation, IngestOutcome> {
    ConversionRelation::from_value(value).map_err(|e| {
        warn!(key = %key, error = %e, "Skipping invalid record");
        IngestOutcome::SkippedInvalid {
            reason: e.to_string(),
        }
    })
}

fn store_one(gateway: &StoreGateway, key: &str, relation: &ConversionRelation) -> IngestOutcome {
    match gateway.store(relation) {
        Ok(report) => {
            info!(key = %key, pair = %report.pair, "Stored record");
            IngestOutcome::Stored {
                inverse: report.inverse,
            }
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Storage failed");
            IngestOutcome::Errored {
                reason: e.to_string(),
            }
        }
    }
}

/// Validate and store every record in turn
pub fn ingest_records(gateway: &StoreGateway, records: Records) -> IngestReport {
    let start = Instant::now();
    let entries = records
        .into_iter()
        .map(|(key, value)| {
            let outcome = match validate(&key, value) {
                Ok(relation) => store_one(gateway, &key, &relation),
                Err(skipped) => skipped,
            };
            IngestEntry { key, outcome }
        })
        .collect();
    IngestReport::new(entries, start)
}

/// Validate every record, then store the valid ones on blocking worker threads
pub async fn ingest_records_concurrent(gateway: &StoreGateway, records: Records) -> IngestReport {
    let start = Instant::now();
    let mut entries = Vec::new();
    let mut handles: Vec<(String, JoinHandle<IngestOutcome>)> = Vec::new();

    for (key, value) in records {
        match validate(&key, value) {
            Ok(relation) => {
                let gateway = gateway.clone();
                let task_key = key.clone();
                let handle =
                    tokio::task::spawn_blocking(move || store_one(&gateway, &task_key, &relation));
                handles.push((key, handle));
            }
            Err(outcome) => entries.push(IngestEntry { key, outcome }),
        }
    }

    for (key, handle) in handles {
        let outcome = handle.await.unwrap_or_else(|e| {
            warn!(key = %key, error = %e, "Storage task failed");
            IngestOutcome::Errored {
                reason: e.to_string(),
            }
        });
        entries.push(IngestEntry { key, outcome });
    }

    IngestReport::new(entries, start)
}
