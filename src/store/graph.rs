//! Graph-backed conversion store
//!
//! Units are nodes, conversions are directed edges carrying the formula and
//! its provenance. The graph lives in memory behind a `RwLock`; when opened
//! on a file, every upsert rewrites a YAML snapshot through a temp file and
//! rename so readers never observe a half-written store.

use super::{ConversionStore, StoreError};
use crate::types::{ConversionRelation, UnitPair};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
struct EdgeData {
    formula: String,
    provenance: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
struct UnitGraph {
    graph: DiGraph<String, EdgeData>,
    nodes: HashMap<String, NodeIndex>,
}

impl UnitGraph {
    fn ensure_node(&mut self, unit: &str) -> NodeIndex {
        if let Some(idx) = self.nodes.get(unit) {
            return *idx;
        }
        let idx = self.graph.add_node(unit.to_string());
        self.nodes.insert(unit.to_string(), idx);
        idx
    }

    fn find(&self, pair: &UnitPair) -> Option<ConversionRelation> {
        let from = *self.nodes.get(pair.from_unit())?;
        let to = *self.nodes.get(pair.to_unit())?;
        let edge = self.graph.find_edge(from, to)?;
        let data = self.graph.edge_weight(edge)?;
        Some(ConversionRelation {
            from_unit: pair.from_unit().to_string(),
            to_unit: pair.to_unit().to_string(),
            formula: data.formula.clone(),
            provenance: data.provenance.clone(),
        })
    }

    fn upsert(&mut self, relation: &ConversionRelation) -> Result<(), StoreError> {
        let pair = relation
            .pair()
            .map_err(|e| StoreError::InvalidRelation(e.to_string()))?;
        let formula = relation.formula.trim();
        if formula.is_empty() {
            return Err(StoreError::InvalidRelation(format!(
                "{} has an empty formula",
                pair
            )));
        }

        let from = self.ensure_node(pair.from_unit());
        let to = self.ensure_node(pair.to_unit());

        match self.graph.find_edge(from, to) {
            Some(edge) => {
                if let Some(data) = self.graph.edge_weight_mut(edge) {
                    data.formula = formula.to_string();
                    data.provenance.extend(relation.provenance.clone());
                }
            }
            None => {
                self.graph.add_edge(
                    from,
                    to,
                    EdgeData {
                        formula: formula.to_string(),
                        provenance: relation.provenance.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    fn conversions(&self) -> Vec<ConversionRelation> {
        let mut relations: Vec<ConversionRelation> = self
            .graph
            .edge_references()
            .map(|edge| ConversionRelation {
                from_unit: self.graph[edge.source()].clone(),
                to_unit: self.graph[edge.target()].clone(),
                formula: edge.weight().formula.clone(),
                provenance: edge.weight().provenance.clone(),
            })
            .collect();
        relations.sort_by(|a, b| (&a.from_unit, &a.to_unit).cmp(&(&b.from_unit, &b.to_unit)));
        relations
    }
}

/// On-disk layout of the store file
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    conversions: Vec<ConversionRelation>,
}

/// Conversion store over a `petgraph` directed graph
#[derive(Debug)]
pub struct GraphStore {
    graph: RwLock<UnitGraph>,
    path: Option<PathBuf>,
}

impl GraphStore {
    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            graph: RwLock::new(UnitGraph::default()),
            path: None,
        }
    }

    /// Open the store file at `path`, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut graph = UnitGraph::default();

        if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            if !content.trim().is_empty() {
                let snapshot: Snapshot =
                    serde_yaml::from_str(&content).map_err(|source| StoreError::Format {
                        path: path.clone(),
                        source,
                    })?;
                for relation in &snapshot.conversions {
                    graph.upsert(relation)?;
                }
            }
            debug!(
                path = %path.display(),
                edges = graph.graph.edge_count(),
                "Loaded conversion store"
            );
        }

        Ok(Self {
            graph: RwLock::new(graph),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All unit names, sorted
    pub fn units(&self) -> Result<Vec<String>, StoreError> {
        let graph = self.read()?;
        let mut units: Vec<String> = graph.graph.node_weights().cloned().collect();
        units.sort();
        Ok(units)
    }

    /// Number of stored edges
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.graph.edge_count())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, UnitGraph>, StoreError> {
        self.graph.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, UnitGraph>, StoreError> {
        self.graph.write().map_err(|_| StoreError::Poisoned)
    }

    /// Rewrite the snapshot file; called with the write lock held
    fn persist(&self, graph: &UnitGraph) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            conversions: graph.conversions(),
        };
        let yaml = serde_yaml::to_string(&snapshot).map_err(|source| StoreError::Format {
            path: path.clone(),
            source,
        })?;

        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml).map_err(io_err)?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }
        Ok(())
    }
}

impl ConversionStore for GraphStore {
    fn find(&self, pair: &UnitPair) -> Result<Option<ConversionRelation>, StoreError> {
        Ok(self.read()?.find(pair))
    }

    fn upsert(&self, relation: &ConversionRelation) -> Result<(), StoreError> {
        let mut graph = self.write()?;
        if self.path.is_none() {
            return graph.upsert(relation);
        }

        // The live graph only changes once its snapshot is on disk
        let mut staged = graph.clone();
        staged.upsert(relation)?;
        self.persist(&staged)?;
        *graph = staged;
        Ok(())
    }

    fn conversions(&self) -> Result<Vec<ConversionRelation>, StoreError> {
        Ok(self.read()?.conversions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn relation(from: &str, to: &str, formula: &str) -> ConversionRelation {
        ConversionRelation::new(&UnitPair::new(from, to).unwrap(), formula)
    }

    #[test]
    fn test_find_missing_is_none() {
        let store = GraphStore::in_memory();
        let pair = UnitPair::new("meters", "feet").unwrap();
        assert_eq!(store.find(&pair).unwrap(), None);
    }

    #[test]
    fn test_upsert_and_find() {
        let store = GraphStore::in_memory();
        store
            .upsert(&relation("meters", "centimeters", "centimeters = meters * 100"))
            .unwrap();

        let found = store
            .find(&UnitPair::new("Meters", " centimeters").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.formula, "centimeters = meters * 100");
        assert_eq!(store.units().unwrap(), vec!["centimeters", "meters"]);
    }

    #[test]
    fn test_upsert_is_directed() {
        let store = GraphStore::in_memory();
        store
            .upsert(&relation("meters", "centimeters", "centimeters = meters * 100"))
            .unwrap();
        let reverse = UnitPair::new("centimeters", "meters").unwrap();
        assert_eq!(store.find(&reverse).unwrap(), None);
    }

    #[test]
    fn test_upsert_merges_instead_of_duplicating() {
        let store = GraphStore::in_memory();
        store
            .upsert(
                &relation("meters", "centimeters", "centimeters = meters * 10")
                    .with_provenance("author", "first"),
            )
            .unwrap();
        store
            .upsert(
                &relation("meters", "centimeters", "centimeters = meters * 100")
                    .with_provenance("reviewed", true),
            )
            .unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.units().unwrap().len(), 2);

        let found = store
            .find(&UnitPair::new("meters", "centimeters").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.formula, "centimeters = meters * 100");
        assert_eq!(found.provenance["author"], "first");
        assert_eq!(found.provenance["reviewed"], true);
    }

    #[test]
    fn test_upsert_rejects_invalid_edge() {
        let store = GraphStore::in_memory();
        let bad = ConversionRelation {
            from_unit: " ".to_string(),
            to_unit: "feet".to_string(),
            formula: "feet = meters * 3.28084".to_string(),
            provenance: BTreeMap::new(),
        };
        assert!(matches!(
            store.upsert(&bad),
            Err(StoreError::InvalidRelation(_))
        ));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_conversions_sorted() {
        let store = GraphStore::in_memory();
        store.upsert(&relation("b", "a", "a = b * 2")).unwrap();
        store.upsert(&relation("a", "b", "b = a / 2")).unwrap();

        let keys: Vec<(String, String)> = store
            .conversions()
            .unwrap()
            .into_iter()
            .map(|r| (r.from_unit, r.to_unit))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a".to_string(), "b".to_string()),
                ("b".to_string(), "a".to_string())
            ]
        );
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kb").join("conversions.yaml");

        let store = GraphStore::open(&path).unwrap();
        store
            .upsert(
                &relation("meters", "feet", "feet = meters * 3.28084")
                    .with_provenance("author", "ops"),
            )
            .unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("yaml.tmp").exists());

        let reopened = GraphStore::open(&path).unwrap();
        let found = reopened
            .find(&UnitPair::new("meters", "feet").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.formula, "feet = meters * 3.28084");
        assert_eq!(found.provenance["author"], "ops");
    }

    #[test]
    fn test_failed_write_leaves_graph_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conversions.yaml");
        let store = GraphStore::open(&path).unwrap();
        store
            .upsert(&relation("meters", "feet", "feet = meters * 3.28084"))
            .unwrap();

        // A directory where the temp file should go makes every write fail
        fs::create_dir(path.with_extension("yaml.tmp")).unwrap();
        let result = store.upsert(&relation("meters", "centimeters", "centimeters = meters * 100"));
        assert!(matches!(result, Err(StoreError::Io { .. })));

        let pair = UnitPair::new("meters", "centimeters").unwrap();
        assert_eq!(store.find(&pair).unwrap(), None);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(GraphStore::open(&path).unwrap().len().unwrap(), 1);

        fs::remove_dir(path.with_extension("yaml.tmp")).unwrap();
        store
            .upsert(&relation("meters", "centimeters", "centimeters = meters * 100"))
            .unwrap();
        assert!(store.find(&pair).unwrap().is_some());
    }

    #[test]
    fn test_open_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conversions.yaml");
        fs::write(&path, "conversions: [this is not: valid").unwrap();
        assert!(matches!(
            GraphStore::open(&path),
            Err(StoreError::Format { .. })
        ));
    }

    #[test]
    fn test_concurrent_upserts() {
        let store = std::sync::Arc::new(GraphStore::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let to = format!("unit_{}", i);
                    store
                        .upsert(&relation("base", &to, &format!("{} = base * {}", to, i + 1)))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len().unwrap(), 8);
        assert_eq!(store.units().unwrap().len(), 9);
    }
}
