//! In-memory query engine over the snapshot directory.

use crate::core::VersionId;
use crate::error::{AdapterError, Result};
use crate::querying::sparql_client::{RdfTerm, ResultsBody, ResultsHead, SparqlResults};
use crate::store::snapshot::list_snapshots;
use oxigraph::io::RdfFormat;
use oxigraph::model::Term;
use oxigraph::sparql::{QueryResults, SparqlEvaluator};
use oxigraph::store::Store;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// Answers SPARQL queries over every snapshot of a store directory.
///
/// Snapshots written after startup are picked up by [`SnapshotEngine::refresh`].
pub struct SnapshotEngine {
    store_dir: PathBuf,
    store: Store,
    loaded: Mutex<BTreeSet<VersionId>>,
}

impl SnapshotEngine {
    pub fn new(store_dir: impl Into<PathBuf>) -> Result<Self> {
        let store = Store::new().map_err(|e| AdapterError::QueryExecution(e.to_string()))?;
        Ok(Self { store_dir: store_dir.into(), store, loaded: Mutex::new(BTreeSet::new()) })
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Load snapshots not seen yet. Returns how many were added.
    pub fn refresh(&self) -> Result<usize> {
        let mut loaded = self.loaded.lock().unwrap();
        let mut added = 0;
        for (version, path) in list_snapshots(&self.store_dir)? {
            if loaded.contains(&version) {
                continue;
            }
            let reader = BufReader::new(File::open(&path)?);
            self.store.load_from_reader(RdfFormat::NQuads, reader).map_err(|e| {
                AdapterError::LoadFailure { version, reason: format!("{}: {}", path.display(), e) }
            })?;
            info!(version, path = %path.display(), "snapshot loaded into endpoint");
            loaded.insert(version);
            added += 1;
        }
        Ok(added)
    }

    pub fn loaded_versions(&self) -> Vec<VersionId> {
        self.loaded.lock().unwrap().iter().copied().collect()
    }

    /// Evaluate a SELECT or ASK query.
    pub fn query(&self, query: &str) -> Result<SparqlResults> {
        self.refresh()?;
        debug!(query, "evaluating query");
        let parsed = SparqlEvaluator::new()
            .parse_query(query)
            .map_err(|e| AdapterError::QueryExecution(format!("malformed query: {}", e)))?;
        let results = parsed
            .on_store(&self.store)
            .execute()
            .map_err(|e| AdapterError::QueryExecution(e.to_string()))?;

        match results {
            QueryResults::Solutions(solutions) => {
                let vars =
                    solutions.variables().iter().map(|v| v.as_str().to_string()).collect::<Vec<_>>();
                let mut bindings = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| AdapterError::QueryExecution(e.to_string()))?;
                    let row = solution
                        .iter()
                        .map(|(var, term)| (var.as_str().to_string(), to_rdf_term(term)))
                        .collect::<BTreeMap<_, _>>();
                    bindings.push(row);
                }
                Ok(SparqlResults {
                    head: ResultsHead { vars },
                    results: Some(ResultsBody { bindings }),
                    boolean: None,
                })
            }
            QueryResults::Boolean(value) => {
                Ok(SparqlResults { head: ResultsHead::default(), results: None, boolean: Some(value) })
            }
            QueryResults::Graph(_) => Err(AdapterError::QueryExecution(
                "CONSTRUCT and DESCRIBE queries are not supported".to_string(),
            )),
        }
    }
}

fn to_rdf_term(term: &Term) -> RdfTerm {
    match term {
        Term::NamedNode(node) => RdfTerm {
            kind: "uri".to_string(),
            value: node.as_str().to_string(),
            lang: None,
            datatype: None,
        },
        Term::BlankNode(node) => RdfTerm {
            kind: "bnode".to_string(),
            value: node.as_str().to_string(),
            lang: None,
            datatype: None,
        },
        Term::Literal(literal) => {
            let lang = literal.language().map(str::to_string);
            let datatype = literal.datatype().as_str();
            RdfTerm {
                kind: "literal".to_string(),
                value: literal.value().to_string(),
                datatype: (lang.is_none() && datatype != XSD_STRING).then(|| datatype.to_string()),
                lang,
            }
        }
        #[allow(unreachable_patterns)]
        other => RdfTerm {
            kind: "triple".to_string(),
            value: other.to_string(),
            lang: None,
            datatype: None,
        },
    }
}
