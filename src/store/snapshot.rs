//! Materialized version snapshots.
//!
//! Version `N` is stored as `<store>/version-N.nq`, every quad in the named
//! graph `<http://graph.version.N>`. A snapshot is the previous snapshot
//! with the change set of the version applied: triples from files ending in
//! `deleted.nt` are removed, triples from any other `.nt` file are added.

use crate::core::VersionId;
use crate::error::{AdapterError, Result};
use oxigraph::io::{RdfFormat, RdfParser, RdfSerializer};
use oxigraph::model::{GraphName, NamedNode, Triple};
use regex::Regex;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};

pub const GRAPH_PREFIX: &str = "http://graph.version.";

const DELETIONS_SUFFIX: &str = "deleted.nt";

fn snapshot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^version-(\d+)\.nq$").expect("static pattern"))
}

/// Named graph holding the snapshot of `version`.
pub fn version_graph(version: VersionId) -> Result<NamedNode> {
    NamedNode::new(format!("{}{}", GRAPH_PREFIX, version))
        .map_err(|e| AdapterError::LoadFailure { version, reason: e.to_string() })
}

pub fn snapshot_path(store_dir: &Path, version: VersionId) -> PathBuf {
    store_dir.join(format!("version-{}.nq", version))
}

/// Snapshots present in `store_dir`, ordered by version.
pub fn list_snapshots(store_dir: &Path) -> Result<Vec<(VersionId, PathBuf)>> {
    let mut snapshots = Vec::new();
    if !store_dir.exists() {
        return Ok(snapshots);
    }
    for entry in fs::read_dir(store_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(captures) = name.to_str().and_then(|n| snapshot_pattern().captures(n)) else {
            continue;
        };
        if let Ok(version) = captures[1].parse::<VersionId>() {
            snapshots.push((version, entry.path()));
        }
    }
    snapshots.sort_by_key(|(version, _)| *version);
    Ok(snapshots)
}

fn read_triples(
    version: VersionId,
    path: &Path,
    format: RdfFormat,
    mut sink: impl FnMut(Triple),
) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    for quad in RdfParser::from_format(format).for_reader(reader) {
        let quad = quad.map_err(|e| AdapterError::LoadFailure {
            version,
            reason: format!("{}: {}", path.display(), e),
        })?;
        sink(Triple::new(quad.subject, quad.predicate, quad.object));
    }
    Ok(())
}

/// Triples of the most recent snapshot older than `version`.
fn previous_triples(store_dir: &Path, version: VersionId) -> Result<HashSet<Triple>> {
    let mut triples = HashSet::new();
    let previous = list_snapshots(store_dir)?.into_iter().filter(|(v, _)| *v < version).last();
    if let Some((previous, path)) = previous {
        debug!(previous, path = %path.display(), "starting from previous snapshot");
        read_triples(version, &path, RdfFormat::NQuads, |triple| {
            triples.insert(triple);
        })?;
    }
    Ok(triples)
}

/// Build the snapshot of `version` from the change files in `source_dir`.
///
/// Returns the number of effective changes: triples actually removed plus
/// triples actually added.
pub fn materialize_version(store_dir: &Path, version: VersionId, source_dir: &Path) -> Result<u64> {
    fs::create_dir_all(store_dir)?;
    let mut triples = previous_triples(store_dir, version)?;

    let mut deletions = Vec::new();
    let mut additions = Vec::new();
    let mut entries = fs::read_dir(source_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    for path in entries {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if name.ends_with(DELETIONS_SUFFIX) {
            deletions.push(path);
        } else if name.ends_with(".nt") {
            additions.push(path);
        }
    }

    let mut changes = 0u64;
    for path in &deletions {
        read_triples(version, path, RdfFormat::NTriples, |triple| {
            if triples.remove(&triple) {
                changes += 1;
            }
        })?;
    }
    for path in &additions {
        read_triples(version, path, RdfFormat::NTriples, |triple| {
            if triples.insert(triple) {
                changes += 1;
            }
        })?;
    }

    let graph = GraphName::NamedNode(version_graph(version)?);
    let target = snapshot_path(store_dir, version);
    // Readers only ever see complete snapshots.
    let partial = target.with_extension("nq.partial");
    let mut serializer =
        RdfSerializer::from_format(RdfFormat::NQuads).for_writer(BufWriter::new(File::create(&partial)?));
    for triple in &triples {
        serializer.serialize_quad(&triple.clone().in_graph(graph.clone()))?;
    }
    serializer.finish()?;
    fs::rename(&partial, &target)?;

    info!(
        version,
        changes,
        triples = triples.len(),
        deletion_files = deletions.len(),
        addition_files = additions.len(),
        snapshot = %target.display(),
        "version materialized"
    );
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, lines: &[&str]) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(name), lines.join("\n")).unwrap();
    }

    const A_KNOWS_B: &str = "<http://ex.org/a> <http://ex.org/p> <http://ex.org/b> .";
    const B_KNOWS_C: &str = "<http://ex.org/b> <http://ex.org/p> <http://ex.org/c> .";
    const C_KNOWS_A: &str = "<http://ex.org/c> <http://ex.org/p> <http://ex.org/a> .";

    #[test]
    fn test_snapshots_apply_change_sets() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("store");
        write(&tmp.path().join("v0"), "data.nt", &[A_KNOWS_B, B_KNOWS_C]);
        write(&tmp.path().join("v1"), "added.nt", &[C_KNOWS_A, A_KNOWS_B]);
        write(&tmp.path().join("v1"), "deleted.nt", &[B_KNOWS_C]);

        assert_eq!(materialize_version(&store, 0, &tmp.path().join("v0")).unwrap(), 2);
        // A_KNOWS_B is already present and does not count as a change.
        assert_eq!(materialize_version(&store, 1, &tmp.path().join("v1")).unwrap(), 2);

        let snapshots = list_snapshots(&store).unwrap();
        assert_eq!(snapshots.iter().map(|(v, _)| *v).collect::<Vec<_>>(), vec![0, 1]);

        let v1 = fs::read_to_string(snapshot_path(&store, 1)).unwrap();
        assert_eq!(v1.lines().count(), 2);
        assert!(v1.contains("<http://graph.version.1>"));
        assert!(!v1.contains("<http://ex.org/b> <http://ex.org/p> <http://ex.org/c>"));
        assert!(v1.contains("<http://ex.org/c> <http://ex.org/p> <http://ex.org/a>"));
    }

    #[test]
    fn test_list_ignores_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("version-3.nq"), "").unwrap();
        fs::write(tmp.path().join("version-x.nq"), "").unwrap();
        fs::write(tmp.path().join("notes.txt"), "").unwrap();
        let snapshots = list_snapshots(tmp.path()).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].0, 3);
        assert!(list_snapshots(&tmp.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_change_file_fails_the_version() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("v0"), "data.nt", &["this is not n-triples"]);
        let err = materialize_version(&tmp.path().join("store"), 0, &tmp.path().join("v0")).unwrap_err();
        assert!(matches!(err, AdapterError::LoadFailure { version: 0, .. }));
    }
}
