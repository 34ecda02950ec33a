//! Generic loader for stores that pick their input up from a directory.
//!
//! Every file of the source directory is copied to `<store>/v<version>/`.
//! RDF files with a known extension are parsed while copying so that the
//! reported record count is the number of triples or quads dropped off.

use crate::core::{LoadResult, VersionId};
use crate::error::{AdapterError, Result};
use crate::loader::VersionLoader;
use oxigraph::io::{RdfFormat, RdfParser};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

pub struct FileDropLoader {
    store_dir: PathBuf,
}

impl FileDropLoader {
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self { store_dir: store_dir.into() }
    }

    pub fn version_dir(&self, version: VersionId) -> PathBuf {
        self.store_dir.join(format!("v{}", version))
    }

    fn count_records(version: VersionId, path: &Path, format: RdfFormat) -> Result<u64> {
        let reader = BufReader::new(File::open(path)?);
        let mut count = 0;
        for quad in RdfParser::from_format(format).for_reader(reader) {
            quad.map_err(|e| AdapterError::LoadFailure {
                version,
                reason: format!("{}: {}", path.display(), e),
            })?;
            count += 1;
        }
        Ok(count)
    }
}

impl VersionLoader for FileDropLoader {
    fn load_version(&self, version: VersionId, source_dir: &Path) -> Result<LoadResult> {
        let start = Instant::now();
        let target = self.version_dir(version);
        fs::create_dir_all(&target)?;

        let mut record_count = 0;
        for entry in fs::read_dir(source_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let format = path
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(RdfFormat::from_extension);
            if let Some(format) = format {
                record_count += Self::count_records(version, &path, format)?;
            }
            fs::copy(&path, target.join(entry.file_name()))?;
        }

        let elapsed_millis = start.elapsed().as_millis() as u64;
        info!(version, record_count, elapsed_millis, target = %target.display(), "version dropped off");
        Ok(LoadResult { record_count, elapsed_millis })
    }
}
