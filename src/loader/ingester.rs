//! Store-specific ingester invoked as an external program.

use crate::core::{LoadResult, VersionId};
use crate::error::{AdapterError, Result};
use crate::loader::{parse_result_line, VersionLoader};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

/// Runs `<command...> <store_dir> <version> <source_dir>` and reads the
/// final `count,millis` line from its output.
pub struct ExternalIngester {
    command: Vec<String>,
    store_dir: PathBuf,
}

impl ExternalIngester {
    pub fn new(command: Vec<String>, store_dir: impl Into<PathBuf>) -> Self {
        Self { command, store_dir: store_dir.into() }
    }

    fn failure(version: VersionId, reason: impl Into<String>) -> AdapterError {
        AdapterError::LoadFailure { version, reason: reason.into() }
    }
}

/// Forward every line to the log and keep the last result line seen.
///
/// Reads to end of stream. Lines that are not UTF-8 are decoded lossily so
/// the pipe never stops being drained while the child is still writing.
fn drain<R: Read>(reader: R, stream: &'static str) -> Option<LoadResult> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut last = None;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(target: "ingester", stream, error = %e, "cannot read ingester output");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        match parse_result_line(line) {
            Some(result) => {
                debug!(target: "ingester", stream, %line, "result line");
                last = Some(result);
            }
            None => info!(target: "ingester", stream, "{}", line),
        }
    }
    last
}

impl VersionLoader for ExternalIngester {
    fn load_version(&self, version: VersionId, source_dir: &Path) -> Result<LoadResult> {
        let (program, leading) = self
            .command
            .split_first()
            .ok_or_else(|| Self::failure(version, "no ingester program configured"))?;

        info!(version, program = %program, source = %source_dir.display(), "starting ingester");
        let mut child = Command::new(program)
            .args(leading)
            .arg(&self.store_dir)
            .arg(version.to_string())
            .arg(source_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::failure(version, format!("cannot start {}: {}", program, e)))?;

        let stderr = child.stderr.take();
        let stderr_drain = thread::spawn(move || stderr.and_then(|s| drain(s, "stderr")));
        let from_stdout = child.stdout.take().and_then(|s| drain(s, "stdout"));
        let from_stderr = stderr_drain.join().ok().flatten();

        let status = child.wait()?;
        if !status.success() {
            return Err(Self::failure(version, format!("ingester exited with {}", status)));
        }

        // The result line is expected on stdout; stderr is the fallback.
        from_stdout
            .or(from_stderr)
            .ok_or_else(|| Self::failure(version, "ingester printed no count,millis line"))
    }
}
