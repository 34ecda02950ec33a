//! Version Ingester - materializes one version of the reference store.
//!
//! Usage:
//!   version-ingester <store-dir> <version> <source-dir>
//!
//! Progress goes to stderr. The last stdout line is `changes,elapsedMillis`.

use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use versioned_adapter::store::materialize_version;

#[derive(Parser, Debug)]
#[command(name = "version-ingester")]
#[command(about = "Apply a version's change files to the snapshot store")]
struct Args {
    /// Store directory holding the version snapshots
    store_dir: PathBuf,

    /// Version to materialize
    version: u32,

    /// Directory with the change files (`*.nt` additions, `*deleted.nt` deletions)
    source_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let start = Instant::now();
    let changes = materialize_version(&args.store_dir, args.version, &args.source_dir)?;
    let millis = start.elapsed().as_millis();

    eprintln!("Duration: {}ms", millis);
    println!("{},{}", changes, millis);
    Ok(())
}
