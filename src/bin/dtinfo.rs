use std::path::{Path, PathBuf};

use clap::Parser;
use depthtk::archive::{ArchiveError, ArchiveReader};
use depthtk::formats::depth_map::DepthMapKind;

/// Prints what depth archives hold.
#[derive(Parser)]
struct Args {
    /// Archives to inspect
    #[clap(required = true)]
    archives: Vec<PathBuf>,
}

fn main() {
    env_logger::init();
    let args: Args = Args::parse();

    let mut failed = false;
    for path in &args.archives {
        if let Err(e) = inspect(path) {
            eprintln!("{}: {e}", path.display());
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}

fn inspect(path: &Path) -> Result<(), ArchiveError> {
    let mut reader = ArchiveReader::open(path)?;
    println!("{}", path.display());

    let indices = reader.entry_indices();
    match (indices.first(), indices.last()) {
        (Some(first), Some(last)) => {
            println!("  entries: {} ({first}..={last})", indices.len());
        }
        _ => println!("  entries: 0"),
    }

    if !reader.has_provenance() {
        println!("  no provenance entry");
        return Ok(());
    }
    let record = reader.read_provenance()?;
    println!(
        "  source: {} ({}x{}, {} fps)",
        record.original_name,
        record.original_width,
        record.original_height,
        record.original_framerate
    );
    let kind = DepthMapKind::from_code(record.depth_map_type)
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| format!("kind {}", record.depth_map_type));
    println!(
        "  stored: {}x{} {} ({kind})",
        record.width, record.height, record.model_type
    );
    println!("  sha256: {}", record.hashval);
    println!(
        "  written by {} {} at {}",
        record.program, record.version, record.timestamp
    );
    if record.framecount > 0 && !reader.is_full(record.framecount) {
        println!(
            "  incomplete: {} of {} entries present",
            indices.len(),
            record.framecount
        );
    }
    Ok(())
}
