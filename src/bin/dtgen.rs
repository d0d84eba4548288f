use std::path::PathBuf;

use clap::Parser;
use depthtk::estimate::EstimatorKind;
use depthtk::generate::{run_generate, GenerateConfig};

/// Computes a depth map archive from an image or video.
///
/// Rerunning against an existing archive resumes it: entries already
/// present are kept as they are and only the missing frames are computed.
#[derive(Parser)]
struct Args {
    /// Source image or video
    input: PathBuf,

    /// Destination archive, defaults to the input path with .dtz
    output: Option<PathBuf>,

    /// Decode the input as a still image regardless of its extension
    #[clap(short, long)]
    image: bool,

    /// Frames estimated per batch
    #[clap(short, long, default_value_t = 4)]
    batch_size: usize,

    /// Downscale frames above this many pixels, non-positive to disable
    #[clap(short, long, default_value_t = 0, allow_negative_numbers = true)]
    max_pixels: i64,

    /// Start the archive over instead of resuming it
    #[clap(long)]
    replace: bool,

    /// Assemble the archive in memory and move it into place at the end
    #[clap(long)]
    buffered: bool,

    /// Fail immediately instead of prompting when the archive cannot be written
    #[clap(long)]
    no_prompt: bool,

    /// Hide the progress bar
    #[clap(short, long)]
    quiet: bool,

    #[clap(long, value_enum, default_value = "luma")]
    estimator: EstimatorKind,
}

fn main() {
    env_logger::init();
    let args: Args = Args::parse();

    let config = GenerateConfig {
        input: args.input,
        output: args.output,
        force_image: args.image,
        batch_size: args.batch_size,
        max_pixels: args.max_pixels,
        update: !args.replace,
        buffered: args.buffered,
        interactive: !args.no_prompt,
        show_progress: !args.quiet,
    };

    match run_generate(&config, args.estimator.build()) {
        Ok(report) => {
            println!(
                "{}: {} entries written, {} already present",
                report.archive.display(),
                report.entries_written,
                report.entries_skipped
            );
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
