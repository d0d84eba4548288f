use std::net::TcpListener;

use clap::Parser;
use depthtk::estimate::EstimatorKind;
use depthtk::playback::FfmpegOpener;
use depthtk::protocol::{PlaybackService, ServerIdent, DEFAULT_PLAYBACK_PORT};

/// Streams video frames and their depth maps to clients over TCP.
///
/// Clients pick the media with IMAGE_AND_DEPTH_REQUEST_PLAY and then poll
/// IMAGE_AND_DEPTH; frames are paced at the media's native frame rate.
#[derive(Parser)]
struct Args {
    /// Media to start playing right away, before any client asks
    media: Option<String>,

    /// Address to listen on
    #[clap(short, long, default_value = "0.0.0.0")]
    address: String,

    #[clap(short, long, default_value_t = DEFAULT_PLAYBACK_PORT)]
    port: u16,

    /// Downscale served frames above this many pixels, non-positive to disable
    #[clap(short, long, default_value_t = 0, allow_negative_numbers = true)]
    max_pixels: i64,

    #[clap(long, value_enum, default_value = "luma")]
    estimator: EstimatorKind,
}

fn main() {
    env_logger::init();
    let args: Args = Args::parse();

    let listener = TcpListener::bind((args.address.as_str(), args.port))
        .expect("Should be able to bind the listen address");
    println!("Serving playback on {}:{}", args.address, args.port);

    let mut service = PlaybackService::new(
        args.estimator.build(),
        Box::new(FfmpegOpener),
        args.max_pixels,
        ServerIdent::new(),
    );
    if let Some(media) = &args.media {
        if let Err(e) = service.play_media(media) {
            eprintln!("Error: cannot play {media}: {e}");
            std::process::exit(1);
        }
    }

    let mut server = service.into_server();
    server.serve(&listener);
}
