use std::net::TcpListener;

use clap::Parser;
use depthtk::estimate::EstimatorKind;
use depthtk::protocol::{EstimatorService, ServerIdent, DEFAULT_COMPUTE_PORT};

/// Serves depth maps for client-supplied images over TCP.
#[derive(Parser)]
struct Args {
    /// Address to listen on
    #[clap(short, long, default_value = "0.0.0.0")]
    address: String,

    #[clap(short, long, default_value_t = DEFAULT_COMPUTE_PORT)]
    port: u16,

    #[clap(long, value_enum, default_value = "luma")]
    estimator: EstimatorKind,
}

fn main() {
    env_logger::init();
    let args: Args = Args::parse();

    let listener = TcpListener::bind((args.address.as_str(), args.port))
        .expect("Should be able to bind the listen address");
    println!("Serving depth maps on {}:{}", args.address, args.port);

    let mut server =
        EstimatorService::new(args.estimator.build(), ServerIdent::new()).into_server();
    server.serve(&listener);
}
