//! The main entry point for the localhub server.

#![warn(missing_docs)]

use std::process::ExitCode;

use clap::Parser;
use localhub::cli::{self, Args};

/// The main entry point for the localhub server.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_from(cli::change_directory());
    let config = config::Config::load(args.config.as_deref());

    let _guard = cli::init_global_subscriber(args.log, &config.logs);

    if let Err(e) = cli::run(args, config).await {
        localhub::fatal!(e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
