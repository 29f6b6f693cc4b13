//! This module contains the command-line interface for the server.
//!
//! It uses the `clap` crate to parse command-line arguments. The main entry
//! point is the `run` function, which applies CLI overrides to the loaded
//! configuration and drives the server until interrupted.

use std::path::PathBuf;

use clap::Parser;
use config::Config;

pub use self::logging::init_global_subscriber;

pub mod logging;

//================================================================================================
// Types
//================================================================================================

/// The top-level command-line arguments for the server.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Run as if started from this directory.
    ///
    /// The change happens before configuration is loaded, so a relative
    /// `repo_root` (and any other relative path in the config file)
    /// resolves against DIR rather than the invocation directory.
    #[arg(
        short = 'C',
        value_name = "DIR",
        global = true,
        value_parser = |dir: &str| std::fs::canonicalize(dir),
    )]
    working_directory: Option<PathBuf>,

    /// Read configuration from this file in addition to the default
    /// locations.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the configured HTTP port; `0` binds an ephemeral port.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Override the configured repository root directory.
    #[arg(long, value_name = "DIR")]
    pub repo_root: Option<PathBuf>,

    /// Arguments for controlling logging behavior.
    #[command(flatten)]
    pub log: LogArgs,
}

/// Arguments for controlling logging behavior.
#[derive(Parser, Clone, Copy, Debug)]
#[command(next_help_heading = "Log Options")]
pub struct LogArgs {
    /// Set the level of verbosity.
    ///
    /// This flag can be used multiple times to increase verbosity:
    /// - `-v` for DEBUG level
    /// - `-vv` for TRACE level
    ///
    /// If not specified, defaults to the configured `logs.level`.
    ///
    /// Alternatively, set the `RUST_LOG` environment variable (e.g., `RUST_LOG=info`), which takes
    /// precedence over this flag.
    ///
    /// **Note**: This flag is silently ignored when `--quiet` is also set.
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase logging verbosity",
    )]
    verbosity: u8,

    /// Suppress verbosity, taking precedence over other flags.
    ///
    /// This flag can be used multiple times to decrease verbosity:
    /// - `-q` for WARN level
    /// - `-qq` for ERROR level
    ///
    /// This flag *overrides* any verbosity settings. It takes precedence over both the
    /// `--verbosity` flag and the `RUST_LOG` environment variable.
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        global = true,
    )]
    quiet: u8,
}

//================================================================================================
// Functions
//================================================================================================

/// Runs the server until interrupted.
pub async fn run(args: Args, mut config: Config) -> anyhow::Result<()> {
    if let Some(port) = args.port {
        config.listen.http.port = port;
    }
    if let Some(root) = args.repo_root {
        config.repo_root = root;
    }

    let server = crate::server::Server::new(config);
    let started = server.start().await?;
    tracing::info!(
        http = started.http_port,
        https = started.https_port,
        "listening"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}

/// Applies the `-C <dir>` flag before argument parsing proper.
///
/// Relative `repo_root` settings resolve against the working directory,
/// so the directory change must happen before the configuration loads,
/// which is earlier than clap hands back parsed arguments. The flag is
/// therefore picked out of the raw argument list here; clap re-parses it
/// afterwards for validation and `--help` output.
pub fn change_directory() -> Vec<String> {
    let args: Vec<String> = std::env::args().collect();
    let dir = args
        .iter()
        .position(|arg| arg == "-C")
        .and_then(|flag| args.get(flag + 1));
    if let Some(dir) = dir {
        if let Err(e) = std::env::set_current_dir(dir) {
            eprintln!("localhub: cannot enter {dir}: {e}");
        }
    }
    args
}
