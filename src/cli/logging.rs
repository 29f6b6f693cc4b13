//! Handles logging for the server process.

use std::io::IsTerminal;
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

use super::LogArgs;

//================================================================================================
// Macros
//================================================================================================

/// Logs an unrecoverable error right before the process exits.
///
/// The alternate formatting prints the full error chain, which is where
/// startup failures (bad config, ports in use) carry their context.
#[macro_export]
macro_rules! fatal {
    ($error:expr) => {
        tracing::error!(fatal = true, "fatal: {:#}", $error);
    };
}

//================================================================================================
// Functions
//================================================================================================

/// Initializes the global tracing subscriber.
///
/// Interactive terminals get a compact human layer on stderr; otherwise
/// logs are emitted as JSON. When `logs.logs_dir` is configured an
/// additional JSON layer writes to a daily-rolling file through a
/// non-blocking worker. The returned guards must be held for the life of
/// the process so buffered log lines are flushed on shutdown.
pub fn init_global_subscriber(args: LogArgs, logs: &config::Logs) -> Vec<WorkerGuard> {
    let level = resolve_level(args, &logs.level);
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let mut guards = Vec::new();

    let fmt = if std::io::stderr().is_terminal() {
        fmt::layer()
            .without_time()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed()
    } else {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
        guards.push(guard);
        fmt::layer().with_ansi(false).json().with_writer(writer).boxed()
    };

    let file = logs.logs_dir.as_ref().map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, "localhub.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        fmt::layer()
            .with_ansi(false)
            .json()
            .with_writer(writer)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(fmt)
        .with(file)
        .with(env_filter)
        .init();

    guards
}

/// Picks the level filter: `-q`/`-qq` win, then `RUST_LOG`, then `-v`
/// flags, then the configured `logs.level`.
fn resolve_level(args: LogArgs, configured: &str) -> LevelFilter {
    if args.quiet > 0 {
        return if args.quiet == 1 {
            LevelFilter::WARN
        } else {
            LevelFilter::ERROR
        };
    }

    let env_level = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .and_then(|value| LevelFilter::from_str(&value).ok());
    if let Some(level) = env_level {
        return level;
    }

    match args.verbosity {
        0 => LevelFilter::from_str(configured).unwrap_or(LevelFilter::INFO),
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
