//! Shared plumbing for the harness binaries.

use tracing::Level;

/// Maps the number of `-v` flags to a max log level.
#[must_use]
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Installs the fmt subscriber on stderr. Stdout stays free for results.
pub fn init_tracing(verbosity: u8) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level_for(verbosity))
            .with_writer(std::io::stderr)
            .finish(),
    )
}
