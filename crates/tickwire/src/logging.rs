use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that prints to stdout.
///
/// Honours `RUST_LOG`; defaults to `info`. Calling it again, or after
/// another subscriber was installed, does nothing.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .try_init();
}
