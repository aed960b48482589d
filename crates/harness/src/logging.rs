use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber once per process. `RUST_LOG`
/// overrides the default `formstore=debug` filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("formstore=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
