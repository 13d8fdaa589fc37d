use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber once per test binary. Honours `RUST_LOG`.
pub fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
