//! Common test utilities shared across integration and E2E tests

pub mod test_server;

pub use test_server::*;

/// Setup logging for tests
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("pyrun_sandbox=debug,pyrun_server=debug")
        .with_test_writer()
        .try_init();
}

/// Whether the host can run the Python scenarios
pub fn python_available() -> bool {
    which::which("python3").is_ok()
}
