/// Logging initialization: tracing-subscriber fmt to stderr, filtered by
/// `RUST_LOG` when set.
///
/// Called once at the start of `ChatApp::new()`, before anything else.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gram_core=debug,info".into()),
        )
        .try_init();
}
