use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set. Safe to call more than once; later calls are
/// ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            // Debug build: show debug logs for our crate, info for others
            EnvFilter::new("outbox=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub fn fmt_ms(d: std::time::Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 { "<1ms".into() } else { format!("{}ms", ms) }
}
