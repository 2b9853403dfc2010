use crate::config::ensure_logs_dir;
use std::sync::{LazyLock, Mutex};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static LOGGER_INITIALIZED: std::sync::Once = std::sync::Once::new();

// Keep the guard alive for the lifetime of the program
static FILE_APPENDER_GUARD: LazyLock<Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>> =
    LazyLock::new(|| Mutex::new(None));

pub const LOG_FILE_NAME: &str = "cli.log";

/// Default console filter; `RUST_LOG` overrides it
pub fn console_directive(verbose: bool) -> &'static str {
    if verbose {
        "info"
    } else {
        "warn"
    }
}

pub fn init_logging(verbose: bool) {
    LOGGER_INITIALIZED.call_once(|| {
        let console_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(console_directive(verbose)));

        // Console logging on stderr so scan output on stdout stays clean
        let console_layer = fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_filter(console_filter);

        // File logging is best effort
        let file_layer = match ensure_logs_dir() {
            Ok(logs_dir) => {
                let file_appender = tracing_appender::rolling::never(&logs_dir, LOG_FILE_NAME);
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                if let Ok(mut guard_mutex) = FILE_APPENDER_GUARD.lock() {
                    *guard_mutex = Some(guard);
                }

                let file_filter = EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("codethreat_cli=debug,info"));

                Some(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_timer(ChronoLocal::rfc_3339())
                        .with_target(true)
                        .with_filter(file_filter),
                )
            }
            Err(_) => None,
        };

        // Another subscriber may already be installed (tests, embedding)
        let _ = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init();
    });
}
