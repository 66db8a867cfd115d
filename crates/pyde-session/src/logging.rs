//! Tracing setup for the console binary.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins when set. Otherwise `PYDE_LOG` picks the level for this
/// crate (default `warn`, so the terminal transcript stays readable).
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    let (filter, source) = match std::env::var("RUST_LOG") {
        Ok(_) => (EnvFilter::from_default_env(), "RUST_LOG"),
        Err(_) => {
            let level = std::env::var("PYDE_LOG").ok();
            (EnvFilter::new(filter_directives(level.as_deref())), "PYDE_LOG")
        }
    };
    let directives = filter.to_string();
    let json = wants_json(std::env::var("LOG_FORMAT").ok().as_deref());

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let installed = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .try_init()
    };

    // A subscriber already set (tests, embedding) keeps its own filter.
    if installed.is_ok() {
        tracing::debug!(%directives, source, json, "Tracing initialized");
    }
}

fn filter_directives(level: Option<&str>) -> String {
    let level = match level.map(str::trim) {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("error") => "error",
        Some("off") => "off",
        // Includes "warn" and "warning".
        _ => "warn",
    };
    format!("pyde_session={level},pyde={level}")
}

fn wants_json(format: Option<&str>) -> bool {
    format.is_some_and(|f| f.trim().eq_ignore_ascii_case("json"))
}
