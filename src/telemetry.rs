//! Telemetry initialization.
//!
//! Controlled by `CONCORD_LOG`:
//! - unset or `"pretty"` → human-readable events to stderr
//! - `"json"` → JSON spans/events to stderr, one object per line
//! - `"off"` → no subscriber (tracing disabled)
//!
//! Filtering follows `RUST_LOG` and defaults to `warn`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Environment variable selecting the log mode.
pub const LOG_MODE_VAR: &str = "CONCORD_LOG";

/// How diagnostics are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Human-readable lines on stderr.
    Pretty,
    /// JSON lines on stderr.
    Json,
    /// Nothing.
    Off,
}

impl LogMode {
    /// Mode named by `value`; unknown names fall back to [`LogMode::Pretty`].
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("json") => Self::Json,
            Some("off" | "none") => Self::Off,
            Some("" | "pretty") | None => Self::Pretty,
            Some(other) => {
                eprintln!("warning: unknown {LOG_MODE_VAR} value '{other}', using pretty");
                Self::Pretty
            }
        }
    }
}

/// Initialize telemetry based on `CONCORD_LOG`.
pub fn init() {
    let mode = LogMode::from_env_value(std::env::var(LOG_MODE_VAR).ok().as_deref());
    match mode {
        LogMode::Off => {}
        LogMode::Pretty => init_pretty(),
        LogMode::Json => init_json(),
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

fn init_pretty() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// JSON spans/events to stderr via tracing-subscriber's JSON formatter.
fn init_json() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!(LogMode::from_env_value(None), LogMode::Pretty);
        assert_eq!(LogMode::from_env_value(Some("json")), LogMode::Json);
        assert_eq!(LogMode::from_env_value(Some("off")), LogMode::Off);
        assert_eq!(LogMode::from_env_value(Some(" pretty ")), LogMode::Pretty);
        assert_eq!(LogMode::from_env_value(Some("bogus")), LogMode::Pretty);
    }
}
