//! Structured logging initialization for the gateway.
//!
//! Wraps `logforth` so the rest of the workspace only depends on the `log`
//! facade and never touches a specific backend directly.

use std::{fmt::Write, io::IsTerminal, str::FromStr, sync::Once};

use config::TelemetryConfig;
use logforth::{append::Stderr, filter::EnvFilter, layout::Layout};

static INIT: Once = Once::new();

/// Initializes the global logger from `config`, honoring `RUST_LOG` if set.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init(config: &TelemetryConfig) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());

    INIT.call_once(move || {
        let layout = if std::io::stderr().is_terminal() {
            UtcLayout::new()
        } else {
            UtcLayout::new().no_color()
        };

        logforth::builder()
            .dispatch(move |d| {
                let filter = EnvFilter::from_str(&filter).unwrap_or_else(|_| EnvFilter::from_str("info").unwrap());
                d.filter(filter).append(Stderr::default().with_layout(layout))
            })
            .apply();
    });
}

/// Log layout that renders timestamps in UTC, matching the teacher's stderr format.
#[derive(Debug)]
struct UtcLayout {
    no_color: bool,
}

impl UtcLayout {
    fn new() -> Self {
        Self { no_color: false }
    }

    fn no_color(mut self) -> Self {
        self.no_color = true;
        self
    }
}

impl Layout for UtcLayout {
    fn format(
        &self,
        record: &log::Record<'_>,
        _diagnostics: &[Box<dyn logforth::diagnostic::Diagnostic>],
    ) -> anyhow::Result<Vec<u8>> {
        let mut output = String::new();

        let now = jiff::Zoned::now().with_time_zone(jiff::tz::TimeZone::UTC);
        write!(output, "{} ", now.strftime("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = if self.no_color {
            format!("{:>5}", record.level())
        } else {
            match record.level() {
                log::Level::Error => format!("\x1b[31m{:>5}\x1b[0m", record.level()),
                log::Level::Warn => format!("\x1b[33m{:>5}\x1b[0m", record.level()),
                log::Level::Info => format!("\x1b[32m{:>5}\x1b[0m", record.level()),
                log::Level::Debug => format!("\x1b[34m{:>5}\x1b[0m", record.level()),
                log::Level::Trace => format!("\x1b[35m{:>5}\x1b[0m", record.level()),
            }
        };

        write!(output, "{level}  {}", record.args())?;

        Ok(output.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_does_not_panic_on_repeated_calls() {
        let config = TelemetryConfig {
            log_level: "debug".to_string(),
        };

        init(&config);
        init(&config);
    }
}
