use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingLevel;

/// Install the global subscriber: `RUST_LOG` plus an `imagegate=<level>`
/// directive. Logs go to stderr so stdout stays machine-readable.
pub fn init(level: LoggingLevel, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(
        format!("imagegate={}", level.as_str())
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
