use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "WPGRAFT_LOG";

/// Install the global subscriber. Records go to stderr so command output on
/// stdout stays machine readable. Safe to call more than once.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = if json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.try_init()
    };
}
