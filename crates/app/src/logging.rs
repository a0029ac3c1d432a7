use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DIRECTIVES: &str = "info";

/// Install the global subscriber. Events go to stderr; stdout carries the dialogue.
///
/// The filter comes from `TUTOR_LOG`, then `RUST_LOG`, then `info`.
pub fn init_tracing() {
    let directives = filter_directives(|name| std::env::var(name).ok());
    let env_filter =
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}

fn filter_directives<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("TUTOR_LOG")
        .or_else(|| lookup("RUST_LOG"))
        .filter(|raw| !raw.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string())
}
