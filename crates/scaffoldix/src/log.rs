use tracing::{Level, level_filters::LevelFilter};
use tracing_subscriber::{
    EnvFilter, filter::filter_fn, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Initialize logging using the tracing crate.
///
/// Uses the `WARN` level by default; customize it with the `SCAFFOLDIX_LOG`
/// environment variable, falling back to `RUST_LOG` or the verbosity flags.
pub fn init(verbosity: Option<LevelFilter>) {
    let env_filter = EnvFilter::try_from_env("SCAFFOLDIX_LOG").unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(verbosity.unwrap_or(LevelFilter::WARN).into())
            .from_env_lossy()
    });

    let verbose = env_filter
        .max_level_hint()
        .is_some_and(|level| level > Level::INFO);

    // Spans only show up once the user asks for verbose output.
    let ignore_info_spans = filter_fn(move |metadata| {
        let is_trace_or_debug = || metadata.level() < &Level::INFO;
        verbose || !metadata.is_span() || is_trace_or_debug()
    });

    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
        .finish()
        .with(ignore_info_spans)
        .init();
}
