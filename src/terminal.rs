//! Terminal concerns: tracing setup and progress display decisions.

use std::io::IsTerminal;

use crate::app_config::VerbositySetting;

pub(crate) fn no_color_env_requested() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

/// Log level when `RUST_LOG` is unset.
///
/// Priority: quiet flag > verbose flag > config file verbosity > `info`.
pub(crate) fn resolve_default_log_level(
    verbose: u8,
    quiet: bool,
    file_verbosity: VerbositySetting,
) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => file_verbosity.log_level(),
        1 => "debug",
        _ => "trace",
    }
}

pub(crate) fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(!no_color_env_requested() && !is_dumb_terminal())
        .with_env_filter(filter)
        .try_init();
}

pub(crate) fn should_show_progress(
    stderr_is_terminal: bool,
    quiet: bool,
    json: bool,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !quiet && !json && !dumb_terminal
}

pub(crate) fn progress_enabled(quiet: bool, json: bool) -> bool {
    should_show_progress(
        std::io::stderr().is_terminal(),
        quiet,
        json,
        is_dumb_terminal(),
    )
}
