//! Diagnostic logging to stderr.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose level follows `-v`; everything else stays at `warn`.
const ENGINE_TARGETS: [&str; 6] = [
    "esgf",
    "esgf_core",
    "esgf_search",
    "esgf_auth",
    "esgf_store",
    "esgf_harvest",
];

/// `RUST_LOG` wins over the verbosity flag when set.
pub fn init(verbosity: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(verbosity)));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

fn directives(verbosity: u8) -> String {
    let level = match verbosity {
        0 => return "warn".to_string(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let engine: Vec<String> = ENGINE_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect();
    format!("warn,{}", engine.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_by_default() {
        assert_eq!(directives(0), "warn");
    }

    #[test]
    fn verbosity_only_raises_engine_crates() {
        let filter = directives(2);
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("esgf_harvest=debug"));
        assert!(filter.contains("esgf_search=debug"));
        assert!(!filter.contains("reqwest"));
        assert!(directives(9).contains("esgf_auth=trace"));
    }
}
