//! Logging setup for Parlor
//!
//! `RUST_LOG` wins when set; otherwise `parlor=<level>,info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub fn default_filter(log_level: &str) -> String {
    format!("parlor={},info", log_level)
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert_eq!(default_filter("debug"), "parlor=debug,info");
        assert!(EnvFilter::try_new(default_filter("warn")).is_ok());
    }
}
