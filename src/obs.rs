//! Tracing setup and log redaction helpers.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cpf_sms_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Masks all but the last `visible` characters, keeping a leading `+`.
///
/// CPFs and phone numbers go through this before reaching any log line.
pub fn mask(value: &str, visible: usize) -> String {
    let (prefix, rest) = match value.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", value),
    };
    let total = rest.chars().count();
    let hidden = total.saturating_sub(visible);
    let tail: String = rest.chars().skip(hidden).collect();
    format!("{}{}{}", prefix, "*".repeat(hidden), tail)
}
