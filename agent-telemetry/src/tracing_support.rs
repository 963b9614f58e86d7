//! Structured tracing bootstrap.

use tracing_subscriber::EnvFilter;

use crate::{TelemetryError, TelemetryResult};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
///
/// # Errors
///
/// Returns [`TelemetryError::Subscriber`] when the fallback filter does not
/// parse or a global subscriber is already set.
pub fn init(default_filter: &str) -> TelemetryResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter).map_err(|err| TelemetryError::Subscriber {
            reason: format!("invalid filter `{default_filter}`: {err}"),
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| TelemetryError::Subscriber {
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_reported() {
        let _ = init(DEFAULT_FILTER);
        let err = init(DEFAULT_FILTER).expect_err("subscriber already installed");
        assert!(matches!(err, TelemetryError::Subscriber { .. }));
    }
}
