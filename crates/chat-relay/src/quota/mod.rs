//! Quota gate for model tier selection
//!
//! The gate asks an external usage accounting service whether a user may
//! use the requested model. It never rejects a request: a non-OK outcome
//! only downgrades the model to the configured fallback.

mod http;

pub use http::HttpQuotaGate;

use async_trait::async_trait;

use crate::chat::QuotaOutcome;
use crate::config::ProviderConfig;

/// Trait for usage accounting backends
#[async_trait]
pub trait QuotaGate: Send + Sync {
    /// Check (and record) usage for a user
    ///
    /// Infallible by contract: implementations map their own failures to
    /// `QuotaOutcome::error()`.
    async fn check(&self, user_id: &str) -> QuotaOutcome;

    /// Gate name for logging
    fn name(&self) -> &'static str;
}

/// Gate used when no accounting endpoint is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmeteredQuotaGate;

#[async_trait]
impl QuotaGate for UnmeteredQuotaGate {
    async fn check(&self, _user_id: &str) -> QuotaOutcome {
        QuotaOutcome::ok()
    }

    fn name(&self) -> &'static str {
        "unmetered"
    }
}

/// Pick the model for a request given its quota outcome.
///
/// A non-OK outcome forces the fallback model regardless of what the client
/// asked for. Otherwise the requested model wins, or the default when the
/// client sent none.
pub fn select_model(outcome: &QuotaOutcome, requested: Option<&str>, config: &ProviderConfig) -> String {
    if !outcome.is_ok() {
        return config.fallback_model.clone();
    }

    requested
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(&config.default_model)
        .to_string()
}
