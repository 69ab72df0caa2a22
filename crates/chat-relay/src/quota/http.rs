//! HTTP-backed quota gate
//!
//! Posts `{"userId": ...}` to the accounting endpoint and reads the
//! `message` field of the reply: `"success"` means the user is within quota.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::QuotaGate;
use crate::chat::QuotaOutcome;

const SUCCESS_MESSAGE: &str = "success";

#[derive(Debug, Serialize)]
struct UsageRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    message: Option<String>,
}

/// Quota gate that calls a usage accounting service over HTTP
#[derive(Debug, Clone)]
pub struct HttpQuotaGate {
    client: Client,
    url: String,
}

impl HttpQuotaGate {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl QuotaGate for HttpQuotaGate {
    async fn check(&self, user_id: &str) -> QuotaOutcome {
        let response = match self
            .client
            .post(&self.url)
            .json(&UsageRequest { user_id })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(user_id, error_message = %e, "Quota check failed, using fallback model");
                return QuotaOutcome::error();
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(user_id, %status, "Quota service returned error, using fallback model");
            return QuotaOutcome::error();
        }

        match response.json::<UsageResponse>().await {
            Ok(UsageResponse { message }) if message.as_deref() == Some(SUCCESS_MESSAGE) => {
                QuotaOutcome::ok()
            }
            Ok(UsageResponse { message }) => {
                debug!(user_id, ?message, "Quota exceeded");
                QuotaOutcome::exceeded()
            }
            Err(e) => {
                warn!(user_id, error_message = %e, "Unreadable quota response, using fallback model");
                QuotaOutcome::error()
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
