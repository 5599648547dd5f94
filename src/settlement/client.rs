use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Reference used when the authority answers without any known identifier.
pub const REFERENCE_SENTINEL: &str = "N/A";

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub success: bool,
    pub reference_id: Option<String>,
    pub raw_response: Value,
}

/// Failures on the outbound leg. These never reach a caller synchronously;
/// the dispatch task folds them into job state.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("connection error: {0}")]
    Transport(String),
    #[error("registration timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid response: {0}")]
    MalformedResponse(String),
}

/// key: settlement-registration-client -> settlement authority transport
#[async_trait]
pub trait RegistrationClient: Send + Sync {
    async fn register(&self, payload: &Value) -> Result<RegistrationOutcome, RegistrationError>;
}

/// Ordered list of response fields that may carry the authority's reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceExtractor {
    candidates: Vec<String>,
}

impl Default for ReferenceExtractor {
    fn default() -> Self {
        Self::new(["codigo", "codigoInterno", "protocolo"])
    }
}

impl ReferenceExtractor {
    pub fn new<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// First candidate holding a non-empty string or a number wins.
    pub fn extract(&self, body: &Value) -> Option<String> {
        self.candidates
            .iter()
            .find_map(|field| match body.get(field.as_str()) {
                Some(Value::String(value)) if !value.trim().is_empty() => {
                    Some(value.trim().to_string())
                }
                Some(Value::Number(value)) => Some(value.to_string()),
                _ => None,
            })
    }
}

pub struct HttpRegistrationClient {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
    timeout: Duration,
    extractor: ReferenceExtractor,
}

impl HttpRegistrationClient {
    pub fn new(
        endpoint: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
        extractor: ReferenceExtractor,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build registration client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            auth_token,
            timeout,
            extractor,
        })
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.auth_token {
            request.bearer_auth(token)
        } else {
            request
        }
    }
}

#[async_trait]
impl RegistrationClient for HttpRegistrationClient {
    async fn register(&self, payload: &Value) -> Result<RegistrationOutcome, RegistrationError> {
        tracing::info!(endpoint = %self.endpoint, "sending settlement registration");
        let response = self
            .auth(self.client.post(&self.endpoint))
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, "no-cache")
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RegistrationError::Timeout(self.timeout)
                } else {
                    RegistrationError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| {
            if err.is_timeout() {
                RegistrationError::Timeout(self.timeout)
            } else {
                RegistrationError::Transport(err.to_string())
            }
        })?;
        tracing::debug!(status = status.as_u16(), %body, "registration response received");

        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(RegistrationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|_| RegistrationError::MalformedResponse(body.clone()))?;
        if !parsed.is_object() {
            return Err(RegistrationError::MalformedResponse(body));
        }

        Ok(RegistrationOutcome {
            success: true,
            reference_id: self.extractor.extract(&parsed),
            raw_response: parsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extractor_honours_priority_order() {
        let extractor = ReferenceExtractor::default();
        let body = json!({ "protocolo": "P-3", "codigoInterno": "I-2" });
        assert_eq!(extractor.extract(&body).as_deref(), Some("I-2"));
        let body = json!({ "codigo": "C-1", "protocolo": "P-3" });
        assert_eq!(extractor.extract(&body).as_deref(), Some("C-1"));
    }

    #[test]
    fn extractor_skips_blank_and_structured_values() {
        let extractor = ReferenceExtractor::default();
        let body = json!({ "codigo": "  ", "codigoInterno": { "id": 1 }, "protocolo": 998877 });
        assert_eq!(extractor.extract(&body).as_deref(), Some("998877"));
    }

    #[test]
    fn extractor_reports_absence() {
        let extractor = ReferenceExtractor::new(["numeroProtocolo"]);
        let body = json!({ "codigo": "ignored" });
        assert_eq!(extractor.extract(&body), None);
        assert_eq!(extractor.extract(&json!(["numeroProtocolo"])), None);
        assert_eq!(extractor.candidates(), ["numeroProtocolo".to_string()]);
    }
}
