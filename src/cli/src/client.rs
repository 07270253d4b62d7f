//! HTTP client for communicating with the Steward API server.

use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// API response wrapper matching the server's envelope.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

/// Error body returned by the server for non-2xx responses.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: Option<String>,
    code: Option<String>,
    agent_id: Option<String>,
    protection_level: Option<String>,
}

/// A request the server rejected.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("agent '{agent_id}' is {level}-protected: {message}")]
    Protected {
        agent_id: String,
        level: String,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error ({status}){}: {message}", code.as_deref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
    Status {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("API error: {0}")]
    Envelope(String),
}

impl ApiError {
    fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed.error.unwrap_or_else(|| body.trim().to_string());

        match (status, parsed.agent_id, parsed.protection_level) {
            (StatusCode::FORBIDDEN, Some(agent_id), Some(level)) => Self::Protected {
                agent_id,
                level,
                message,
            },
            (StatusCode::NOT_FOUND, _, _) => Self::NotFound(message),
            _ => Self::Status {
                status,
                code: parsed.code,
                message,
            },
        }
    }
}

/// HTTP client for the Steward API.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn delete<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        self.request(Method::DELETE, path, Some(body)).await
    }

    /// Send a request and unwrap the `data` field of the envelope.
    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method.clone(), &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder
            .send()
            .await
            .with_context(|| format!("{} {} failed", method, url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status, &body).into());
        }

        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;

        if api_resp.success {
            api_resp
                .data
                .ok_or_else(|| anyhow::anyhow!("API returned success but no data"))
        } else {
            Err(ApiError::Envelope(api_resp.error.unwrap_or_else(|| "Unknown error".into())).into())
        }
    }

    /// Perform a raw GET request and return the full JSON value (for health endpoints).
    ///
    /// A 503 still carries a health report, so it is returned rather than
    /// treated as an error.
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() && status != StatusCode::SERVICE_UNAVAILABLE {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status, &body).into());
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_error_body() {
        let body = r#"{"success":false,"error":"Agent leads-agent is system-managed","code":"AgentProtected","agentId":"leads-agent","protectionLevel":"system"}"#;
        let error = ApiError::from_response(StatusCode::FORBIDDEN, body);
        assert!(matches!(error, ApiError::Protected { ref agent_id, .. } if agent_id == "leads-agent"));
        assert!(error.to_string().contains("system-protected"));
    }

    #[test]
    fn test_status_error_keeps_code() {
        let body = r#"{"success":false,"error":"Invalid configuration","code":"INVALID_CONFIGURATION"}"#;
        let error = ApiError::from_response(StatusCode::BAD_REQUEST, body);
        let message = error.to_string();
        assert!(message.contains("400"));
        assert!(message.contains("[INVALID_CONFIGURATION]"));
    }

    #[test]
    fn test_non_json_error_body() {
        let error = ApiError::from_response(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert!(error.to_string().ends_with("upstream down"));
    }
}
