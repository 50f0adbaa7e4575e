use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use crate::autosave::{DiagramBackend, SaveTransport};
use crate::diagram::{DiagramContent, DiagramRecord, DiagramSummary};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(5);
pub const TRANSPORT_HEADER: &str = "X-Save-Transport";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("diagram not found")]
    NotFound,
    #[error("credential was rejected")]
    Unauthorized,
    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

/// HTTP client for the diagram API. Forwards the bearer credential as is.
#[derive(Debug, Clone)]
pub struct DiagramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl DiagramClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.token)
    }

    async fn check(response: Response) -> Result<Response, ClientError> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::Status { status, body })
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = Self::check(self.authorized(request).send().await?).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|err| ClientError::Decode(err.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<DiagramSummary>, ClientError> {
        self.fetch(self.http.get(self.url("/diagrams"))).await
    }

    pub async fn create(&self, name: &str) -> Result<DiagramRecord, ClientError> {
        self.fetch(
            self.http
                .post(self.url("/diagrams"))
                .json(&json!({ "name": name })),
        )
        .await
    }

    pub async fn get(&self, id: &str) -> Result<DiagramRecord, ClientError> {
        self.fetch(self.http.get(self.url(&format!("/diagrams/{id}"))))
            .await
    }

    /// Replaces the stored nodes and connections.
    pub async fn update(
        &self,
        id: &str,
        content: &DiagramContent,
        transport: SaveTransport,
    ) -> Result<DiagramRecord, ClientError> {
        let mut request = self
            .http
            .put(self.url(&format!("/diagrams/{id}")))
            .json(content);
        if transport == SaveTransport::Keepalive {
            request = request
                .header(TRANSPORT_HEADER, transport.as_str())
                .timeout(KEEPALIVE_TIMEOUT);
        }
        self.fetch(request).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ClientError> {
        let request = self.http.delete(self.url(&format!("/diagrams/{id}")));
        Self::check(self.authorized(request).send().await?).await?;
        Ok(())
    }
}

impl DiagramBackend for DiagramClient {
    async fn save(
        &self,
        diagram_id: &str,
        content: &DiagramContent,
        transport: SaveTransport,
    ) -> crate::Result<()> {
        self.update(diagram_id, content, transport).await?;
        Ok(())
    }
}
