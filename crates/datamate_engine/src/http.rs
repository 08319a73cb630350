use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use url::Url;

use crate::types::Envelope;
use crate::{ApiError, FailureKind};

#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Scheme, host and optional path prefix, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub auth_token: Option<String>,
    pub connect_timeout: Duration,
    /// `None` leaves the transport default in place.
    pub request_timeout: Option<Duration>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            auth_token: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
        }
    }
}

impl HttpSettings {
    pub(crate) fn build_client(&self) -> Result<reqwest::Client, ApiError> {
        let mut builder = reqwest::Client::builder().connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|err| ApiError::new(FailureKind::Network, err.to_string()))
    }

    /// Joins `path` onto the base url, keeping any prefix the base carries.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|err| ApiError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    pub(crate) fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

pub(crate) fn json_body(
    request: reqwest::RequestBuilder,
    body: &impl serde::Serialize,
) -> Result<reqwest::RequestBuilder, ApiError> {
    let bytes =
        serde_json::to_vec(body).map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))?;
    Ok(request
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(bytes))
}

/// Sends the request and fails on any non-2xx status.
pub(crate) async fn send(request: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
    let response = request.send().await.map_err(map_reqwest_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::new(
            FailureKind::HttpStatus(status.as_u16()),
            status.to_string(),
        ));
    }
    Ok(response)
}

/// Reads the `data` member of the backend envelope.
pub(crate) async fn read_data<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<Option<T>, ApiError> {
    let bytes = response.bytes().await.map_err(map_reqwest_error)?;
    let envelope: Envelope<T> = serde_json::from_slice(&bytes)
        .map_err(|err| ApiError::new(FailureKind::Decode, err.to_string()))?;
    Ok(envelope.data)
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}
