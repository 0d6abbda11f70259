use std::env;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use futures::stream::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;

use crate::client_logger::ClientLogger;
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUESTS, CLIENT_REQUEST_ERRORS};
use crate::sse::process_sse;
use crate::types::{ChatCompletion, ChatRequest, ModelList, StreamDelta};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A lazy sequence of streamed chunk deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

/// The narrow transport interface the session engine depends on.
///
/// The session never sees wire-format details; it sends an ordered context
/// and consumes either a complete response or a cancellable delta sequence.
/// Implemented by [`ChatClient`] for real endpoints and by fakes in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Sends a non-streaming request and returns the response text.
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    /// Sends a streaming request and returns the delta sequence.
    async fn stream(&self, request: ChatRequest) -> Result<DeltaStream>;

    /// Lists the model identifiers the endpoint serves, in endpoint order.
    async fn list_models(&self) -> Result<Vec<String>>;
}

/// Client for an OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct ChatClient {
    api_key: Option<String>,
    client: ReqwestClient,
    base_url: String,
    timeout: Duration,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Create a new client for the given base URL.
    ///
    /// The API key can be provided directly or read from the CONFAB_API_KEY
    /// environment variable; local endpoints commonly need none.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        Self::with_options(base_url, api_key, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let api_key = api_key.or_else(|| env::var("CONFAB_API_KEY").ok());

        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            api_key,
            client,
            base_url,
            timeout,
            logger: None,
        })
    }

    /// Attaches a logger that observes requests, deltas, and completions.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Create and return default headers for API requests.
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(api_key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        // Try to parse error response body
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            #[serde(rename = "type")]
            error_type: Option<String>,
            message: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let parsed_error = serde_json::from_str::<ErrorResponse>(&error_body).ok();
        let error_type = parsed_error
            .as_ref()
            .and_then(|e| e.error.as_ref())
            .and_then(|e| e.error_type.clone());
        let error_message = parsed_error
            .as_ref()
            .and_then(|e| e.error.as_ref())
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| error_body.clone());

        // Map HTTP status code to appropriate error type
        match status_code {
            401 | 403 => Error::authentication(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    async fn post_request(&self, request: &ChatRequest, accept: &'static str) -> Result<Response> {
        let url = format!("{}chat/completions", self.base_url);

        CLIENT_REQUESTS.click();
        if let Some(logger) = &self.logger {
            logger.log_request(request);
        }

        let mut headers = self.default_headers()?;
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                self.map_send_error(e)
            })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl Transport for ChatClient {
    async fn complete(&self, mut request: ChatRequest) -> Result<String> {
        request.stream = false;
        let response = self.post_request(&request, "application/json").await?;

        let completion = response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(format!("Failed to parse response: {e}"), Some(Box::new(e)))
        })?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::serialization("Response contained no choices", None))?;
        if let Some(logger) = &self.logger {
            logger.log_completion(&text);
        }
        Ok(text)
    }

    async fn stream(&self, mut request: ChatRequest) -> Result<DeltaStream> {
        request.stream = true;
        let response = self.post_request(&request, "text/event-stream").await?;

        let byte_stream = response.bytes_stream();
        let logger = self.logger.clone();
        let event_stream = process_sse(byte_stream).map(move |item| {
            if let Ok(delta) = &item
                && let Some(logger) = &logger
            {
                logger.log_stream_delta(delta);
            }
            item
        });

        Ok(Box::pin(event_stream))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}models", self.base_url);

        CLIENT_REQUESTS.click();
        let response = self
            .client
            .get(&url)
            .headers(self.default_headers()?)
            .send()
            .await
            .map_err(|e| {
                CLIENT_REQUEST_ERRORS.click();
                self.map_send_error(e)
            })?;

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        let list = response.json::<ModelList>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse model listing: {e}"),
                Some(Box::new(e)),
            )
        })?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

/// Validate the base URL and make sure it ends with a single slash so that
/// endpoint paths can be appended directly.
fn normalize_base_url(base_url: String) -> Result<String> {
    url::Url::parse(&base_url)
        .map_err(|e| Error::url(format!("Invalid base URL '{base_url}': {e}"), Some(e)))?;
    if base_url.ends_with('/') {
        Ok(base_url)
    } else {
        Ok(format!("{base_url}/"))
    }
}
