use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use reqwest::Client as ReqwestClient;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use thiserror::Error;
use url::Url;

pub type PostFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
pub type PostResult<T> = Result<T, PostError>;

/// Default total request timeout, applied unless overridden per client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostErrorKind {
    InvalidEndpoint,
    Connect,
    Send,
    Receive,
    Timeout,
    Rejected,
    Serialize,
    Internal,
}

#[derive(Clone, Debug, Error)]
#[error("post error {kind:?} status={status:?} retryable={retryable} {message}")]
pub struct PostError {
    kind: PostErrorKind,
    status: Option<u16>,
    message: String,
    retryable: bool,
}

impl PostError {
    pub fn new(
        kind: PostErrorKind,
        status: Option<u16>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            retryable,
        }
    }

    pub fn invalid_endpoint(endpoint: &str, reason: impl Into<String>) -> Self {
        Self::new(
            PostErrorKind::InvalidEndpoint,
            None,
            format!("invalid endpoint `{endpoint}`: {}", reason.into()),
            false,
        )
    }

    pub fn connect(message: impl Into<String>, status: Option<u16>, retryable: bool) -> Self {
        Self::new(PostErrorKind::Connect, status, message, retryable)
    }

    pub fn send(message: impl Into<String>, status: Option<u16>, retryable: bool) -> Self {
        Self::new(PostErrorKind::Send, status, message, retryable)
    }

    pub fn receive(message: impl Into<String>, status: Option<u16>, retryable: bool) -> Self {
        Self::new(PostErrorKind::Receive, status, message, retryable)
    }

    pub fn timeout(message: impl Into<String>, status: Option<u16>, retryable: bool) -> Self {
        Self::new(PostErrorKind::Timeout, status, message, retryable)
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::new(PostErrorKind::Rejected, Some(status), message, true)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(PostErrorKind::Internal, None, message, false)
    }

    pub fn from_json(err: sonic_rs::Error) -> Self {
        Self::new(PostErrorKind::Serialize, None, err.to_string(), false)
    }

    fn from_reqwest(phase: PostErrorKind, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            PostErrorKind::Timeout
        } else if err.is_connect() {
            PostErrorKind::Connect
        } else {
            phase
        };
        let status = err.status().map(|s| s.as_u16());
        let retryable = err.is_timeout() || err.is_connect() || err.is_request();
        Self {
            kind,
            status,
            message: err.to_string(),
            retryable,
        }
    }

    pub fn kind(&self) -> PostErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[derive(Clone, Debug)]
pub struct PostRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Duration,
}

impl PostRequest {
    pub fn new(url: Url, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            headers: Vec::new(),
            body: body.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Clone, Debug)]
pub struct PostResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub elapsed: Duration,
}

impl PostResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub trait PostTransport: Send + Sync {
    fn execute(&self, request: PostRequest) -> PostFuture<PostResult<PostResponse>>;
}

pub type SharedPostTransport = dyn PostTransport + Send + Sync;

#[derive(Clone)]
pub struct Client {
    transport: Arc<SharedPostTransport>,
    timeout: Duration,
    strip_newlines: bool,
}

impl Client {
    pub fn new() -> Self {
        Self::with_transport(ReqwestTransport::new())
    }

    pub fn with_transport<T>(transport: T) -> Self
    where
        T: PostTransport + 'static,
    {
        Self {
            transport: Arc::new(transport),
            timeout: DEFAULT_TIMEOUT,
            strip_newlines: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disables the newline stripping that `invoke` applies to the payload.
    ///
    /// Stripping is on by default and removes every `\n` and `\r` before
    /// transmission, which corrupts JSON carrying raw newlines inside string
    /// values. Callers that need such payloads opt out here.
    pub fn keep_newlines(mut self) -> Self {
        self.strip_newlines = false;
        self
    }

    /// Posts `payload` to `endpoint` as JSON and returns the response body as
    /// text.
    ///
    /// `credential`, when present, is inserted verbatim into an
    /// `Authorization: Basic <credential>` header; the caller supplies the
    /// base64-encoded `user:password` form. A non-2xx status is surfaced as a
    /// `Rejected` error carrying the status and response body.
    pub async fn invoke(
        &self,
        payload: &str,
        endpoint: &str,
        credential: Option<&str>,
    ) -> PostResult<String> {
        let url = Self::parse_endpoint(endpoint)?;
        let response = self.dispatch(url, self.normalize(payload), credential).await?;
        Self::into_text(response)
    }

    /// Same request pipeline as `invoke`, but hands back the full response
    /// without the success check.
    pub async fn invoke_response(
        &self,
        payload: &str,
        endpoint: &str,
        credential: Option<&str>,
    ) -> PostResult<PostResponse> {
        let url = Self::parse_endpoint(endpoint)?;
        self.dispatch(url, self.normalize(payload), credential).await
    }

    /// Serializes `payload` and posts it. Serialized JSON never carries raw
    /// newlines, so the body skips normalization.
    pub async fn invoke_json<T: Serialize>(
        &self,
        payload: &T,
        endpoint: &str,
        credential: Option<&str>,
    ) -> PostResult<String> {
        let url = Self::parse_endpoint(endpoint)?;
        let body = Bytes::from(sonic_rs::to_vec(payload).map_err(PostError::from_json)?);
        let response = self.dispatch(url, body, credential).await?;
        Self::into_text(response)
    }

    fn parse_endpoint(endpoint: &str) -> PostResult<Url> {
        let url = Url::parse(endpoint)
            .map_err(|err| PostError::invalid_endpoint(endpoint, err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PostError::invalid_endpoint(
                endpoint,
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        Ok(url)
    }

    fn normalize(&self, payload: &str) -> Bytes {
        if self.strip_newlines {
            Bytes::from(payload.replace(['\n', '\r'], ""))
        } else {
            Bytes::copy_from_slice(payload.as_bytes())
        }
    }

    async fn dispatch(
        &self,
        url: Url,
        body: Bytes,
        credential: Option<&str>,
    ) -> PostResult<PostResponse> {
        let mut request = PostRequest::new(url, body)
            .with_header(CONTENT_TYPE.as_str(), "application/json")
            .with_header(ACCEPT.as_str(), "*/*")
            .with_timeout(self.timeout);
        if let Some(credential) = credential {
            request = request.with_header(AUTHORIZATION.as_str(), format!("Basic {credential}"));
        }
        self.transport.execute(request).await
    }

    fn into_text(response: PostResponse) -> PostResult<String> {
        if !response.is_success() {
            return Err(PostError::rejected(response.status, response.text()));
        }
        Ok(response.text())
    }
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: ReqwestClient::new(),
        }
    }

    pub fn with_client(client: ReqwestClient) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PostTransport for ReqwestTransport {
    fn execute(&self, request: PostRequest) -> PostFuture<PostResult<PostResponse>> {
        let client = self.client.clone();
        Box::pin(async move {
            let start = Instant::now();
            let mut req = client.post(request.url).timeout(request.timeout);

            for (key, value) in request.headers {
                let value = HeaderValue::from_str(&value)
                    .map_err(|err| PostError::internal(err.to_string()))?;
                req = req.header(key.as_str(), value);
            }

            req = req.body(request.body);

            let resp = req
                .send()
                .await
                .map_err(|err| PostError::from_reqwest(PostErrorKind::Send, err))?;

            let status = resp.status().as_u16();
            let headers = resp
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let body = resp
                .bytes()
                .await
                .map_err(|err| PostError::from_reqwest(PostErrorKind::Receive, err))?;
            let elapsed = start.elapsed();

            Ok(PostResponse {
                status,
                headers,
                body,
                elapsed,
            })
        })
    }
}
