//! REST client for the enterprise attendance API.

use super::{AttendanceBackend, BreakRequest, ClockInRequest, ClockOutRequest, StoreDirectory};
use crate::errors::{AttendanceError, AttendanceResult};
use crate::models::{AttendanceSession, Store};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Error body returned by the API, when there is one.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> AttendanceResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| AttendanceError::Validation(format!("invalid api key: {e}")))?;
            headers.insert("x-api-key", value);
        }

        let base_url = base_url.trim_end_matches('/');
        let parsed = Url::parse(base_url)
            .map_err(|e| AttendanceError::Validation(format!("invalid api base url: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(AttendanceError::Validation(format!(
                "api base url '{base_url}' cannot carry a path"
            )));
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| AttendanceError::Transport(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL extended with `segments`, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> AttendanceResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AttendanceError::Validation(format!("invalid api base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| {
                AttendanceError::Validation(format!(
                    "api base url '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> AttendanceResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        debug!(%method, %url, "backend request");
        Ok(self.client.request(method, url))
    }

    async fn send(&self, builder: RequestBuilder) -> AttendanceResult<Response> {
        let res = builder
            .send()
            .await
            .map_err(|e| AttendanceError::Transport(format!("backend unreachable: {e}")))?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let body: ApiErrorBody = res.json().await.unwrap_or_default();
        Err(map_status(status, body))
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> AttendanceResult<T> {
        decode(self.send(builder).await?).await
    }

    /// Like `send_json`, but a 404 answer means "nothing there".
    async fn send_optional_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> AttendanceResult<Option<T>> {
        let res = builder
            .send()
            .await
            .map_err(|e| AttendanceError::Transport(format!("backend unreachable: {e}")))?;

        match res.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => decode(res).await.map(Some),
            status => {
                let body: ApiErrorBody = res.json().await.unwrap_or_default();
                Err(map_status(status, body))
            }
        }
    }
}

async fn decode<T: DeserializeOwned>(res: Response) -> AttendanceResult<T> {
    res.json::<T>()
        .await
        .map_err(|e| AttendanceError::Transport(format!("malformed backend answer: {e}")))
}

fn map_status(status: StatusCode, body: ApiErrorBody) -> AttendanceError {
    let message = body
        .message
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("no reason").to_string());
    let message = match body.code {
        Some(code) => format!("{message} ({code})"),
        None => message,
    };

    match status {
        StatusCode::CONFLICT => AttendanceError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AttendanceError::Validation(message)
        }
        _ => {
            warn!(%status, "backend answered with an error status");
            AttendanceError::Transport(format!("backend answered {status}: {message}"))
        }
    }
}

impl AttendanceBackend for HttpBackend {
    async fn open_session(&self, user_id: &str) -> AttendanceResult<Option<AttendanceSession>> {
        let builder = self
            .request(Method::GET, &["attendance", "open"])?
            .query(&[("userId", user_id)]);

        self.send_optional_json(builder).await
    }

    async fn clock_in(&self, request: &ClockInRequest) -> AttendanceResult<AttendanceSession> {
        let builder = self
            .request(Method::POST, &["attendance", "clock-in"])?
            .json(request);
        self.send_json(builder).await
    }

    async fn start_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        let id = request.session_id.to_string();
        let builder = self
            .request(Method::POST, &["attendance", "sessions", &id, "breaks", "start"])?
            .json(request);
        self.send_json(builder).await
    }

    async fn end_break(&self, request: &BreakRequest) -> AttendanceResult<AttendanceSession> {
        let id = request.session_id.to_string();
        let builder = self
            .request(Method::POST, &["attendance", "sessions", &id, "breaks", "end"])?
            .json(request);
        self.send_json(builder).await
    }

    async fn clock_out(&self, request: &ClockOutRequest) -> AttendanceResult<AttendanceSession> {
        let id = request.session_id.to_string();
        let builder = self
            .request(Method::POST, &["attendance", "sessions", &id, "clock-out"])?
            .json(request);
        self.send_json(builder).await
    }
}

impl StoreDirectory for HttpBackend {
    async fn list_stores(&self, tenant_id: &str) -> AttendanceResult<Vec<Store>> {
        let builder = self.request(Method::GET, &["tenants", tenant_id, "stores"])?;
        self.send_json(builder).await
    }
}
