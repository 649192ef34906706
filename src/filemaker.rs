//! Talking to the FileMaker Data API.
//!
//! [`DataApi`] is the seam between the handlers and the network: the real
//! implementation is [`FileMakerClient`], while the tests drive the handlers
//! with an in-memory fake.
//!
//! Every Data API reply, good or bad, comes wrapped in the same envelope:
//!
//! ```json
//! { "response": { ... }, "messages": [{ "code": "0", "message": "OK" }] }
//! ```
//!
//! Failures are normalized into [`UpstreamFailure`] from that envelope, and
//! fall back to a generic status-based message when the body is something
//! else entirely (a proxy error page, say).

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use lambda_runtime::tracing;
use reqwest::{
    header::AUTHORIZATION,
    multipart::{Form, Part},
    RequestBuilder, StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::{
    config::Account,
    error::{ProxyError, UpstreamFailure},
    multipart::UPLOAD_PART,
    session::{Session, SessionToken},
};

/// FileMaker's error code for a find that matched nothing. It arrives with
/// an HTTP error status, but for us it's just an empty result.
const NO_RECORDS_MATCH: &str = "401";

#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub response: Value,

    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Message {
    #[serde(default)]
    pub code: String,

    #[serde(default)]
    pub message: String,
}

/// Where a container upload goes.
#[derive(Clone, Debug)]
pub struct ContainerTarget {
    pub layout: String,
    pub record_id: String,
    pub field: String,
    pub repetition: u32,
}

/// A file ready to be re-encoded for a container field.
#[derive(Clone, Debug)]
pub struct ContainerUpload {
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: String,
}

#[async_trait]
pub trait DataApi: Send + Sync {
    /// Open a session with Basic authentication.
    async fn login(&self, account: &Account, database: &str) -> Result<SessionToken, ProxyError>;

    /// Invalidate the session's token.
    async fn logout(&self, session: &Session) -> Result<(), ProxyError>;

    /// Run a find request, returning the matching records (possibly none).
    async fn find(
        &self,
        session: &Session,
        layout: &str,
        query: Vec<Map<String, Value>>,
    ) -> Result<Vec<Value>, ProxyError>;

    async fn create_record(
        &self,
        session: &Session,
        layout: &str,
        field_data: Map<String, Value>,
    ) -> Result<Value, ProxyError>;

    async fn update_record(
        &self,
        session: &Session,
        layout: &str,
        record_id: &str,
        field_data: Map<String, Value>,
    ) -> Result<Value, ProxyError>;

    async fn upload_container(
        &self,
        session: &Session,
        target: &ContainerTarget,
        upload: ContainerUpload,
    ) -> Result<Value, ProxyError>;
}

/// The real Data API client.
///
/// It holds no per-request state: credentials and tokens come in with each
/// call, so one client can serve every invocation of a warm Lambda.
#[derive(Clone, Debug, Default)]
pub struct FileMakerClient {
    http: reqwest::Client,
}

impl FileMakerClient {
    pub fn new(http: reqwest::Client) -> Self {
        FileMakerClient { http }
    }
}

#[async_trait]
impl DataApi for FileMakerClient {
    async fn login(&self, account: &Account, database: &str) -> Result<SessionToken, ProxyError> {
        let url = endpoint(account, database, &["sessions"])?;
        let credentials = STANDARD.encode(format!("{}:{}", account.account_name, account.password));

        let req = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Basic {credentials}"))
            .json(&json!({}));

        let (status, text) = send(req, "login").await?;
        let response = parse_reply(status, &text).map_err(ProxyError::UpstreamAuth)?;

        let token = response
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("FileMaker login reply carried no session token"))?;

        Ok(SessionToken::new(token))
    }

    async fn logout(&self, session: &Session) -> Result<(), ProxyError> {
        let url = endpoint(
            &session.account,
            &session.database,
            &["sessions", session.token.as_str()],
        )?;

        let req = self.http.delete(url).bearer_auth(session.token.as_str());
        let (status, text) = send(req, "logout").await?;
        parse_reply(status, &text).map_err(|failure| ProxyError::UpstreamOperation {
            step: "logout",
            failure,
        })?;
        Ok(())
    }

    async fn find(
        &self,
        session: &Session,
        layout: &str,
        query: Vec<Map<String, Value>>,
    ) -> Result<Vec<Value>, ProxyError> {
        let url = endpoint(
            &session.account,
            &session.database,
            &["layouts", layout, "_find"],
        )?;

        let req = self
            .http
            .post(url)
            .bearer_auth(session.token.as_str())
            .json(&json!({ "query": query }));

        let (status, text) = send(req, "record find").await?;

        match parse_reply(status, &text) {
            Ok(response) => Ok(match response.get("data") {
                Some(Value::Array(records)) => records.clone(),
                _ => Vec::new(),
            }),

            Err(failure) if failure.code.as_deref() == Some(NO_RECORDS_MATCH) => Ok(Vec::new()),

            Err(failure) => Err(ProxyError::UpstreamOperation {
                step: "record find",
                failure,
            }),
        }
    }

    async fn create_record(
        &self,
        session: &Session,
        layout: &str,
        field_data: Map<String, Value>,
    ) -> Result<Value, ProxyError> {
        let url = endpoint(
            &session.account,
            &session.database,
            &["layouts", layout, "records"],
        )?;

        let req = self
            .http
            .post(url)
            .bearer_auth(session.token.as_str())
            .json(&json!({ "fieldData": field_data }));

        let (status, text) = send(req, "record creation").await?;
        parse_reply(status, &text).map_err(|failure| ProxyError::UpstreamOperation {
            step: "record creation",
            failure,
        })
    }

    async fn update_record(
        &self,
        session: &Session,
        layout: &str,
        record_id: &str,
        field_data: Map<String, Value>,
    ) -> Result<Value, ProxyError> {
        let url = endpoint(
            &session.account,
            &session.database,
            &["layouts", layout, "records", record_id],
        )?;

        let req = self
            .http
            .patch(url)
            .bearer_auth(session.token.as_str())
            .json(&json!({ "fieldData": field_data }));

        let (status, text) = send(req, "record update").await?;
        parse_reply(status, &text).map_err(|failure| ProxyError::UpstreamOperation {
            step: "record update",
            failure,
        })
    }

    async fn upload_container(
        &self,
        session: &Session,
        target: &ContainerTarget,
        upload: ContainerUpload,
    ) -> Result<Value, ProxyError> {
        let repetition = target.repetition.to_string();
        let url = endpoint(
            &session.account,
            &session.database,
            &[
                "layouts",
                &target.layout,
                "records",
                &target.record_id,
                "containers",
                &target.field,
                &repetition,
            ],
        )?;

        let req = self
            .http
            .post(url)
            .bearer_auth(session.token.as_str())
            .multipart(container_form(upload)?);

        let (status, text) = send(req, "container upload").await?;
        parse_reply(status, &text).map_err(|failure| ProxyError::UpstreamOperation {
            step: "container upload",
            failure,
        })
    }
}

/// A brand-new form with the file as its only part. `reqwest` picks the
/// boundary and sets the `Content-Type` header to match.
fn container_form(upload: ContainerUpload) -> Result<Form, ProxyError> {
    let part = Part::bytes(upload.bytes.to_vec())
        .file_name(upload.filename)
        .mime_str(&upload.content_type)
        .map_err(|e| {
            ProxyError::Multipart(format!(
                "unusable content type `{}`: {e}",
                upload.content_type
            ))
        })?;

    Ok(Form::new().part(UPLOAD_PART, part))
}

/// `{base}/fmi/data/{version}/databases/{database}/{rest...}`, with every
/// segment percent-encoded. Layout and field names are routinely non-ASCII.
fn endpoint(account: &Account, database: &str, rest: &[&str]) -> Result<Url, ProxyError> {
    let mut url = account.base_url.clone();

    {
        let mut segments = url.path_segments_mut().map_err(|_| {
            ProxyError::Configuration(format!(
                "FileMaker server URL `{}` cannot take a path",
                account.base_url
            ))
        })?;

        segments
            .pop_if_empty()
            .extend(["fmi", "data", account.api_version.as_str(), "databases", database])
            .extend(rest);
    }

    Ok(url)
}

// Not logging the URL: logout URLs embed the session token.
async fn send(req: RequestBuilder, step: &str) -> Result<(StatusCode, String), ProxyError> {
    let resp = req.send().await?;
    let status = resp.status();
    tracing::info!("FileMaker {step}: {status}");
    let text = resp.text().await?;
    Ok((status, text))
}

/// Unwrap a Data API reply: the `response` payload on success, a normalized
/// failure otherwise.
pub fn parse_reply(status: StatusCode, text: &str) -> Result<Value, UpstreamFailure> {
    let envelope: Option<Envelope> = serde_json::from_str(text).ok();

    if status.is_success() {
        return Ok(envelope.map(|e| e.response).unwrap_or(Value::Null));
    }

    let messages = envelope.map(|e| e.messages).unwrap_or_default();
    let first = messages.first();

    let message = match first {
        Some(m) if !m.message.is_empty() => format!("{}: {}", m.code, m.message),
        _ => format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("error")
        ),
    };

    let failure = UpstreamFailure {
        status: status.as_u16(),
        code: first.map(|m| m.code.clone()).filter(|c| !c.is_empty()),
        message,
        details: if messages.is_empty() {
            None
        } else {
            serde_json::to_value(&messages).ok()
        },
    };

    Err(failure)
}
