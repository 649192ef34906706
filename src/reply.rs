//! Outgoing responses.
//!
//! Buffered Lambdas can only hand back JSON, which suits us: every reply is a
//! status code plus an optional JSON object.

use lambda_http::{http::header::CONTENT_TYPE, Body, Response};
use lambda_runtime::tracing;
use serde_json::{json, Map, Value};

use crate::error::ProxyError;

#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Option<Value>,
}

impl Reply {
    /// A 200 with `{ "success": true, "message": ... }` plus whatever is in
    /// `payload`.
    pub fn success<S: Into<String>>(message: S, payload: Map<String, Value>) -> Self {
        let mut body = Map::new();
        body.insert("success".to_owned(), Value::Bool(true));
        body.insert("message".to_owned(), Value::String(message.into()));
        body.extend(payload);

        Reply {
            status: 200,
            body: Some(Value::Object(body)),
        }
    }

    /// A 200 with no body at all, for CORS preflights.
    pub fn empty() -> Self {
        Reply {
            status: 200,
            body: None,
        }
    }

    pub fn error(err: &ProxyError) -> Self {
        let status = err.status_code();

        if status >= 500 {
            tracing::error!("request failed ({status}): {err}");
        } else {
            tracing::info!("request rejected ({status}): {err}");
        }

        let mut body = json!({
            "success": false,
            "message": err.to_string(),
        });

        if let Some(details) = err.details() {
            body["details"] = details.clone();
        }

        Reply {
            status,
            body: Some(body),
        }
    }

    pub fn from_result(result: Result<Reply, ProxyError>) -> Self {
        result.unwrap_or_else(|e| Reply::error(&e))
    }

    pub fn into_http(self) -> Result<Response<Body>, lambda_http::http::Error> {
        let builder = Response::builder().status(self.status);

        match self.body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::Text(body.to_string())),
            None => builder.body(Body::Empty),
        }
    }

    /// The shape handed back by the bare (non-API-Gateway) Lambda.
    pub fn into_value(self) -> Value {
        json!({
            "statusCode": self.status,
            "body": self.body.unwrap_or(Value::Null),
        })
    }
}
