//! Inbound requests and their validation.
//!
//! The handlers don't care whether they were invoked through API Gateway or
//! as a bare local Lambda, so both are flattened into an [`Invocation`]. The
//! [`Fields`] helper then does the per-handler parameter checks, collecting
//! every problem so the caller gets a single 400 that lists all of them.
//!
//! Request types are assembled through [`Fields`] rather than
//! `#[derive(Deserialize)]`: serde stops at the first bad field, and we
//! report all of them at once.

use bytes::Bytes;
use lambda_http::{
    http::{header::CONTENT_TYPE, Method},
    Request, RequestExt,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::ProxyError;

#[derive(Clone, Debug)]
pub struct Invocation {
    pub method: Method,
    pub query: HashMap<String, String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl Invocation {
    pub fn new(method: Method) -> Self {
        Invocation {
            method,
            query: HashMap::new(),
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// A POST with a JSON body, which is how bare local invocations are
    /// treated.
    pub fn json(payload: &Value) -> Self {
        Invocation::new(Method::POST).with_body("application/json", payload.to_string())
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body<C: Into<String>, B: Into<Bytes>>(mut self, content_type: C, body: B) -> Self {
        self.content_type = Some(content_type.into());
        self.body = body.into();
        self
    }

    /// Flatten an API Gateway proxy request. `lambda_http` has already
    /// undone any Base64 transfer encoding of binary bodies.
    pub fn from_http(req: &Request) -> Self {
        let query = req
            .query_string_parameters()
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();

        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let raw: &[u8] = req.body().as_ref();

        Invocation {
            method: req.method().clone(),
            query,
            content_type,
            body: Bytes::copy_from_slice(raw),
        }
    }

    pub fn require_method(&self, allowed: &Method) -> Result<(), ProxyError> {
        if &self.method == allowed {
            Ok(())
        } else {
            Err(ProxyError::MethodNotAllowed(self.method.to_string()))
        }
    }

    pub fn json_object(&self) -> Result<Map<String, Value>, ProxyError> {
        match serde_json::from_slice(&self.body) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(ProxyError::Validation(
                "request body must be a JSON object".to_owned(),
            )),
        }
    }
}

#[derive(Clone, Copy)]
enum Source<'a> {
    Json(&'a Map<String, Value>),
    Query(&'a HashMap<String, String>),
}

/// Typed field extraction that accumulates problems instead of failing on
/// the first one.
///
/// Each accessor returns a placeholder value when the field is bad; the
/// placeholder is never observed because [`Fields::finish`] refuses to hand
/// back the assembled request if anything was recorded.
pub struct Fields<'a> {
    source: Source<'a>,
    problems: Vec<String>,
}

impl<'a> Fields<'a> {
    pub fn json(map: &'a Map<String, Value>) -> Self {
        Fields {
            source: Source::Json(map),
            problems: Vec::new(),
        }
    }

    pub fn query(query: &'a HashMap<String, String>) -> Self {
        Fields {
            source: Source::Query(query),
            problems: Vec::new(),
        }
    }

    fn problem(&mut self, name: &str, reason: &str) {
        self.problems.push(format!("{name} ({reason})"));
    }

    /// A required, non-blank string.
    pub fn string(&mut self, name: &str) -> String {
        let found = match self.source {
            Source::Json(map) => match map.get(name) {
                None | Some(Value::Null) => Err("missing"),
                Some(Value::String(s)) => Ok(s.trim()),
                Some(_) => Err("expected a string"),
            },
            Source::Query(q) => q.get(name).map(|s| s.trim()).ok_or("missing"),
        };

        match found {
            Ok(s) if !s.is_empty() => s.to_owned(),
            Ok(_) => {
                self.problem(name, "missing");
                String::new()
            }
            Err(reason) => {
                self.problem(name, reason);
                String::new()
            }
        }
    }

    /// A FileMaker record ID. Front ends send these both as strings and as
    /// bare JSON integers.
    pub fn record_id(&mut self, name: &str) -> String {
        if let Source::Json(map) = self.source {
            match map.get(name) {
                Some(Value::Number(n)) => {
                    return match n.as_u64() {
                        Some(id) => id.to_string(),
                        None => {
                            self.problem(name, "expected a non-negative integer");
                            String::new()
                        }
                    };
                }
                Some(Value::String(_)) | None | Some(Value::Null) => {}
                Some(_) => {
                    self.problem(name, "expected a string or integer");
                    return String::new();
                }
            }
        }

        self.string(name)
    }

    /// A required finite number within `[min, max]`. JSON bodies must carry
    /// a real number; query parameters are text and get parsed.
    pub fn number_in_range(&mut self, name: &str, min: f64, max: f64) -> f64 {
        let parsed = match self.source {
            Source::Json(map) => match map.get(name) {
                None | Some(Value::Null) => Err("missing"),
                Some(Value::Number(n)) => n.as_f64().ok_or("expected a number"),
                Some(_) => Err("expected a number"),
            },
            Source::Query(q) => q.get(name).ok_or("missing").and_then(|s| parse_number(s)),
        };

        match parsed {
            // NaN-sensitive: NaN fails both comparisons
            Ok(v) if v >= min && v <= max => v,
            Ok(_) => {
                self.problems
                    .push(format!("{name} (must be between {min} and {max})"));
                0.
            }
            Err(reason) => {
                self.problem(name, reason);
                0.
            }
        }
    }

    /// An optional positive integer, falling back to `default` when absent.
    pub fn positive_integer_or(&mut self, name: &str, default: u32) -> u32 {
        let text = match self.source {
            Source::Json(map) => match map.get(name) {
                None | Some(Value::Null) => return default,
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) => s.trim().to_owned(),
                Some(_) => String::new(),
            },
            Source::Query(q) => match q.get(name) {
                None => return default,
                Some(s) if s.trim().is_empty() => return default,
                Some(s) => s.trim().to_owned(),
            },
        };

        match text.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                self.problem(name, "expected a positive integer");
                default
            }
        }
    }

    /// Hand back `value` if every field checked out, otherwise one
    /// validation error listing every problem.
    pub fn finish<T>(self, value: T) -> Result<T, ProxyError> {
        if self.problems.is_empty() {
            Ok(value)
        } else {
            Err(ProxyError::Validation(format!(
                "missing or invalid parameters: {}",
                self.problems.join(", ")
            )))
        }
    }
}

fn parse_number(text: &str) -> Result<f64, &'static str> {
    let text = text.trim();

    if text.is_empty() {
        return Err("missing");
    }

    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err("expected a number"),
    }
}
