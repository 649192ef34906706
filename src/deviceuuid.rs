//! The device UUID registration service.
//!
//! Each browser that uses the front end generates a UUID and registers it
//! here. We record it in FileMaker unless it's already there, so registering
//! the same UUID again is harmless.
//!
//! This is a find followed by a conditional create, with nothing guarding
//! the gap: two simultaneous registrations of one new UUID can both see "not
//! found" and both create. A single browser registers its UUID once, one
//! request at a time, so we accept that.

use lambda_http::http::Method;
use serde_json::{json, Map, Value};

use crate::{
    config::Config,
    error::ProxyError,
    filemaker::DataApi,
    invocation::{Fields, Invocation},
    reply::Reply,
    session::with_session,
};

const MAX_UUID_LEN: usize = 128;

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub uuid: String,
}

impl Request {
    pub fn from_invocation(inv: &Invocation) -> Result<Self, ProxyError> {
        let body = inv.json_object()?;
        let mut f = Fields::json(&body);
        let request = Request {
            uuid: f.string("uuid"),
        };
        let request = f.finish(request)?;

        // Characters like `*`, `=` or `!` are FileMaker find operators; let
        // one through and the exact-match find can match other devices.
        if request.uuid.len() > MAX_UUID_LEN
            || !request
                .uuid
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ProxyError::Validation(
                "missing or invalid parameters: uuid (expected letters, digits, `-` or `_`)"
                    .to_owned(),
            ));
        }

        Ok(request)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Registration {
    Created { record_id: Option<String> },
    Exists,
}

pub async fn handler(inv: &Invocation, cfg: &Config, api: &dyn DataApi) -> Reply {
    Reply::from_result(handle_register_uuid(inv, cfg, api).await)
}

async fn handle_register_uuid(
    inv: &Invocation,
    cfg: &Config,
    api: &dyn DataApi,
) -> Result<Reply, ProxyError> {
    inv.require_method(&Method::POST)?;
    let account = cfg.account()?;
    let database = cfg.database_name()?;
    let request = Request::from_invocation(inv)?;

    let layout = cfg.uuid_layout.as_str();
    let field = cfg.uuid_field.as_str();
    let uuid = request.uuid.as_str();

    let outcome = with_session(api, &account, database, |session| async move {
        let mut find = Map::new();
        find.insert(field.to_owned(), Value::String(format!("=={uuid}")));
        let found = api.find(&session, layout, vec![find]).await?;

        if !found.is_empty() {
            return Ok(Registration::Exists);
        }

        let mut record = Map::new();
        record.insert(field.to_owned(), Value::String(uuid.to_owned()));
        let created = api.create_record(&session, layout, record).await?;

        Ok::<_, ProxyError>(Registration::Created {
            record_id: created
                .get("recordId")
                .and_then(Value::as_str)
                .map(str::to_owned),
        })
    })
    .await?;

    let mut payload = Map::new();
    payload.insert("uuid".to_owned(), json!(request.uuid));

    let message = match outcome {
        Registration::Created { record_id } => {
            payload.insert("action".to_owned(), json!("created"));
            if let Some(id) = record_id {
                payload.insert("recordId".to_owned(), json!(id));
            }
            "UUID record created"
        }

        Registration::Exists => {
            payload.insert("action".to_owned(), json!("exists"));
            "UUID record already exists"
        }
    };

    Ok(Reply::success(message, payload))
}
