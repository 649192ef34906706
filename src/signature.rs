//! The signature upload service.
//!
//! The front end posts a signature image as `multipart/form-data`, naming
//! the target record and container field in the query string. We pull the
//! `upload` part out of the form and send it on to FileMaker's container
//! endpoint in a form of our own.
//!
//! This one is called cross-origin from the browser, so it also has to
//! answer CORS preflights.

use lambda_http::http::Method;
use serde_json::Map;

use crate::{
    config::Config,
    error::ProxyError,
    filemaker::{ContainerTarget, ContainerUpload, DataApi},
    invocation::{Fields, Invocation},
    multipart::{read_file_part, UPLOAD_PART},
    reply::Reply,
    session::with_session,
};

const DEFAULT_CONTENT_TYPE: &str = "image/png";

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub record_id: String,
    pub field: String,
    pub repetition: u32,
}

impl Request {
    pub fn from_invocation(inv: &Invocation) -> Result<Self, ProxyError> {
        let mut f = Fields::query(&inv.query);

        let request = Request {
            record_id: f.record_id("recordIdParam"),
            field: f.string("fieldName"),
            repetition: f.positive_integer_or("repetition", 1),
        };

        f.finish(request)
    }
}

pub async fn handler(inv: &Invocation, cfg: &Config, api: &dyn DataApi) -> Reply {
    if inv.method == Method::OPTIONS {
        return Reply::empty();
    }

    Reply::from_result(handle_upload_signature(inv, cfg, api).await)
}

async fn handle_upload_signature(
    inv: &Invocation,
    cfg: &Config,
    api: &dyn DataApi,
) -> Result<Reply, ProxyError> {
    inv.require_method(&Method::POST)?;
    let account = cfg.account()?;
    let database = cfg.database_name()?;
    let layout = cfg.upload_layout()?;
    let request = Request::from_invocation(inv)?;

    // Fully decoded before we log in, so a request without a usable file
    // never touches FileMaker.
    let file = read_file_part(
        inv.content_type.as_deref(),
        inv.body.clone(),
        UPLOAD_PART,
        cfg.max_upload_bytes,
    )
    .await?;

    let upload = ContainerUpload {
        bytes: file.bytes,
        filename: file
            .filename
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("signature_{}.png", request.record_id)),
        content_type: file
            .content_type
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned()),
    };

    let target = ContainerTarget {
        layout: layout.to_owned(),
        record_id: request.record_id.clone(),
        field: request.field.clone(),
        repetition: request.repetition,
    };
    let target = &target;

    with_session(api, &account, database, |session| async move {
        api.upload_container(&session, target, upload).await
    })
    .await?;

    Ok(Reply::success("Signature uploaded", Map::new()))
}
