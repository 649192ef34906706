//! The address-to-GPS service.
//!
//! Given a free-text address and a FileMaker record, look the address up with
//! Google and write the resulting latitude and longitude into two fields of
//! that record. The caller names the fields, so the same function serves any
//! layout that stores coordinates.
//!
//! The geocode happens before we log in to FileMaker: an address that Google
//! can't resolve aborts the request without a session ever being opened, and
//! nothing gets written.

use lambda_http::http::Method;
use serde_json::{json, Map, Value};

use crate::{
    config::Config,
    error::ProxyError,
    filemaker::DataApi,
    geocoding::Geocoder,
    invocation::{Fields, Invocation},
    reply::Reply,
    session::with_session,
    updategps::coordinate_fields,
};

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub address: String,
    pub database: String,
    pub layout: String,
    pub record_id: String,
    pub latitude_field: String,
    pub longitude_field: String,
}

impl Request {
    pub fn from_invocation(inv: &Invocation) -> Result<Self, ProxyError> {
        let body = inv.json_object()?;
        let mut f = Fields::json(&body);

        let request = Request {
            address: f.string("address"),
            database: f.string("database"),
            layout: f.string("layout"),
            record_id: f.record_id("recordId"),
            latitude_field: f.string("latitudeField"),
            longitude_field: f.string("longitudeField"),
        };

        f.finish(request)
    }
}

pub async fn handler(
    inv: &Invocation,
    cfg: &Config,
    api: &dyn DataApi,
    geocoder: &dyn Geocoder,
) -> Reply {
    Reply::from_result(handle_address_to_gps(inv, cfg, api, geocoder).await)
}

async fn handle_address_to_gps(
    inv: &Invocation,
    cfg: &Config,
    api: &dyn DataApi,
    geocoder: &dyn Geocoder,
) -> Result<Reply, ProxyError> {
    inv.require_method(&Method::POST)?;
    let account = cfg.account()?;
    let api_key = cfg.geocoding_key()?;
    let request = Request::from_invocation(inv)?;

    let geocoded = geocoder.geocode(&request.address, api_key).await?;

    let fields = coordinate_fields(
        &request.latitude_field,
        &request.longitude_field,
        geocoded.latitude,
        geocoded.longitude,
    );
    let layout = request.layout.as_str();
    let record_id = request.record_id.as_str();

    let data = with_session(api, &account, &request.database, |session| async move {
        api.update_record(&session, layout, record_id, fields).await
    })
    .await?;

    let mut payload = Map::new();
    payload.insert("latitude".to_owned(), json!(geocoded.latitude));
    payload.insert("longitude".to_owned(), json!(geocoded.longitude));
    if let Some(addr) = geocoded.formatted_address {
        payload.insert("formattedAddress".to_owned(), Value::String(addr));
    }
    payload.insert("data".to_owned(), data);

    Ok(Reply::success(
        "GPS coordinates written back to FileMaker",
        payload,
    ))
}
