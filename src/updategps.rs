//! The GPS update service.
//!
//! The front end already knows the coordinates (from the browser's
//! geolocation, typically) and just needs them written into a record.

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

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub database: String,
    pub layout: String,
    pub record_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub latitude_field: String,
    pub longitude_field: String,
}

impl Request {
    pub fn from_invocation(inv: &Invocation) -> Result<Self, ProxyError> {
        let body = inv.json_object()?;
        let mut f = Fields::json(&body);

        let request = Request {
            database: f.string("database"),
            layout: f.string("layout"),
            record_id: f.record_id("recordId"),
            latitude: f.number_in_range("latitude", -90., 90.),
            longitude: f.number_in_range("longitude", -180., 180.),
            latitude_field: f.string("latitudeField"),
            longitude_field: f.string("longitudeField"),
        };

        f.finish(request)
    }
}

/// The `fieldData` for a coordinate write.
pub fn coordinate_fields(
    latitude_field: &str,
    longitude_field: &str,
    latitude: f64,
    longitude: f64,
) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(latitude_field.to_owned(), json!(latitude));
    fields.insert(longitude_field.to_owned(), json!(longitude));
    fields
}

pub async fn handler(inv: &Invocation, cfg: &Config, api: &dyn DataApi) -> Reply {
    Reply::from_result(handle_update_gps(inv, cfg, api).await)
}

async fn handle_update_gps(
    inv: &Invocation,
    cfg: &Config,
    api: &dyn DataApi,
) -> Result<Reply, ProxyError> {
    inv.require_method(&Method::POST)?;
    let account = cfg.account()?;
    let request = Request::from_invocation(inv)?;

    let fields = coordinate_fields(
        &request.latitude_field,
        &request.longitude_field,
        request.latitude,
        request.longitude,
    );
    let layout = request.layout.as_str();
    let record_id = request.record_id.as_str();

    let data = with_session(api, &account, &request.database, |session| async move {
        api.update_record(&session, layout, record_id, fields).await
    })
    .await?;

    let mut payload = Map::new();
    payload.insert("latitude".to_owned(), json!(request.latitude));
    payload.insert("longitude".to_owned(), json!(request.longitude));
    payload.insert("data".to_owned(), data);

    Ok(Reply::success(
        "GPS coordinates written back to FileMaker",
        payload,
    ))
}
