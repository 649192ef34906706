//! In-memory stand-ins for FileMaker and Google, for unit tests.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Mutex;
use url::Url;

use crate::{
    config::{Account, Config},
    error::{ProxyError, UpstreamFailure},
    filemaker::{ContainerTarget, ContainerUpload, DataApi},
    geocoding::{Geocoded, Geocoder},
    session::{Session, SessionToken},
};

pub fn test_account() -> Account {
    Account {
        base_url: Url::parse("https://fm.example.com/").unwrap(),
        api_version: "vLatest".to_owned(),
        account_name: "api".to_owned(),
        password: "secret".to_owned(),
    }
}

pub fn test_config() -> Config {
    Config::from_lookup(|k| {
        match k {
            "FM_SERVER_HOST" => Some("fm.example.com"),
            "FM_ACCOUNT_NAME" => Some("api"),
            "FM_ACCOUNT_PASSWORD" => Some("secret"),
            "FM_DATABASE_NAME" => Some("Cleaners"),
            "FM_LAYOUT_NAME" => Some("Y_合約簽名"),
            "GoogleMap_API_Key" => Some("maps-key"),
            _ => None,
        }
        .map(str::to_owned)
    })
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Login(String),
    Logout(String, String),
    Find {
        layout: String,
        query: Vec<Map<String, Value>>,
    },
    Create {
        layout: String,
        field_data: Map<String, Value>,
    },
    Update {
        layout: String,
        record_id: String,
        field_data: Map<String, Value>,
    },
    Upload {
        layout: String,
        record_id: String,
        field: String,
        repetition: u32,
        filename: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    records: Vec<Map<String, Value>>,
    logins: usize,
    login_failure: Option<UpstreamFailure>,
    logout_fails: bool,
    operation_failure: Option<UpstreamFailure>,
}

/// Records every call, keeps created records so finds can see them, and can
/// be told to fail.
#[derive(Default)]
pub struct FakeDataApi {
    state: Mutex<State>,
}

impl FakeDataApi {
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn logout_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Logout(..)))
            .count()
    }

    pub fn login_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Login(..)))
            .count()
    }

    pub fn fail_login(&self, failure: UpstreamFailure) {
        self.state.lock().unwrap().login_failure = Some(failure);
    }

    pub fn fail_logout(&self) {
        self.state.lock().unwrap().logout_fails = true;
    }

    /// Make every data operation (find/create/update/upload) fail.
    pub fn fail_operations(&self, failure: UpstreamFailure) {
        self.state.lock().unwrap().operation_failure = Some(failure);
    }

    fn record(&self, call: Call, step: &'static str) -> Result<(), ProxyError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);

        match &state.operation_failure {
            Some(failure) => Err(ProxyError::UpstreamOperation {
                step,
                failure: failure.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataApi for FakeDataApi {
    async fn login(&self, _account: &Account, database: &str) -> Result<SessionToken, ProxyError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Login(database.to_owned()));

        if let Some(failure) = &state.login_failure {
            return Err(ProxyError::UpstreamAuth(failure.clone()));
        }

        state.logins += 1;
        Ok(SessionToken::new(format!("token-{}", state.logins)))
    }

    async fn logout(&self, session: &Session) -> Result<(), ProxyError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Logout(
            session.database.clone(),
            session.token.as_str().to_owned(),
        ));

        if state.logout_fails {
            return Err(ProxyError::UpstreamOperation {
                step: "logout",
                failure: UpstreamFailure {
                    status: 500,
                    code: None,
                    message: "500 Internal Server Error".to_owned(),
                    details: None,
                },
            });
        }

        Ok(())
    }

    async fn find(
        &self,
        _session: &Session,
        layout: &str,
        query: Vec<Map<String, Value>>,
    ) -> Result<Vec<Value>, ProxyError> {
        self.record(
            Call::Find {
                layout: layout.to_owned(),
                query: query.clone(),
            },
            "record find",
        )?;

        // Only `==value` exact-match requests, which is all we issue.
        let state = self.state.lock().unwrap();
        let matches = state
            .records
            .iter()
            .filter(|record| {
                query.iter().any(|request| {
                    request.iter().all(|(field, wanted)| {
                        let wanted = wanted.as_str().unwrap_or("");
                        let wanted = wanted.strip_prefix("==").unwrap_or(wanted);
                        record.get(field).and_then(Value::as_str) == Some(wanted)
                    })
                })
            })
            .map(|record| json!({ "fieldData": record }))
            .collect();

        Ok(matches)
    }

    async fn create_record(
        &self,
        _session: &Session,
        layout: &str,
        field_data: Map<String, Value>,
    ) -> Result<Value, ProxyError> {
        self.record(
            Call::Create {
                layout: layout.to_owned(),
                field_data: field_data.clone(),
            },
            "record creation",
        )?;

        let mut state = self.state.lock().unwrap();
        state.records.push(field_data);
        Ok(json!({ "recordId": state.records.len().to_string(), "modId": "0" }))
    }

    async fn update_record(
        &self,
        _session: &Session,
        layout: &str,
        record_id: &str,
        field_data: Map<String, Value>,
    ) -> Result<Value, ProxyError> {
        self.record(
            Call::Update {
                layout: layout.to_owned(),
                record_id: record_id.to_owned(),
                field_data,
            },
            "record update",
        )?;

        Ok(json!({ "modId": "1" }))
    }

    async fn upload_container(
        &self,
        _session: &Session,
        target: &ContainerTarget,
        upload: ContainerUpload,
    ) -> Result<Value, ProxyError> {
        self.record(
            Call::Upload {
                layout: target.layout.clone(),
                record_id: target.record_id.clone(),
                field: target.field.clone(),
                repetition: target.repetition,
                filename: upload.filename,
                content_type: upload.content_type,
                bytes: upload.bytes.to_vec(),
            },
            "container upload",
        )?;

        Ok(json!({ "modId": "2" }))
    }
}

/// Answers every lookup the same way.
pub struct FakeGeocoder {
    answer: Result<Geocoded, (String, String)>,
    lookups: Mutex<Vec<String>>,
}

impl FakeGeocoder {
    pub fn resolving_to(latitude: f64, longitude: f64) -> Self {
        FakeGeocoder {
            answer: Ok(Geocoded {
                latitude,
                longitude,
                formatted_address: None,
            }),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_with(status: &str, message: &str) -> Self {
        FakeGeocoder {
            answer: Err((status.to_owned(), message.to_owned())),
            lookups: Mutex::new(Vec::new()),
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, address: &str, _api_key: &str) -> Result<Geocoded, ProxyError> {
        self.lookups.lock().unwrap().push(address.to_owned());

        match &self.answer {
            Ok(g) => Ok(g.clone()),
            Err((status, message)) => Err(ProxyError::Geocoding {
                status: status.clone(),
                message: message.clone(),
            }),
        }
    }
}
