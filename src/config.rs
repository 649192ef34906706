//! Deployment configuration.
//!
//! Everything is read once at process start and then handed to each handler
//! explicitly. Values are optional at load time: each handler needs a
//! different subset, and a missing value should only fail the handlers that
//! actually need it, with a 500 before any backend call is attempted.

use url::Url;

use crate::error::ProxyError;

pub const DEFAULT_API_VERSION: &str = "vLatest";
pub const DEFAULT_UUID_LAYOUT: &str = "X_登入";
pub const DEFAULT_UUID_FIELD: &str = "系統UUID";
pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Buffered Lambdas are limited to 6 MB payloads, so there's no point in
/// accepting more than that.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 6 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct Config {
    pub server_host: Option<String>,
    pub account_name: Option<String>,
    pub account_password: Option<String>,
    pub database_name: Option<String>,
    pub upload_layout: Option<String>,
    pub geocoding_key: Option<String>,
    pub api_version: String,
    pub uuid_layout: String,
    pub uuid_field: String,
    pub geocode_endpoint: String,
    pub max_upload_bytes: u64,
    pub localtest_arn: Option<String>,
}

/// What we need to talk to a FileMaker server at all.
#[derive(Clone)]
pub struct Account {
    pub base_url: Url,
    pub api_version: String,
    pub account_name: String,
    pub password: String,
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("base_url", &self.base_url.as_str())
            .field("api_version", &self.api_version)
            .field("account_name", &self.account_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Nothing set: every optional setting missing, every defaulted one at its
/// default.
impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build a configuration from an arbitrary variable lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());

        Config {
            server_host: get("FM_SERVER_HOST"),
            account_name: get("FM_ACCOUNT_NAME"),
            account_password: get("FM_ACCOUNT_PASSWORD"),
            database_name: get("FM_DATABASE_NAME"),
            upload_layout: get("FM_LAYOUT_NAME"),
            geocoding_key: get("GoogleMap_API_Key"),
            api_version: get("FM_DATA_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_owned()),
            uuid_layout: get("FM_UUID_LAYOUT").unwrap_or_else(|| DEFAULT_UUID_LAYOUT.to_owned()),
            uuid_field: get("FM_UUID_FIELD").unwrap_or_else(|| DEFAULT_UUID_FIELD.to_owned()),
            geocode_endpoint: get("GEOCODE_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_GEOCODE_ENDPOINT.to_owned()),
            max_upload_bytes: get("FM_MAX_UPLOAD_BYTES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            localtest_arn: get("FMPROXY_LOCALTEST_ARN"),
        }
    }

    /// Server location and credentials, or a configuration error naming
    /// whatever is missing.
    pub fn account(&self) -> Result<Account, ProxyError> {
        let mut missing = Vec::new();

        if self.server_host.is_none() {
            missing.push("FM_SERVER_HOST");
        }
        if self.account_name.is_none() {
            missing.push("FM_ACCOUNT_NAME");
        }
        if self.account_password.is_none() {
            missing.push("FM_ACCOUNT_PASSWORD");
        }

        match (&self.server_host, &self.account_name, &self.account_password) {
            (Some(host), Some(name), Some(password)) => Ok(Account {
                base_url: server_base_url(host)?,
                api_version: self.api_version.clone(),
                account_name: name.clone(),
                password: password.clone(),
            }),
            _ => Err(missing_vars(&missing)),
        }
    }

    pub fn database_name(&self) -> Result<&str, ProxyError> {
        self.database_name
            .as_deref()
            .ok_or_else(|| missing_vars(&["FM_DATABASE_NAME"]))
    }

    pub fn upload_layout(&self) -> Result<&str, ProxyError> {
        self.upload_layout
            .as_deref()
            .ok_or_else(|| missing_vars(&["FM_LAYOUT_NAME"]))
    }

    pub fn geocoding_key(&self) -> Result<&str, ProxyError> {
        self.geocoding_key
            .as_deref()
            .ok_or_else(|| missing_vars(&["GoogleMap_API_Key"]))
    }
}

fn missing_vars(names: &[&str]) -> ProxyError {
    ProxyError::Configuration(format!("missing {}", names.join(", ")))
}

/// The configured host is normally bare (`fm.example.com`), in which case we
/// talk HTTPS. An explicit scheme is honored, which is handy for local
/// testing against a plain-HTTP stand-in.
fn server_base_url(host: &str) -> Result<Url, ProxyError> {
    let host = host.trim().trim_end_matches('/');

    let text = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("https://{host}")
    };

    let url = Url::parse(&text)
        .map_err(|e| ProxyError::Configuration(format!("invalid FM_SERVER_HOST `{host}`: {e}")))?;

    if url.cannot_be_a_base() {
        return Err(ProxyError::Configuration(format!(
            "invalid FM_SERVER_HOST `{host}`"
        )));
    }

    Ok(url)
}
