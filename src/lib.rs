//! Lambda proxies in front of the FileMaker Data API
//!
//! The public web pages can't hold FileMaker credentials, so each thing they
//! need to do in FileMaker goes through one of these small functions. Every
//! one of them has the same shape: check the request, log in to the Data API,
//! make one or two calls, log out again, and report back in JSON.
//!
//! This common codebase is compiled into three executables:
//! `fmproxy-lambda-proxyevent` speaks API Gateway's "proxy event" protocol and
//! is what we deploy; `fmproxy-lambda-bare` takes plain JSON events and is
//! handy for local testing; `fmproxy-lambda-oneshot` runs a single invocation
//! from the command line.
//!
//! The buffered Lambda response mechanism only does JSON, and caps payloads
//! at 6 MB, which also bounds the signature uploads we accept.

use lambda_runtime::{tracing, Error};
use tracing_subscriber::EnvFilter;

pub mod addresstogps;
pub mod config;
pub mod deviceuuid;
pub mod error;
pub mod filemaker;
pub mod geocoding;
pub mod invocation;
pub mod multipart;
pub mod reply;
pub mod session;
pub mod signature;
pub mod updategps;

#[cfg(test)]
mod testing;

use config::Config;
use filemaker::FileMakerClient;
use geocoding::GoogleGeocoder;
use invocation::Invocation;
use reply::Reply;

/// The deployed functions, told apart by the suffix of their ARNs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Function {
    AddressToGps,
    UpdateGps,
    RegisterUuid,
    UploadSignature,
}

impl Function {
    pub fn from_arn(arn: &str) -> Option<Self> {
        if arn.ends_with("address-to-gps") {
            Some(Function::AddressToGps)
        } else if arn.ends_with("update-gps") {
            Some(Function::UpdateGps)
        } else if arn.ends_with("register-uuid") {
            Some(Function::RegisterUuid)
        } else if arn.ends_with("upload-signature") {
            Some(Function::UploadSignature)
        } else {
            None
        }
    }
}

pub struct Services {
    config: Config,
    filemaker: FileMakerClient,
    geocoder: GoogleGeocoder,
}

impl Services {
    /// Set up logging and create a state object from the process
    /// environment.
    pub async fn init() -> Result<Self, Error> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_target(false) // don't print the module name
            .without_time() // don't print time (CloudWatch has it)
            .init();

        Self::new(Config::from_env())
    }

    /// Create a state object with an explicit configuration. Nothing here
    /// talks to the network; missing settings only surface when a function
    /// that needs them is invoked.
    pub fn new(config: Config) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("fmproxy-lambda/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let geocoder = GoogleGeocoder::new(http.clone(), config.geocode_endpoint.clone());

        Ok(Services {
            config,
            filemaker: FileMakerClient::new(http),
            geocoder,
        })
    }

    /// Handle an invocation of one of the proxy functions.
    ///
    /// As with any multi-function Lambda bundle, we work out which function
    /// we're being invoked as from the suffix of the function ARN. Request
    /// problems become error replies; only an unknown function is an `Err`.
    pub async fn dispatch(&self, mut arn: String, inv: Invocation) -> Result<Reply, Error> {
        // Local testing environment?
        if arn.ends_with(":test_function") {
            if let Some(local) = &self.config.localtest_arn {
                arn = local.clone();
            }
        }

        let function = Function::from_arn(&arn)
            .ok_or_else(|| -> Error { format!("unhandled function: {}", arn).into() })?;
        tracing::info!("invoked as {function:?} ({} request)", inv.method);

        let reply = match function {
            Function::AddressToGps => {
                addresstogps::handler(&inv, &self.config, &self.filemaker, &self.geocoder).await
            }
            Function::UpdateGps => updategps::handler(&inv, &self.config, &self.filemaker).await,
            Function::RegisterUuid => {
                deviceuuid::handler(&inv, &self.config, &self.filemaker).await
            }
            Function::UploadSignature => {
                signature::handler(&inv, &self.config, &self.filemaker).await
            }
        };

        Ok(reply)
    }
}
