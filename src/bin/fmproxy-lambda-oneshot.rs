//! "Oneshot" version of the FileMaker proxy Lambdas.
//!
//! This executable runs one function, based on arguments given on the
//! command line. The payload is sent as the JSON body of a POST.

use lambda_runtime::Error;
use serde_json::Value;
use std::env;

use fmproxy_lambda::{invocation::Invocation, Services};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let mut args = env::args();
    args.next(); // skip argv[0]

    let arn = args.next().ok_or_else(|| -> Error {
        "first argument should be the function to run (address-to-gps, update-gps, register-uuid; \
         upload-signature takes a multipart body and needs the proxy-event binary)"
            .into()
    })?;

    let json_text = args
        .next()
        .ok_or_else(|| -> Error { "second argument should be JSON payload text".into() })?;
    let payload: Value = serde_json::from_str(&json_text)?;

    let svcs = Services::init().await?;
    let reply = svcs.dispatch(arn, Invocation::json(&payload)).await?;

    serde_json::to_writer(std::io::stdout().lock(), &reply.into_value())?;
    Ok(())
}
