//! "Bare" version of the FileMaker proxy Lambdas.
//!
//! This executable defines a server that you can easily interact with locally.
//! Every event payload is treated as the JSON body of a POST. For the cloud
//! deployment, we need to use the "proxy event" version, which understands
//! API Gateway's "proxy event" framework, including multipart uploads.

use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;

use fmproxy_lambda::{invocation::Invocation, Services};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let svcs = Services::init().await?;
    let ref_svcs = &svcs;

    run(service_fn(|event: LambdaEvent<Value>| async move {
        let (payload, context) = event.into_parts();
        let reply = ref_svcs
            .dispatch(context.invoked_function_arn, Invocation::json(&payload))
            .await?;
        Ok::<Value, Error>(reply.into_value())
    }))
    .await?;
    Ok(())
}
