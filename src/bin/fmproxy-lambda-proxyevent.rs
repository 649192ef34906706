//! "Proxy event" version of the FileMaker proxy Lambdas.
//!
//! This executable defines a server that expects to be interacted with
//! according to AWS API Gateway's "proxy event" protocol. Unlike the bare
//! version, it sees the real HTTP method, query string, headers and raw body,
//! which the signature upload needs.

use lambda_http::{run, service_fn, Error, Request, RequestExt};

use fmproxy_lambda::{invocation::Invocation, Services};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let svcs = Services::init().await?;
    let ref_svcs = &svcs;

    run(service_fn(|req: Request| async move {
        let context = req.lambda_context();
        let inv = Invocation::from_http(&req);
        let reply = ref_svcs
            .dispatch(context.invoked_function_arn, inv)
            .await?;
        Ok::<_, Error>(reply.into_http()?)
    }))
    .await?;
    Ok(())
}
