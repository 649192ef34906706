//! FileMaker Data API sessions.
//!
//! Every request logs in, does its work, and logs out again. Sessions are
//! never cached or shared between requests. [`with_session`] owns that
//! lifecycle so that a handler can't forget the logout: it runs exactly once
//! for every successful login, whether the work succeeded, failed, or
//! panicked.

use futures_util::FutureExt;
use lambda_runtime::tracing;
use std::{fmt, future::Future, panic::AssertUnwindSafe, sync::Arc};

use crate::{config::Account, error::ProxyError, filemaker::DataApi};

/// The opaque token handed out by a FileMaker login.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(Arc<str>);

impl SessionToken {
    pub fn new<S: AsRef<str>>(token: S) -> Self {
        SessionToken(Arc::from(token.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are live credentials until the logout goes through.
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// A logged-in session against one database.
#[derive(Clone, Debug)]
pub struct Session {
    pub account: Account,
    pub database: String,
    pub token: SessionToken,
}

/// Log in to `database`, run `body` with the session, and log out again.
///
/// The logout is best-effort: if it fails we log that and still return the
/// body's result. A panic in `body` is caught just long enough to log out,
/// then resumed.
pub async fn with_session<A, F, Fut, T>(
    api: &A,
    account: &Account,
    database: &str,
    body: F,
) -> Result<T, ProxyError>
where
    A: DataApi + ?Sized,
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T, ProxyError>>,
{
    let token = api.login(account, database).await?;
    let session = Session {
        account: account.clone(),
        database: database.to_owned(),
        token,
    };
    tracing::info!("logged in to FileMaker database `{database}`");

    let outcome = AssertUnwindSafe(body(session.clone()))
        .catch_unwind()
        .await;

    match api.logout(&session).await {
        Ok(()) => tracing::info!("logged out of FileMaker database `{database}`"),
        Err(e) => tracing::warn!("FileMaker logout failed (ignoring): {e}"),
    }

    match outcome {
        Ok(result) => result,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
