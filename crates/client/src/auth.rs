// Session Authenticator: exchanges credentials for a bearer token and the
// user id, via `/auth/signin` then `/auth/me`.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::AuthError;
use crate::session::{Credentials, Session};
use crate::transport::ConsoleApi;

#[derive(Clone)]
pub struct Authenticator {
    api: Arc<dyn ConsoleApi>,
    credentials: Credentials,
}

impl Authenticator {
    pub fn new(api: Arc<dyn ConsoleApi>, credentials: Credentials) -> Self {
        Self { api, credentials }
    }

    /// Sign in, resolve the user id, and store both on `session`.
    ///
    /// Returns the token now held by the session.
    pub async fn login(&self, session: &Session) -> Result<String, AuthError> {
        debug!(email = %self.credentials.email, "signing in");
        let signin = self.api.sign_in(&self.credentials.email, &self.credentials.password).await?;
        if !signin.is_success() {
            return Err(AuthError::Status { step: "sign-in", status: signin.status, body: signin.raw });
        }
        let token = match signin.refreshed_token() {
            Some(token) if signin.body.ok => token.to_string(),
            _ => return Err(AuthError::Rejected { step: "sign-in", body: signin.raw }),
        };

        let me = self.api.me(&token).await?;
        if !me.is_success() {
            return Err(AuthError::Status { step: "user info", status: me.status, body: me.raw });
        }
        let user_id = match me.body.user_id.as_deref() {
            Some(id) if me.body.ok && !id.is_empty() => id.to_string(),
            _ => return Err(AuthError::Rejected { step: "user info", body: me.raw }),
        };
        let token = me.refreshed_token().map_or(token, str::to_owned);

        session.set_identity(token.clone(), user_id.clone());
        info!(user_id = %user_id, "signed in");
        Ok(token)
    }
}
