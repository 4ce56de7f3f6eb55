//! Bearer-token injection with one silent refresh on 401.
//!
//! A request carrying an access token that comes back 401 triggers exactly
//! one token refresh followed by exactly one retry. Concurrent 401s share a
//! single refresh: refreshes are serialized, and a caller that finds the
//! token already rotated by someone else retries with the new token
//! instead of refreshing again.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::auth_api::AuthResponse;
use crate::error::ClientError;
use crate::session::AuthSession;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

const REFRESH_PATH: &str = "/auth/refresh";

#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn HttpTransport>,
    session: AuthSession,
    refresh_lock: Arc<Mutex<()>>,
}

impl AuthenticatedClient {
    pub fn new(transport: Arc<dyn HttpTransport>, session: AuthSession) -> Self {
        Self {
            transport,
            session,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Send without credentials (login, register, public listings).
    pub async fn send_anonymous(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        self.transport.send(request).await
    }

    /// Send with the current access token, refreshing once on 401.
    ///
    /// Without an access token the request goes out unauthenticated and a
    /// 401 is returned as-is. A second 401 after the retry is also returned
    /// as-is. If the refresh fails, all tokens are cleared and the refresh
    /// error is returned.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let Some(token) = self.session.access_token() else {
            return self.transport.send(request).await;
        };

        let response = self.transport.send(request.clone().bearer(&token)).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        tracing::info!(path = %request.path, "Access token rejected, refreshing");
        let fresh = self.refresh_after(&token).await?;
        self.transport.send(request.bearer(fresh)).await
    }

    /// Refresh unconditionally. Clears the session on failure.
    pub async fn refresh_tokens(&self) -> Result<AuthResponse, ClientError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Obtain an access token newer than `stale`.
    async fn refresh_after(&self, stale: &str) -> Result<String, ClientError> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(current) = self.session.access_token() {
            if current != stale {
                tracing::debug!("Token already rotated by a concurrent refresh");
                return Ok(current);
            }
        }
        Ok(self.refresh_locked().await?.access_token)
    }

    async fn refresh_locked(&self) -> Result<AuthResponse, ClientError> {
        let result = self.request_refresh().await;
        match &result {
            Ok(auth) => self.session.set_tokens(&auth.access_token, &auth.refresh_token),
            Err(err) => {
                tracing::warn!(error = %err, "Token refresh failed, signing out");
                self.session.clear_tokens();
            }
        }
        result
    }

    async fn request_refresh(&self) -> Result<AuthResponse, ClientError> {
        let refresh = self.session.refresh_token().ok_or(ClientError::AuthRequired)?;
        self.transport
            .send(HttpRequest::post(REFRESH_PATH).bearer(refresh))
            .await?
            .parse()
    }
}
