use crate::domain::models::{validate_non_empty, Session};
use crate::infrastructure::auth_client::{
    AuthClient, AuthTokenResponse, AuthUser, PasswordCredentials, SignUpResponse,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::session_store::{ProjectKey, SessionStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

const SESSION_LEEWAY_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureSessionResult {
    Existing(Session),
    Refreshed(Session),
    LoginRequired,
}

impl EnsureSessionResult {
    pub fn into_session(self) -> Result<Session, InfraError> {
        match self {
            Self::Existing(session) | Self::Refreshed(session) => Ok(session),
            Self::LoginRequired => Err(InfraError::SessionRequired),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpResult {
    SignedIn(Session),
    ConfirmationRequired(AuthUser),
}

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct SessionManager<S, C>
where
    S: SessionStore + ?Sized,
    C: AuthClient + ?Sized,
{
    session_store: Arc<S>,
    auth_client: Arc<C>,
    project: ProjectKey,
    now_provider: NowProvider,
}

impl<S, C> SessionManager<S, C>
where
    S: SessionStore + ?Sized,
    C: AuthClient + ?Sized,
{
    pub fn new(session_store: Arc<S>, auth_client: Arc<C>, project: ProjectKey) -> Self {
        Self {
            session_store,
            auth_client,
            project,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn is_session_valid(&self, session: &Session) -> bool {
        session.is_valid_at((self.now_provider)(), SESSION_LEEWAY_SECONDS)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, InfraError> {
        let credentials = validated_credentials(email, password)?;
        let response = self.auth_client.sign_in_with_password(credentials).await?;
        let session = self.session_from_response(response, None);
        self.session_store.save_session(&self.project, &session)?;
        Ok(session)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResult, InfraError> {
        let credentials = validated_credentials(email, password)?;
        match self.auth_client.sign_up(credentials).await? {
            SignUpResponse::SignedIn(response) => {
                let session = self.session_from_response(response, None);
                self.session_store.save_session(&self.project, &session)?;
                Ok(SignUpResult::SignedIn(session))
            }
            SignUpResponse::ConfirmationRequired(user) => Ok(SignUpResult::ConfirmationRequired(user)),
        }
    }

    pub async fn ensure_session(&self) -> Result<EnsureSessionResult, InfraError> {
        let Some(stored) = self.session_store.load_session(&self.project)? else {
            return Ok(EnsureSessionResult::LoginRequired);
        };

        if self.is_session_valid(&stored) {
            return Ok(EnsureSessionResult::Existing(stored));
        }

        let Some(refresh_token) = stored.refresh_token.clone() else {
            return Ok(EnsureSessionResult::LoginRequired);
        };

        match self.auth_client.refresh_session(&refresh_token).await {
            Ok(response) => {
                let session = self.session_from_response(response, stored.refresh_token.clone());
                self.session_store.save_session(&self.project, &session)?;
                Ok(EnsureSessionResult::Refreshed(session))
            }
            Err(InfraError::Auth(_)) => Ok(EnsureSessionResult::LoginRequired),
            Err(error) => Err(error),
        }
    }

    /// Drops the local session even when the remote sign-out fails; the
    /// access token simply runs out on the server side.
    pub async fn sign_out(&self) -> Result<(), InfraError> {
        let stored = self.session_store.load_session(&self.project)?;
        self.session_store.delete_session(&self.project)?;
        if let Some(session) = stored {
            if let Err(error) = self.auth_client.sign_out(&session.access_token).await {
                tracing::warn!(%error, "remote sign-out failed");
            }
        }
        Ok(())
    }

    fn session_from_response(
        &self,
        response: AuthTokenResponse,
        fallback_refresh_token: Option<String>,
    ) -> Session {
        let expires_at = (self.now_provider)() + Duration::seconds(response.expires_in.max(0));
        Session {
            user_id: response.user.id,
            email: response.user.email,
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at,
        }
    }
}

fn validated_credentials(email: &str, password: &str) -> Result<PasswordCredentials, InfraError> {
    validate_non_empty(email, "email").map_err(InfraError::Validation)?;
    validate_non_empty(password, "password").map_err(InfraError::Validation)?;
    Ok(PasswordCredentials {
        email: email.trim().to_string(),
        password: password.to_string(),
    })
}
