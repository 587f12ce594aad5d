use crate::infrastructure::config::RemoteConfig;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

#[derive(Debug, Clone)]
pub struct PasswordCredentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub user: AuthUser,
}

/// Outcome of a sign-up. Projects that require e-mail confirmation hand out
/// no session until the address is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpResponse {
    SignedIn(AuthTokenResponse),
    ConfirmationRequired(AuthUser),
}

#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn sign_up(&self, credentials: PasswordCredentials) -> Result<SignUpResponse, InfraError>;

    async fn sign_in_with_password(
        &self,
        credentials: PasswordCredentials,
    ) -> Result<AuthTokenResponse, InfraError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthTokenResponse, InfraError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAuthClient {
    client: Client,
    auth_base: Url,
    anon_key: String,
}

#[derive(Debug, serde::Deserialize)]
struct UserPayload {
    id: String,
    email: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: Option<UserPayload>,
    // sign-up without a session returns the bare user object
    id: Option<String>,
    email: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct AuthErrorPayload {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl ReqwestAuthClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, InfraError> {
        let mut auth_base = Url::parse(&config.url)
            .map_err(|error| InfraError::InvalidConfig(format!("invalid remote url: {error}")))?;
        {
            let mut segments = auth_base.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("remote url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("auth");
            segments.push("v1");
        }
        Ok(Self {
            client: Client::new(),
            auth_base,
            anon_key: config.anon_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.auth_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(path);
        }
        url
    }

    fn auth_http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let detail = serde_json::from_str::<AuthErrorPayload>(body)
            .ok()
            .and_then(|payload| payload.error_description.or(payload.msg).or(payload.message));
        let message = match detail {
            Some(detail) => format!("auth error: http {}; {detail}", status.as_u16()),
            None if body.trim().is_empty() => format!("auth error: http {}", status.as_u16()),
            None => format!("auth error: http {}; body={body}", status.as_u16()),
        };
        InfraError::Auth(message)
    }

    async fn post_json(
        &self,
        url: Url,
        payload: &serde_json::Value,
        bearer: Option<&str>,
    ) -> Result<String, InfraError> {
        let mut request = self.client.post(url).header("apikey", &self.anon_key).json(payload);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|error| InfraError::Auth(format!("request failed: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Auth(format!("failed reading auth response: {error}")))?;

        if !status.is_success() {
            return Err(Self::auth_http_error(status, &body));
        }
        Ok(body)
    }

    async fn token_request(&self, grant_type: &str, payload: serde_json::Value) -> Result<AuthTokenResponse, InfraError> {
        let mut url = self.endpoint("token");
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        let body = self.post_json(url, &payload, None).await?;
        match parse_token_payload(&body)? {
            SignUpResponse::SignedIn(token) => Ok(token),
            SignUpResponse::ConfirmationRequired(_) => Err(InfraError::Auth(
                "token response did not include an access token".to_string(),
            )),
        }
    }
}

fn parse_token_payload(body: &str) -> Result<SignUpResponse, InfraError> {
    let parsed: TokenPayload = serde_json::from_str(body)
        .map_err(|error| InfraError::Auth(format!("invalid token payload: {error}")))?;

    let user = match (parsed.user, parsed.id) {
        (Some(user), _) => AuthUser {
            id: user.id,
            email: user.email,
        },
        (None, Some(id)) => AuthUser {
            id,
            email: parsed.email,
        },
        (None, None) => {
            return Err(InfraError::Auth("auth response did not include a user".to_string()));
        }
    };

    match parsed
        .access_token
        .filter(|token| !token.trim().is_empty())
    {
        Some(access_token) => Ok(SignUpResponse::SignedIn(AuthTokenResponse {
            access_token,
            refresh_token: parsed.refresh_token,
            expires_in: parsed.expires_in.unwrap_or(3600),
            user,
        })),
        None => Ok(SignUpResponse::ConfirmationRequired(user)),
    }
}

#[async_trait]
impl AuthClient for ReqwestAuthClient {
    async fn sign_up(&self, credentials: PasswordCredentials) -> Result<SignUpResponse, InfraError> {
        let payload = serde_json::json!({
            "email": credentials.email,
            "password": credentials.password,
        });
        let body = self.post_json(self.endpoint("signup"), &payload, None).await?;
        parse_token_payload(&body)
    }

    async fn sign_in_with_password(
        &self,
        credentials: PasswordCredentials,
    ) -> Result<AuthTokenResponse, InfraError> {
        self.token_request(
            "password",
            serde_json::json!({
                "email": credentials.email,
                "password": credentials.password,
            }),
        )
        .await
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthTokenResponse, InfraError> {
        self.token_request(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), InfraError> {
        self.post_json(self.endpoint("logout"), &serde_json::json!({}), Some(access_token))
            .await?;
        Ok(())
    }
}
