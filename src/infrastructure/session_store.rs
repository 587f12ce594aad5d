use crate::domain::models::Session;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use url::Url;

const KEYRING_SERVICE: &str = "timecalc.session";

/// Names the remote project a session was issued by: host, port when it is
/// not the scheme default, and path, lower-cased and without a trailing `/`.
/// `https://Abc.supabase.co/` and `https://abc.supabase.co` share one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn from_remote_url(remote_url: &str) -> Result<Self, InfraError> {
        let parsed = Url::parse(remote_url.trim())
            .map_err(|error| InfraError::InvalidConfig(format!("invalid remote url: {error}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| InfraError::InvalidConfig("remote url has no host".to_string()))?
            .to_ascii_lowercase();

        let mut key = host;
        if let Some(port) = parsed.port() {
            key.push(':');
            key.push_str(&port.to_string());
        }
        let path = parsed.path().trim_end_matches('/');
        if !path.is_empty() {
            key.push_str(path);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Sessions are kept per project so signing in against one backend never
/// replaces the session of another.
pub trait SessionStore: Send + Sync {
    fn save_session(&self, project: &ProjectKey, session: &Session) -> Result<(), InfraError>;
    fn load_session(&self, project: &ProjectKey) -> Result<Option<Session>, InfraError>;
    fn delete_session(&self, project: &ProjectKey) -> Result<(), InfraError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    project: String,
    session: Session,
}

fn encode_session(project: &ProjectKey, session: &Session) -> Result<String, InfraError> {
    let stored = StoredSession {
        project: project.as_str().to_string(),
        session: session.clone(),
    };
    Ok(serde_json::to_string(&stored)?)
}

/// A payload written for another project is treated as absent.
fn decode_session(project: &ProjectKey, payload: &str) -> Result<Option<Session>, InfraError> {
    let stored = serde_json::from_str::<StoredSession>(payload)
        .map_err(|error| InfraError::Credential(format!("unreadable stored session: {error}")))?;
    if stored.project != project.as_str() {
        tracing::warn!(
            expected = project.as_str(),
            found = %stored.project,
            "ignoring session stored for another project"
        );
        return Ok(None);
    }
    Ok(Some(stored.session))
}

/// Platform keychain, one entry per project under a shared service name.
#[derive(Debug, Clone)]
pub struct KeyringSessionStore {
    service_name: String,
}

impl KeyringSessionStore {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    fn entry(&self, project: &ProjectKey) -> Result<keyring::Entry, InfraError> {
        keyring::Entry::new(&self.service_name, project.as_str())
            .map_err(|error| InfraError::Credential(error.to_string()))
    }
}

impl Default for KeyringSessionStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl SessionStore for KeyringSessionStore {
    fn save_session(&self, project: &ProjectKey, session: &Session) -> Result<(), InfraError> {
        let payload = encode_session(project, session)?;
        self.entry(project)?
            .set_password(&payload)
            .map_err(|error| InfraError::Credential(error.to_string()))
    }

    fn load_session(&self, project: &ProjectKey) -> Result<Option<Session>, InfraError> {
        match self.entry(project)?.get_password() {
            Ok(payload) => decode_session(project, &payload),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }

    fn delete_session(&self, project: &ProjectKey) -> Result<(), InfraError> {
        match self.entry(project)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(InfraError::Credential(error.to_string())),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<ProjectKey, Session>>,
}

impl InMemorySessionStore {
    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<ProjectKey, Session>>, InfraError> {
        self.sessions
            .lock()
            .map_err(|error| InfraError::Credential(format!("session map lock poisoned: {error}")))
    }
}

impl SessionStore for InMemorySessionStore {
    fn save_session(&self, project: &ProjectKey, session: &Session) -> Result<(), InfraError> {
        self.sessions()?.insert(project.clone(), session.clone());
        Ok(())
    }

    fn load_session(&self, project: &ProjectKey) -> Result<Option<Session>, InfraError> {
        Ok(self.sessions()?.get(project).cloned())
    }

    fn delete_session(&self, project: &ProjectKey) -> Result<(), InfraError> {
        self.sessions()?.remove(project);
        Ok(())
    }
}
