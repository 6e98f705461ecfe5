use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::AudioSource;

/// Opaque session token identifying one analysis run. Doubles as the
/// filename prefix for every temporary artifact the run creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Hex form without hyphens, used as the artifact prefix.
    pub fn as_prefix(&self) -> String {
        self.0.simple().to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity owning the single-flight slot. Authenticated callers supply
/// their user id; anonymous callers get a key derived from the session
/// token, so every browser tab competes only with itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self(format!("user:{}", user_id.into()))
    }

    pub fn anonymous(job_id: &JobId) -> Self {
        Self(format!("anon:{}", job_id.as_prefix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub client_key: ClientKey,
    pub source: AudioSource,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(client_key: ClientKey, source: AudioSource, language: String) -> Self {
        Self {
            id: JobId::new(),
            client_key,
            source,
            language,
            created_at: Utc::now(),
        }
    }
}
