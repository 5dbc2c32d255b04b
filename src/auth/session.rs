use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::backend::RemoteError;
use crate::db::parse_timestamp;
use crate::state::DbPool;

/// External identity provider whose ID tokens we accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProvider {
    Google,
}

impl IdentityProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            IdentityProvider::Google => "google",
        }
    }
}

/// Represents the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub user: CurrentUser,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Session change notification published by an auth provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    TokenRefreshed(Session),
    SignedOut,
}

/// Claims read from an OpenID Connect ID token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl IdTokenClaims {
    /// Decode the payload segment of a JWT. The signature is NOT checked;
    /// only the local backend relies on this.
    pub fn decode_unverified(token: &str) -> Result<Self, RemoteError> {
        let payload = token
            .split('.')
            .nth(1)
            .ok_or_else(|| RemoteError::InvalidToken("not a JWT".into()))?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| RemoteError::InvalidToken(format!("payload: {}", e)))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| RemoteError::InvalidToken(format!("claims: {}", e)))
    }
}

/// Create a new session for a user. Returns the session with its token.
pub fn create_session(
    pool: &DbPool,
    user: &CurrentUser,
    hours: u64,
) -> Result<Session, RemoteError> {
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();
    let expires_at = Utc::now() + Duration::hours(hours as i64);

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, user.id, token, expires_at.to_rfc3339()],
    )?;

    Ok(Session {
        access_token: token,
        refresh_token: None,
        expires_at,
        user: user.clone(),
    })
}

/// Look up an unexpired session by token, joined with its profile.
pub fn find_session(pool: &DbPool, token: &str) -> Result<Option<Session>, RemoteError> {
    let conn = pool.get()?;

    let result = conn.query_row(
        "SELECT s.expires_at, p.id, p.email, p.full_name, p.avatar_url FROM sessions s \
         JOIN profiles p ON p.id = s.user_id \
         WHERE s.token = ?1",
        params![token],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                CurrentUser {
                    id: row.get(1)?,
                    email: row.get(2)?,
                    full_name: row.get(3)?,
                    avatar_url: row.get(4)?,
                },
            ))
        },
    );

    match result {
        Ok((expires_at, user)) => {
            let session = Session {
                access_token: token.to_string(),
                refresh_token: None,
                expires_at: parse_timestamp(&expires_at),
                user,
            };
            if session.is_expired(Utc::now()) {
                Ok(None)
            } else {
                Ok(Some(session))
            }
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<(), RemoteError> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}
