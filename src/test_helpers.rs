//! Shared fixtures for unit tests.

use chrono::{Duration, Utc};
use rusqlite::params;
use std::sync::Arc;

use crate::auth::{CurrentUser, Session, SessionContext, SessionState};
use crate::backend::local::LocalBackend;
use crate::backend::PostRepository;
use crate::db::models::{ImageList, NewPost, Post};
use crate::db::timestamp_now;

/// In-memory backend with the given `(id, name)` profiles.
pub fn backend_with_profiles(profiles: &[(&str, &str)]) -> Arc<LocalBackend> {
    let pool = crate::db::tests::test_pool();
    {
        let conn = pool.get().unwrap();
        for (id, name) in profiles {
            conn.execute(
                "INSERT INTO profiles (id, full_name, created_at) VALUES (?1, ?2, ?3)",
                params![id, name, timestamp_now()],
            )
            .unwrap();
        }
    }
    Arc::new(LocalBackend::new(pool))
}

pub fn signed_in(user_id: &str) -> SessionContext {
    SessionContext::fixed(SessionState::Authenticated(Session {
        access_token: "test-token".into(),
        refresh_token: None,
        expires_at: Utc::now() + Duration::hours(1),
        user: CurrentUser {
            id: user_id.to_string(),
            email: None,
            full_name: None,
            avatar_url: None,
        },
    }))
}

pub fn signed_out() -> SessionContext {
    SessionContext::fixed(SessionState::Unauthenticated)
}

pub async fn seed_post(backend: &LocalBackend, user_id: &str, title: &str) -> Post {
    backend
        .insert_post(&NewPost {
            user_id: user_id.to_string(),
            title: Some(title.to_string()),
            content: None,
            image_url: ImageList::new(vec![format!("https://img/{}.jpg", title)]),
            occasion: None,
        })
        .await
        .unwrap()
}
