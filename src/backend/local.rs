//! SQLite-backed implementation of the repositories and identity provider.
//!
//! Used for offline work and tests; the schema mirrors the hosted tables.

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use std::path::PathBuf;
use tokio::sync::broadcast;

use super::{AuthProvider, PostRepository, ProfileRepository, RemoteError, ReviewRepository};
use crate::auth::session::{
    self, AuthEvent, CurrentUser, IdTokenClaims, IdentityProvider, Session,
};
use crate::db::models::{
    AiFeedback, Author, ImageList, NewPost, NewReview, Occasion, Post, PostRecord, Profile,
    ProfileUpdate, Rating, Review,
};
use crate::db::{parse_timestamp, timestamp_now};
use crate::state::DbPool;

const POST_COLUMNS: &str = "p.post_id, p.user_id, p.title, p.content, p.image_url, p.occasion, \
                            p.ai_feedback, p.created_at";

const REVIEW_SELECT: &str = "SELECT r.id, r.post_id, r.user_id, r.rating, r.review, r.created_at, \
                             pr.full_name, pr.avatar_url \
                             FROM reviews r LEFT JOIN profiles pr ON pr.id = r.user_id";

pub struct LocalBackend {
    pool: DbPool,
}

impl LocalBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let post_id: String = row.get(0)?;
    let image_text: String = row.get(4)?;
    let feedback_text: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    // One corrupt image list must not sink the whole feed.
    let image_url = ImageList::parse(&image_text).unwrap_or_else(|e| {
        tracing::warn!("Post {} has an unreadable image list: {}", post_id, e);
        ImageList::default()
    });
    Ok(Post {
        post_id,
        user_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        image_url,
        occasion: row.get(5)?,
        // A corrupt cache entry is treated as no cache.
        ai_feedback: feedback_text.and_then(|text| serde_json::from_str(&text).ok()),
        created_at: parse_timestamp(&created_at),
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<Review> {
    let rating: i64 = row.get(3)?;
    let created_at: String = row.get(5)?;
    Ok(Review {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        rating: Rating::new(rating).ok_or(rusqlite::Error::IntegralValueOutOfRange(3, rating))?,
        review: row.get(4)?,
        created_at: parse_timestamp(&created_at),
        author: Author::new(row.get(6)?, row.get(7)?),
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<Profile> {
    let created_at: String = row.get(3)?;
    Ok(Profile {
        id: row.get(0)?,
        full_name: row.get(1)?,
        avatar_url: row.get(2)?,
        created_at: parse_timestamp(&created_at),
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[async_trait]
impl PostRepository for LocalBackend {
    async fn list_posts(&self, owner: Option<&str>) -> Result<Vec<PostRecord>, RemoteError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {}, pr.full_name, pr.avatar_url
             FROM posts p
             LEFT JOIN profiles pr ON pr.id = p.user_id
             WHERE (?1 IS NULL OR p.user_id = ?1)
             ORDER BY p.created_at DESC, p.rowid DESC",
            POST_COLUMNS
        ))?;

        let posts = stmt
            .query_map(params![owner], |row| {
                Ok(PostRecord {
                    post: post_from_row(row)?,
                    author: Author::new(row.get(8)?, row.get(9)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, RemoteError> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                &format!("SELECT {} FROM posts p WHERE p.post_id = ?1", POST_COLUMNS),
                params![post_id],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, RemoteError> {
        let conn = self.pool.get()?;
        let post_id = uuid::Uuid::now_v7().to_string();
        let created_at = timestamp_now();

        conn.execute(
            "INSERT INTO posts (post_id, user_id, title, content, image_url, occasion, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                post_id,
                post.user_id,
                post.title,
                post.content,
                post.image_url.to_json_text(),
                post.occasion,
                created_at,
            ],
        )?;

        Ok(Post {
            post_id,
            user_id: post.user_id.clone(),
            title: post.title.clone(),
            content: post.content.clone(),
            image_url: post.image_url.clone(),
            occasion: post.occasion,
            ai_feedback: None,
            created_at: parse_timestamp(&created_at),
        })
    }

    async fn delete_post(&self, post_id: &str) -> Result<bool, RemoteError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM posts WHERE post_id = ?1", params![post_id])?;
        Ok(rows > 0)
    }

    async fn save_feedback(
        &self,
        post_id: &str,
        feedback: &AiFeedback,
    ) -> Result<(), RemoteError> {
        let conn = self.pool.get()?;
        let json = serde_json::to_string(feedback)?;
        let rows = conn.execute(
            "UPDATE posts SET ai_feedback = ?1 WHERE post_id = ?2",
            params![json, post_id],
        )?;
        if rows == 0 {
            return Err(RemoteError::NotFound(format!("post {}", post_id)));
        }
        Ok(())
    }

    async fn count_posts_by_user(&self, user_id: &str) -> Result<u64, RemoteError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    async fn list_ratings(&self, post_id: &str) -> Result<Vec<u8>, RemoteError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT rating FROM reviews WHERE post_id = ?1")?;
        let ratings = stmt
            .query_map(params![post_id], |row| row.get::<_, u8>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ratings)
    }

    async fn list_occasions(&self) -> Result<Vec<Occasion>, RemoteError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id, name FROM occasion ORDER BY name ASC")?;
        let occasions = stmt
            .query_map([], |row| {
                Ok(Occasion {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(occasions)
    }
}

#[async_trait]
impl ReviewRepository for LocalBackend {
    async fn list_reviews(&self, post_id: &str) -> Result<Vec<Review>, RemoteError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE r.post_id = ?1 ORDER BY r.created_at DESC, r.rowid DESC",
            REVIEW_SELECT
        ))?;
        let reviews = stmt
            .query_map(params![post_id], review_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(reviews)
    }

    async fn find_review_by_author(
        &self,
        post_id: &str,
        user_id: &str,
    ) -> Result<Option<Review>, RemoteError> {
        let conn = self.pool.get()?;
        let review = conn
            .query_row(
                &format!("{} WHERE r.post_id = ?1 AND r.user_id = ?2", REVIEW_SELECT),
                params![post_id, user_id],
                review_from_row,
            )
            .optional()?;
        Ok(review)
    }

    async fn get_review(&self, review_id: &str) -> Result<Option<Review>, RemoteError> {
        let conn = self.pool.get()?;
        let review = conn
            .query_row(
                &format!("{} WHERE r.id = ?1", REVIEW_SELECT),
                params![review_id],
                review_from_row,
            )
            .optional()?;
        Ok(review)
    }

    async fn insert_review(&self, review: &NewReview) -> Result<Review, RemoteError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();

        let result = conn.execute(
            "INSERT INTO reviews (id, post_id, user_id, rating, review, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                review.post_id,
                review.user_id,
                i64::from(review.rating),
                review.review,
                timestamp_now(),
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(RemoteError::Conflict(format!(
                    "review by {} on post {} already exists",
                    review.user_id, review.post_id
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let stored = conn.query_row(
            &format!("{} WHERE r.id = ?1", REVIEW_SELECT),
            params![id],
            review_from_row,
        )?;
        Ok(stored)
    }

    async fn delete_review(&self, review_id: &str) -> Result<bool, RemoteError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM reviews WHERE id = ?1", params![review_id])?;
        Ok(rows > 0)
    }

    async fn count_reviews_by_user(&self, user_id: &str) -> Result<u64, RemoteError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reviews WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[async_trait]
impl ProfileRepository for LocalBackend {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, RemoteError> {
        let conn = self.pool.get()?;
        let profile = conn
            .query_row(
                "SELECT id, full_name, avatar_url, created_at FROM profiles WHERE id = ?1",
                params![user_id],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, RemoteError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE profiles SET
               full_name = COALESCE(?1, full_name),
               avatar_url = COALESCE(?2, avatar_url)
             WHERE id = ?3",
            params![update.full_name, update.avatar_url, user_id],
        )?;
        if rows == 0 {
            return Err(RemoteError::NotFound(format!("profile {}", user_id)));
        }

        let profile = conn.query_row(
            "SELECT id, full_name, avatar_url, created_at FROM profiles WHERE id = ?1",
            params![user_id],
            profile_from_row,
        )?;
        Ok(profile)
    }

    async fn save_push_token(&self, user_id: &str, token: &str) -> Result<(), RemoteError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE profiles SET fcm_token = ?1 WHERE id = ?2",
            params![token, user_id],
        )?;
        if rows == 0 {
            return Err(RemoteError::NotFound(format!("profile {}", user_id)));
        }
        Ok(())
    }
}

/// Identity provider backed by the `sessions` table. The active token is
/// cached in a file so a session survives process restarts.
pub struct LocalAuth {
    pool: DbPool,
    token_file: PathBuf,
    session_hours: u64,
    events: broadcast::Sender<AuthEvent>,
}

impl LocalAuth {
    pub fn new(pool: DbPool, token_file: PathBuf, session_hours: u64) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            pool,
            token_file,
            session_hours,
            events,
        }
    }

    async fn cached_token(&self) -> Result<Option<String>, RemoteError> {
        match tokio::fs::read_to_string(&self.token_file).await {
            Ok(token) => {
                let token = token.trim().to_string();
                Ok((!token.is_empty()).then_some(token))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn publish(&self, event: AuthEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthProvider for LocalAuth {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        let Some(token) = self.cached_token().await? else {
            return Ok(None);
        };
        session::find_session(&self.pool, &token)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_id_token(
        &self,
        provider: IdentityProvider,
        token: &str,
    ) -> Result<Session, RemoteError> {
        let claims = IdTokenClaims::decode_unverified(token)?;
        let user_id = format!("{}:{}", provider.as_str(), claims.sub);

        // Name and avatar only seed a new profile; later edits win.
        let (full_name, avatar_url) = {
            let conn = self.pool.get()?;
            conn.execute(
                "INSERT INTO profiles (id, email, full_name, avatar_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET email = excluded.email",
                params![
                    user_id,
                    claims.email,
                    claims.name,
                    claims.picture,
                    timestamp_now()
                ],
            )?;
            conn.query_row(
                "SELECT full_name, avatar_url FROM profiles WHERE id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?
        };

        let user = CurrentUser {
            id: user_id,
            email: claims.email,
            full_name,
            avatar_url,
        };
        let session = session::create_session(&self.pool, &user, self.session_hours)?;

        if let Some(parent) = self.token_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.token_file, &session.access_token).await?;

        tracing::info!("Signed in {} via {}", session.user.id, provider.as_str());
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        if let Some(token) = self.cached_token().await? {
            session::delete_session(&self.pool, &token)?;
        }
        match tokio::fs::remove_file(&self.token_file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Signed out");
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionBridge;
    use crate::db::tests::test_pool;
    use crate::error::ErrorKind;
    use std::sync::Arc;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    fn seed_profile(pool: &DbPool, id: &str, name: &str) {
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO profiles (id, full_name, created_at) VALUES (?1, ?2, ?3)",
            params![id, name, timestamp_now()],
        )
        .unwrap();
    }

    fn id_token(sub: &str, name: &str) -> String {
        let payload = serde_json::json!({"sub": sub, "name": name, "email": "x@example.com"});
        format!(
            "h.{}.s",
            URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes())
        )
    }

    fn new_post(user_id: &str, title: &str) -> NewPost {
        NewPost {
            user_id: user_id.to_string(),
            title: Some(title.to_string()),
            content: None,
            image_url: ImageList::new(vec!["https://img/1.jpg".into()]),
            occasion: None,
        }
    }

    fn new_review(post_id: &str, user_id: &str, rating: i64) -> NewReview {
        NewReview {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            rating: Rating::new(rating).unwrap(),
            review: None,
        }
    }

    #[tokio::test]
    async fn posts_list_newest_first_with_author() {
        let pool = test_pool();
        seed_profile(&pool, "ada", "Ada");
        let backend = LocalBackend::new(pool);

        let first = backend.insert_post(&new_post("ada", "first")).await.unwrap();
        let second = backend.insert_post(&new_post("ada", "second")).await.unwrap();

        let posts = backend.list_posts(None).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].post.post_id, second.post_id);
        assert_eq!(posts[1].post.post_id, first.post_id);
        assert_eq!(posts[0].author.full_name, "Ada");
        assert_eq!(posts[0].post.image_url.urls(), ["https://img/1.jpg"]);
    }

    #[tokio::test]
    async fn list_posts_filters_by_owner() {
        let pool = test_pool();
        seed_profile(&pool, "ada", "Ada");
        seed_profile(&pool, "bo", "Bo");
        let backend = LocalBackend::new(pool);

        backend.insert_post(&new_post("ada", "a")).await.unwrap();
        backend.insert_post(&new_post("bo", "b")).await.unwrap();

        let mine = backend.list_posts(Some("bo")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].post.user_id, "bo");
        assert_eq!(mine[0].author.full_name, "Bo");
    }

    #[tokio::test]
    async fn corrupt_image_list_does_not_sink_the_feed() {
        let pool = test_pool();
        seed_profile(&pool, "ada", "Ada");
        let backend = LocalBackend::new(pool.clone());

        let good = backend.insert_post(&new_post("ada", "good")).await.unwrap();
        pool.get()
            .unwrap()
            .execute(
                "INSERT INTO posts (post_id, user_id, title, image_url, created_at)
                 VALUES ('broken', 'ada', 'broken', '[not json', '2020-01-01T00:00:00+00:00')",
                [],
            )
            .unwrap();

        let posts = backend.list_posts(None).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].post.post_id, good.post_id);
        assert_eq!(posts[0].post.image_url.urls(), ["https://img/1.jpg"]);
        assert_eq!(posts[1].post.post_id, "broken");
        assert!(posts[1].post.image_url.is_empty());
    }

    #[tokio::test]
    async fn duplicate_review_is_a_conflict() {
        let pool = test_pool();
        seed_profile(&pool, "ada", "Ada");
        seed_profile(&pool, "bo", "Bo");
        let backend = LocalBackend::new(pool);
        let post = backend.insert_post(&new_post("ada", "a")).await.unwrap();

        backend
            .insert_review(&new_review(&post.post_id, "bo", 4))
            .await
            .unwrap();
        let err = backend
            .insert_review(&new_review(&post.post_id, "bo", 2))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Conflict(_)));
    }

    #[tokio::test]
    async fn inserted_review_carries_author_join() {
        let pool = test_pool();
        seed_profile(&pool, "ada", "Ada");
        seed_profile(&pool, "bo", "Bo");
        let backend = LocalBackend::new(pool);
        let post = backend.insert_post(&new_post("ada", "a")).await.unwrap();

        let review = backend
            .insert_review(&new_review(&post.post_id, "bo", 5))
            .await
            .unwrap();
        assert_eq!(review.author.full_name, "Bo");
        assert_eq!(review.rating.value(), 5);
        assert_eq!(backend.list_ratings(&post.post_id).await.unwrap(), vec![5]);
        assert_eq!(backend.count_reviews_by_user("bo").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn deleting_a_post_cascades_to_reviews() {
        let pool = test_pool();
        seed_profile(&pool, "ada", "Ada");
        seed_profile(&pool, "bo", "Bo");
        let backend = LocalBackend::new(pool);
        let post = backend.insert_post(&new_post("ada", "a")).await.unwrap();
        backend
            .insert_review(&new_review(&post.post_id, "bo", 3))
            .await
            .unwrap();

        assert!(backend.delete_post(&post.post_id).await.unwrap());
        assert!(!backend.delete_post(&post.post_id).await.unwrap());
        assert_eq!(backend.count_reviews_by_user("bo").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn feedback_is_cached_on_the_post() {
        let pool = test_pool();
        seed_profile(&pool, "ada", "Ada");
        let backend = LocalBackend::new(pool);
        let post = backend.insert_post(&new_post("ada", "a")).await.unwrap();

        let feedback = AiFeedback {
            rating: 7.5,
            fit_and_proportion: "fit".into(),
            color_and_pattern: "color".into(),
            style_and_occasion: "style".into(),
            accessories_and_details: "acc".into(),
            grooming_and_presentation: "groom".into(),
        };
        backend.save_feedback(&post.post_id, &feedback).await.unwrap();

        let stored = backend.get_post(&post.post_id).await.unwrap().unwrap();
        assert_eq!(stored.ai_feedback, Some(feedback.clone()));

        let missing = backend.save_feedback("nope", &feedback).await.unwrap_err();
        assert!(matches!(missing, RemoteError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_profile_keeps_unset_fields() {
        let pool = test_pool();
        seed_profile(&pool, "ada", "Ada");
        let backend = LocalBackend::new(pool);

        let updated = backend
            .update_profile(
                "ada",
                &ProfileUpdate {
                    full_name: None,
                    avatar_url: Some("https://img/new.png".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Ada"));
        assert_eq!(updated.avatar_url.as_deref(), Some("https://img/new.png"));
    }

    #[tokio::test]
    async fn occasions_are_sorted_by_name() {
        let backend = LocalBackend::new(test_pool());
        let names: Vec<String> = backend
            .list_occasions()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert!(!names.is_empty());
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn local_auth_sign_in_restore_and_sign_out() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = test_pool();
        let auth = LocalAuth::new(pool.clone(), tmp.path().join("session"), 24);
        let mut events = auth.subscribe();

        assert!(auth.get_session().await.unwrap().is_none());

        let session = auth
            .sign_in_with_id_token(IdentityProvider::Google, &id_token("123", "Ada"))
            .await
            .unwrap();
        assert_eq!(session.user.id, "google:123");
        assert!(matches!(events.recv().await.unwrap(), AuthEvent::SignedIn(_)));

        let restored = auth.get_session().await.unwrap().unwrap();
        assert_eq!(restored.access_token, session.access_token);
        assert_eq!(restored.user.full_name.as_deref(), Some("Ada"));

        auth.sign_out().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut);
        assert!(auth.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_id_token_is_a_validation_error() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = test_pool();
        let auth = Arc::new(LocalAuth::new(pool.clone(), tmp.path().join("session"), 24));
        let mut bridge = SessionBridge::new(auth);
        bridge.start().await;

        let err = bridge
            .sign_in(IdentityProvider::Google, "not-a-jwt")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());

        let profiles: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))
            .unwrap();
        assert_eq!(profiles, 0);
        assert!(!tmp.path().join("session").exists());
    }

    #[tokio::test]
    async fn repeated_sign_in_keeps_edited_profile_name() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = test_pool();
        let auth = LocalAuth::new(pool.clone(), tmp.path().join("session"), 24);
        let backend = LocalBackend::new(pool);

        auth.sign_in_with_id_token(IdentityProvider::Google, &id_token("1", "Ada"))
            .await
            .unwrap();
        backend
            .update_profile(
                "google:1",
                &ProfileUpdate {
                    full_name: Some("Ada L.".into()),
                    avatar_url: None,
                },
            )
            .await
            .unwrap();
        auth.sign_in_with_id_token(IdentityProvider::Google, &id_token("1", "Ada"))
            .await
            .unwrap();

        let profile = backend.get_profile("google:1").await.unwrap().unwrap();
        assert_eq!(profile.full_name.as_deref(), Some("Ada L."));
        let session = auth.get_session().await.unwrap().unwrap();
        assert_eq!(session.user.full_name.as_deref(), Some("Ada L."));
    }
}
