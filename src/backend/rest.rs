//! Hosted backend reached over HTTP.
//!
//! Speaks the PostgREST (`/rest/v1`), storage (`/storage/v1`), functions
//! (`/functions/v1`) and auth (`/auth/v1`) dialects. Every request carries the
//! project's anon key; requests made while signed in also carry the session's
//! bearer token so row-level policies see the user.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderValue, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use url::Url;

use super::{
    AuthProvider, ObjectStorage, PostRepository, ProfileRepository, RemoteError, ReviewRepository,
};
use crate::auth::session::{AuthEvent, CurrentUser, IdentityProvider, Session};
use crate::db::models::{
    AiFeedback, Author, ImageList, NewPost, NewReview, Occasion, Post, PostRecord, Profile,
    ProfileUpdate, Rating, Review,
};

const POST_SELECT: &str = "post_id,user_id,title,content,image_url,occasion,ai_feedback,created_at,\
                           profiles(full_name,avatar_url)";
const REVIEW_SELECT: &str =
    "id,post_id,user_id,rating,review,created_at,profiles(full_name,avatar_url)";
const PROFILE_SELECT: &str = "id,full_name,avatar_url,created_at";

/// Shared HTTP plumbing: base URL, anon key and the active session.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl RestClient {
    pub fn new(base: Url, anon_key: impl Into<String>) -> Self {
        let base = if base.path().ends_with('/') {
            base
        } else {
            let mut base = base;
            base.set_path(&format!("{}/", base.path()));
            base
        };
        Self {
            http: reqwest::Client::new(),
            base,
            anon_key: anon_key.into(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
        self.base
            .join(path)
            .map_err(|e| RemoteError::Unavailable(format!("bad endpoint {}: {}", path, e)))
    }

    pub(crate) async fn request(
        &self,
        method: Method,
        path: &str,
    ) -> Result<RequestBuilder, RemoteError> {
        let bearer = match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.anon_key.clone(),
        };
        Ok(self
            .http
            .request(method, self.endpoint(path)?)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer))
    }

    async fn set_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }
}

/// Map non-success statuses onto [`RemoteError`].
pub(crate) async fn check(resp: Response) -> Result<Response, RemoteError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(body),
        StatusCode::CONFLICT => RemoteError::Conflict(body),
        _ => RemoteError::Status {
            status: status.as_u16(),
            body,
        },
    })
}

/// Total from a `Content-Range: 0-9/42` (or `*/42`) header.
fn parse_content_range_total(value: Option<&HeaderValue>) -> Result<u64, RemoteError> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|total| total.parse().ok())
        .ok_or_else(|| RemoteError::Unavailable("missing row count in response".into()))
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[derive(Deserialize)]
struct PostRow {
    post_id: String,
    user_id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    image_url: ImageList,
    #[serde(default)]
    occasion: Option<i64>,
    #[serde(default)]
    ai_feedback: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    profiles: Option<serde_json::Value>,
}

impl PostRow {
    fn into_record(self) -> PostRecord {
        let author = Author::from_join(self.profiles.as_ref());
        PostRecord {
            post: Post {
                post_id: self.post_id,
                user_id: self.user_id,
                title: self.title,
                content: self.content,
                image_url: self.image_url,
                occasion: self.occasion,
                ai_feedback: self
                    .ai_feedback
                    .and_then(|value| serde_json::from_value(value).ok()),
                created_at: self.created_at,
            },
            author,
        }
    }
}

#[derive(Deserialize)]
struct ReviewRow {
    id: String,
    post_id: String,
    user_id: String,
    rating: Rating,
    #[serde(default)]
    review: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    profiles: Option<serde_json::Value>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        let author = Author::from_join(row.profiles.as_ref());
        Review {
            id: row.id,
            post_id: row.post_id,
            user_id: row.user_id,
            rating: row.rating,
            review: row.review,
            created_at: row.created_at,
            author,
        }
    }
}

#[derive(Deserialize)]
struct RatingRow {
    rating: i64,
}

pub struct RestBackend {
    client: RestClient,
    bucket: String,
}

impl RestBackend {
    pub fn new(client: RestClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    async fn get_rows<T: for<'de> Deserialize<'de>>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, RemoteError> {
        let resp = self
            .client
            .request(Method::GET, &format!("rest/v1/{}", table))
            .await?
            .query(query)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    async fn count_rows(&self, table: &str, column: &str, value: &str) -> Result<u64, RemoteError> {
        let resp = self
            .client
            .request(Method::HEAD, &format!("rest/v1/{}", table))
            .await?
            .query(&[("select", "*".to_string()), (column, eq(value))])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let resp = check(resp).await?;
        parse_content_range_total(resp.headers().get(CONTENT_RANGE))
    }

    /// Send a write and return the affected rows.
    async fn write_rows<T: for<'de> Deserialize<'de>>(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<Vec<T>, RemoteError> {
        let resp = self
            .client
            .request(method, &format!("rest/v1/{}", table))
            .await?
            .query(query)
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

#[async_trait]
impl PostRepository for RestBackend {
    async fn list_posts(&self, owner: Option<&str>) -> Result<Vec<PostRecord>, RemoteError> {
        let mut query = vec![
            ("select", POST_SELECT.to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(owner) = owner {
            query.push(("user_id", eq(owner)));
        }
        let rows: Vec<PostRow> = self.get_rows("posts", &query).await?;
        Ok(rows.into_iter().map(PostRow::into_record).collect())
    }

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, RemoteError> {
        let rows: Vec<PostRow> = self
            .get_rows(
                "posts",
                &[("select", POST_SELECT.to_string()), ("post_id", eq(post_id))],
            )
            .await?;
        Ok(rows.into_iter().next().map(|row| row.into_record().post))
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, RemoteError> {
        let rows: Vec<PostRow> = self
            .write_rows(
                Method::POST,
                "posts",
                &[("select", POST_SELECT.to_string())],
                &serde_json::to_value([post])?,
            )
            .await?;
        rows.into_iter()
            .next()
            .map(|row| row.into_record().post)
            .ok_or_else(|| RemoteError::Unavailable("insert returned no row".into()))
    }

    async fn delete_post(&self, post_id: &str) -> Result<bool, RemoteError> {
        let resp = self
            .client
            .request(Method::DELETE, "rest/v1/posts")
            .await?
            .query(&[("post_id", eq(post_id))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = check(resp).await?.json().await?;
        Ok(!rows.is_empty())
    }

    async fn save_feedback(
        &self,
        post_id: &str,
        feedback: &AiFeedback,
    ) -> Result<(), RemoteError> {
        let rows: Vec<serde_json::Value> = self
            .write_rows(
                Method::PATCH,
                "posts",
                &[("post_id", eq(post_id))],
                &json!({ "ai_feedback": feedback }),
            )
            .await?;
        if rows.is_empty() {
            return Err(RemoteError::NotFound(format!("post {}", post_id)));
        }
        Ok(())
    }

    async fn count_posts_by_user(&self, user_id: &str) -> Result<u64, RemoteError> {
        self.count_rows("posts", "user_id", user_id).await
    }

    async fn list_ratings(&self, post_id: &str) -> Result<Vec<u8>, RemoteError> {
        let rows: Vec<RatingRow> = self
            .get_rows(
                "reviews",
                &[("select", "rating".to_string()), ("post_id", eq(post_id))],
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| Rating::new(row.rating).map(Rating::value))
            .collect())
    }

    async fn list_occasions(&self) -> Result<Vec<Occasion>, RemoteError> {
        self.get_rows(
            "occasion",
            &[
                ("select", "id,name".to_string()),
                ("order", "name.asc".to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl ReviewRepository for RestBackend {
    async fn list_reviews(&self, post_id: &str) -> Result<Vec<Review>, RemoteError> {
        let rows: Vec<ReviewRow> = self
            .get_rows(
                "reviews",
                &[
                    ("select", REVIEW_SELECT.to_string()),
                    ("post_id", eq(post_id)),
                    ("order", "created_at.desc".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn find_review_by_author(
        &self,
        post_id: &str,
        user_id: &str,
    ) -> Result<Option<Review>, RemoteError> {
        let rows: Vec<ReviewRow> = self
            .get_rows(
                "reviews",
                &[
                    ("select", REVIEW_SELECT.to_string()),
                    ("post_id", eq(post_id)),
                    ("user_id", eq(user_id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next().map(Review::from))
    }

    async fn get_review(&self, review_id: &str) -> Result<Option<Review>, RemoteError> {
        let rows: Vec<ReviewRow> = self
            .get_rows(
                "reviews",
                &[("select", REVIEW_SELECT.to_string()), ("id", eq(review_id))],
            )
            .await?;
        Ok(rows.into_iter().next().map(Review::from))
    }

    async fn insert_review(&self, review: &NewReview) -> Result<Review, RemoteError> {
        let rows: Vec<ReviewRow> = self
            .write_rows(
                Method::POST,
                "reviews",
                &[("select", REVIEW_SELECT.to_string())],
                &serde_json::to_value([review])?,
            )
            .await?;
        rows.into_iter()
            .next()
            .map(Review::from)
            .ok_or_else(|| RemoteError::Unavailable("insert returned no row".into()))
    }

    async fn delete_review(&self, review_id: &str) -> Result<bool, RemoteError> {
        let resp = self
            .client
            .request(Method::DELETE, "rest/v1/reviews")
            .await?
            .query(&[("id", eq(review_id))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = check(resp).await?.json().await?;
        Ok(!rows.is_empty())
    }

    async fn count_reviews_by_user(&self, user_id: &str) -> Result<u64, RemoteError> {
        self.count_rows("reviews", "user_id", user_id).await
    }
}

#[async_trait]
impl ProfileRepository for RestBackend {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, RemoteError> {
        let rows: Vec<Profile> = self
            .get_rows(
                "profiles",
                &[("select", PROFILE_SELECT.to_string()), ("id", eq(user_id))],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, RemoteError> {
        let rows: Vec<Profile> = self
            .write_rows(
                Method::PATCH,
                "profiles",
                &[("select", PROFILE_SELECT.to_string()), ("id", eq(user_id))],
                &serde_json::to_value(update)?,
            )
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| RemoteError::NotFound(format!("profile {}", user_id)))
    }

    async fn save_push_token(&self, user_id: &str, token: &str) -> Result<(), RemoteError> {
        let rows: Vec<serde_json::Value> = self
            .write_rows(
                Method::PATCH,
                "profiles",
                &[("id", eq(user_id))],
                &json!({ "fcm_token": token }),
            )
            .await?;
        if rows.is_empty() {
            return Err(RemoteError::NotFound(format!("profile {}", user_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for RestBackend {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), RemoteError> {
        let resp = self
            .client
            .request(
                Method::POST,
                &format!("storage/v1/object/{}/{}", self.bucket, path),
            )
            .await?
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    fn public_url(&self, path: &str) -> Result<String, RemoteError> {
        self.client
            .endpoint(&format!("storage/v1/object/public/{}/{}", self.bucket, path))
            .map(String::from)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Deserialize, Default)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let meta = self.user.user_metadata;
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
            user: CurrentUser {
                id: self.user.id,
                email: self.user.email,
                full_name: meta.full_name.or(meta.name),
                avatar_url: meta.avatar_url.or(meta.picture),
            },
        }
    }
}

#[derive(Serialize)]
struct IdTokenGrant<'a> {
    provider: &'a str,
    id_token: &'a str,
}

/// Hosted identity provider. The session is cached as JSON in
/// `session_file` and refreshed with its refresh token once expired.
pub struct RestAuth {
    client: RestClient,
    session_file: PathBuf,
    events: broadcast::Sender<AuthEvent>,
}

impl RestAuth {
    pub fn new(client: RestClient, session_file: PathBuf) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            client,
            session_file,
            events,
        }
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, RemoteError> {
        let resp = self
            .client
            .request(Method::POST, "auth/v1/token")
            .await?
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;
        let token: TokenResponse = check(resp).await?.json().await?;
        Ok(token.into_session())
    }

    async fn store(&self, session: Option<&Session>) -> Result<(), RemoteError> {
        self.client.set_session(session.cloned()).await;
        match session {
            Some(session) => {
                if let Some(parent) = self.session_file.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&self.session_file, serde_json::to_vec(session)?).await?;
            }
            None => match tokio::fs::remove_file(&self.session_file).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    async fn load_cached(&self) -> Result<Option<Session>, RemoteError> {
        if let Some(session) = self.client.session.read().await.clone() {
            return Ok(Some(session));
        }
        match tokio::fs::read(&self.session_file).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn publish(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthProvider for RestAuth {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        let Some(session) = self.load_cached().await? else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            self.client.set_session(Some(session.clone())).await;
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            self.store(None).await?;
            return Ok(None);
        };
        let refreshed = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        self.store(Some(&refreshed)).await?;
        tracing::info!("Refreshed session for {}", refreshed.user.id);
        self.publish(AuthEvent::TokenRefreshed(refreshed.clone()));
        Ok(Some(refreshed))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_id_token(
        &self,
        provider: IdentityProvider,
        token: &str,
    ) -> Result<Session, RemoteError> {
        let session = self
            .token_grant(
                "id_token",
                serde_json::to_value(IdTokenGrant {
                    provider: provider.as_str(),
                    id_token: token,
                })?,
            )
            .await?;
        self.store(Some(&session)).await?;
        tracing::info!("Signed in {} via {}", session.user.id, provider.as_str());
        self.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        if self.client.session.read().await.is_some() {
            let resp = self
                .client
                .request(Method::POST, "auth/v1/logout")
                .await?
                .send()
                .await?;
            check(resp).await?;
        }
        self.store(None).await?;
        tracing::info!("Signed out");
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }
}
