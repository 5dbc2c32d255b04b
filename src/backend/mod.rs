//! Boundary to the hosted services the app talks to.
//!
//! Every side effect goes through one of the traits below, so the
//! aggregation and validation logic never knows which backend it runs on.
//! Two implementations ship with the crate: [`local`] (SQLite plus a
//! directory of uploads) and [`rest`] (a hosted backend over HTTP).

pub mod functions;
pub mod local;
pub mod rest;
pub mod storage;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::auth::session::{AuthEvent, IdentityProvider, Session};
use crate::db::models::{
    AiFeedback, NewPost, NewReview, Occasion, Post, PostRecord, Profile, ProfileUpdate, Review,
};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid ID token: {0}")]
    InvalidToken(String),
}

/// Identity provider: session restore, change notifications, sign-in/out.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Restore the previously authenticated session, if any.
    async fn get_session(&self) -> Result<Option<Session>, RemoteError>;

    /// Subscribe to sign-in, sign-out and token refresh events.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_in_with_id_token(
        &self,
        provider: IdentityProvider,
        token: &str,
    ) -> Result<Session, RemoteError>;

    async fn sign_out(&self) -> Result<(), RemoteError>;
}

/// `posts` and `occasion` tables.
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Posts joined with their author, newest first. `owner` narrows the
    /// result to one user's posts.
    async fn list_posts(&self, owner: Option<&str>) -> Result<Vec<PostRecord>, RemoteError>;

    async fn get_post(&self, post_id: &str) -> Result<Option<Post>, RemoteError>;

    /// Insert and return the stored row.
    async fn insert_post(&self, post: &NewPost) -> Result<Post, RemoteError>;

    /// Returns false when no row matched.
    async fn delete_post(&self, post_id: &str) -> Result<bool, RemoteError>;

    async fn save_feedback(&self, post_id: &str, feedback: &AiFeedback)
        -> Result<(), RemoteError>;

    async fn count_posts_by_user(&self, user_id: &str) -> Result<u64, RemoteError>;

    /// Ratings of every review on a post.
    async fn list_ratings(&self, post_id: &str) -> Result<Vec<u8>, RemoteError>;

    /// Occasion lookup table ordered by name.
    async fn list_occasions(&self) -> Result<Vec<Occasion>, RemoteError>;
}

/// `reviews` table.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Reviews on a post joined with their author, newest first.
    async fn list_reviews(&self, post_id: &str) -> Result<Vec<Review>, RemoteError>;

    async fn find_review_by_author(
        &self,
        post_id: &str,
        user_id: &str,
    ) -> Result<Option<Review>, RemoteError>;

    async fn get_review(&self, review_id: &str) -> Result<Option<Review>, RemoteError>;

    /// Insert and return the stored row with its author join.
    async fn insert_review(&self, review: &NewReview) -> Result<Review, RemoteError>;

    /// Returns false when no row matched.
    async fn delete_review(&self, review_id: &str) -> Result<bool, RemoteError>;

    async fn count_reviews_by_user(&self, user_id: &str) -> Result<u64, RemoteError>;
}

/// `profiles` table.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>, RemoteError>;

    async fn update_profile(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, RemoteError>;

    async fn save_push_token(&self, user_id: &str, token: &str) -> Result<(), RemoteError>;
}

/// Object storage bucket holding post images.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str)
        -> Result<(), RemoteError>;

    fn public_url(&self, path: &str) -> Result<String, RemoteError>;
}

/// The hosted `ai-feedback` function.
#[async_trait]
pub trait FeedbackFunction: Send + Sync {
    async fn request_feedback(&self, image_urls: &[String]) -> Result<AiFeedback, RemoteError>;
}
