//! AI style feedback for a post, cached on the post row.

use std::sync::Arc;

use crate::backend::{FeedbackFunction, PostRepository};
use crate::db::models::{AiFeedback, Post};
use crate::error::{AppError, AppResult};

pub struct FeedbackService {
    posts: Arc<dyn PostRepository>,
    function: Arc<dyn FeedbackFunction>,
}

impl FeedbackService {
    pub fn new(posts: Arc<dyn PostRepository>, function: Arc<dyn FeedbackFunction>) -> Self {
        Self { posts, function }
    }

    /// Cached feedback if the post has any, otherwise a fresh request.
    pub async fn cached_or_request(&self, post_id: &str) -> AppResult<AiFeedback> {
        let post = self.load_post(post_id).await?;
        if let Some(feedback) = post.ai_feedback {
            return Ok(feedback);
        }
        self.request_for(&post).await
    }

    /// Ask the hosted function for feedback on the post's images and cache
    /// the answer on the post.
    pub async fn request_feedback(&self, post_id: &str) -> AppResult<AiFeedback> {
        let post = self.load_post(post_id).await?;
        self.request_for(&post).await
    }

    async fn load_post(&self, post_id: &str) -> AppResult<Post> {
        self.posts
            .get_post(post_id)
            .await
            .map_err(AppError::from_remote)?
            .ok_or(AppError::NotFound)
    }

    async fn request_for(&self, post: &Post) -> AppResult<AiFeedback> {
        if post.image_url.is_empty() {
            return Err(AppError::BadRequest(
                "feedback needs at least one image".into(),
            ));
        }

        let feedback = self.function.request_feedback(post.image_url.urls()).await?;

        // The answer is still returned when it cannot be cached.
        if let Err(e) = self.posts.save_feedback(&post.post_id, &feedback).await {
            tracing::warn!("Could not cache feedback on post {}: {}", post.post_id, e);
        }
        Ok(feedback)
    }
}
