//! Post feed: listing with author and review statistics, plus post
//! creation and deletion.

use futures::future::join_all;
use std::sync::Arc;

use crate::auth::SessionContext;
use crate::backend::PostRepository;
use crate::config::{ImagesConfig, PostsConfig};
use crate::db::models::{Author, ImageList, NewPost, Occasion, Post, PostRecord};
use crate::error::{AppError, AppResult};
use crate::stats::ReviewStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedFilter {
    #[default]
    All,
    /// Only the signed-in user's posts.
    Mine,
}

/// One entry of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct PostView {
    pub post: Post,
    pub author: Author,
    pub reviews: ReviewStats,
    pub is_mine: bool,
}

/// Result of loading the feed. A failed load has no posts and carries the
/// (retryable) error instead.
#[derive(Debug)]
pub struct FeedSnapshot {
    pub posts: Vec<PostView>,
    pub error: Option<AppError>,
}

/// Size limits for new posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostLimits {
    pub title_max_chars: usize,
    pub content_max_chars: usize,
    pub max_images: usize,
}

impl PostLimits {
    pub fn from_config(posts: &PostsConfig, images: &ImagesConfig) -> Self {
        Self {
            title_max_chars: posts.title_max_chars,
            content_max_chars: posts.content_max_chars,
            max_images: images.max_per_post,
        }
    }
}

impl Default for PostLimits {
    fn default() -> Self {
        Self::from_config(&PostsConfig::default(), &ImagesConfig::default())
    }
}

/// What the user filled in on the new-post screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostDraft {
    pub title: Option<String>,
    pub content: Option<String>,
    pub images: ImageList,
    pub occasion: Option<i64>,
}

fn normalize_text(
    value: Option<String>,
    field: &str,
    max_chars: usize,
) -> AppResult<Option<String>> {
    let Some(text) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > max_chars {
        return Err(AppError::BadRequest(format!(
            "{} must be {} characters or less",
            field, max_chars
        )));
    }
    Ok(Some(text))
}

impl PostDraft {
    /// Check limits and produce the row to insert for `user_id`.
    pub fn validate(self, user_id: &str, limits: &PostLimits) -> AppResult<NewPost> {
        if self.images.len() > limits.max_images {
            return Err(AppError::ImageLimitExceeded {
                max: limits.max_images,
            });
        }
        Ok(NewPost {
            user_id: user_id.to_string(),
            title: normalize_text(self.title, "Title", limits.title_max_chars)?,
            content: normalize_text(self.content, "Content", limits.content_max_chars)?,
            image_url: self.images,
            occasion: self.occasion,
        })
    }
}

pub struct PostFeed {
    posts: Arc<dyn PostRepository>,
    session: SessionContext,
    limits: PostLimits,
}

impl PostFeed {
    pub fn new(posts: Arc<dyn PostRepository>, session: SessionContext, limits: PostLimits) -> Self {
        Self {
            posts,
            session,
            limits,
        }
    }

    pub fn limits(&self) -> &PostLimits {
        &self.limits
    }

    /// Load the feed, newest first. Never fails outright: a top-level fetch
    /// error yields an empty snapshot with the error attached, and a failed
    /// statistics fetch only zeroes that post's numbers.
    pub async fn load(&self, filter: FeedFilter) -> FeedSnapshot {
        match self.try_load(filter).await {
            Ok(posts) => FeedSnapshot { posts, error: None },
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!("Failed to load feed: {}", e);
                }
                FeedSnapshot {
                    posts: Vec::new(),
                    error: Some(e),
                }
            }
        }
    }

    async fn try_load(&self, filter: FeedFilter) -> AppResult<Vec<PostView>> {
        let viewer = self.session.current_user();
        let owner = match filter {
            FeedFilter::All => None,
            FeedFilter::Mine => Some(viewer.as_ref().ok_or(AppError::Unauthenticated)?.id.clone()),
        };

        let records = self.posts.list_posts(owner.as_deref()).await?;
        let viewer_id = viewer.map(|u| u.id);

        let views = join_all(
            records
                .into_iter()
                .map(|record| self.assemble(record, viewer_id.as_deref())),
        )
        .await;
        Ok(views)
    }

    async fn assemble(&self, record: PostRecord, viewer_id: Option<&str>) -> PostView {
        let reviews = match self.posts.list_ratings(&record.post.post_id).await {
            Ok(ratings) => ReviewStats::from_ratings(ratings),
            Err(e) => {
                tracing::warn!(
                    "Review stats unavailable for post {}: {}",
                    record.post.post_id,
                    e
                );
                ReviewStats::default()
            }
        };
        let is_mine = viewer_id == Some(record.post.user_id.as_str());
        PostView {
            post: record.post,
            author: record.author,
            reviews,
            is_mine,
        }
    }

    /// Create a post owned by the signed-in user.
    pub async fn create_post(&self, draft: PostDraft) -> AppResult<Post> {
        let user = self.session.require_user()?;
        let new_post = draft.validate(&user.id, &self.limits)?;
        let post = self.posts.insert_post(&new_post).await?;
        tracing::info!(
            "Created post {} with {} image(s)",
            post.post_id,
            post.image_url.len()
        );
        Ok(post)
    }

    /// Delete one of the signed-in user's posts.
    pub async fn delete_post(&self, post_id: &str) -> AppResult<()> {
        let user = self.session.require_user()?;
        let post = self
            .posts
            .get_post(post_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if post.user_id != user.id {
            return Err(AppError::PermissionDenied(
                "only the author can delete a post".into(),
            ));
        }

        if !self.posts.delete_post(post_id).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!("Deleted post {}", post_id);
        Ok(())
    }

    pub async fn occasions(&self) -> AppResult<Vec<Occasion>> {
        Ok(self.posts.list_occasions().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalBackend;
    use crate::backend::{RemoteError, ReviewRepository};
    use crate::db::models::{AiFeedback, NewReview, Rating};
    use crate::test_helpers::{backend_with_profiles, seed_post, signed_in, signed_out};
    use async_trait::async_trait;

    /// Delegates to a local backend but fails chosen calls.
    struct Flaky {
        inner: Arc<LocalBackend>,
        broken_ratings_for: Option<String>,
        list_fails: bool,
    }

    #[async_trait]
    impl PostRepository for Flaky {
        async fn list_posts(&self, owner: Option<&str>) -> Result<Vec<PostRecord>, RemoteError> {
            if self.list_fails {
                return Err(RemoteError::Unavailable("offline".into()));
            }
            self.inner.list_posts(owner).await
        }
        async fn get_post(&self, post_id: &str) -> Result<Option<Post>, RemoteError> {
            self.inner.get_post(post_id).await
        }
        async fn insert_post(&self, post: &NewPost) -> Result<Post, RemoteError> {
            self.inner.insert_post(post).await
        }
        async fn delete_post(&self, post_id: &str) -> Result<bool, RemoteError> {
            self.inner.delete_post(post_id).await
        }
        async fn save_feedback(&self, id: &str, fb: &AiFeedback) -> Result<(), RemoteError> {
            self.inner.save_feedback(id, fb).await
        }
        async fn count_posts_by_user(&self, user_id: &str) -> Result<u64, RemoteError> {
            self.inner.count_posts_by_user(user_id).await
        }
        async fn list_ratings(&self, post_id: &str) -> Result<Vec<u8>, RemoteError> {
            if self.broken_ratings_for.as_deref() == Some(post_id) {
                return Err(RemoteError::Unavailable("timeout".into()));
            }
            self.inner.list_ratings(post_id).await
        }
        async fn list_occasions(&self) -> Result<Vec<Occasion>, RemoteError> {
            self.inner.list_occasions().await
        }
    }

    async fn review(backend: &LocalBackend, post_id: &str, user_id: &str, rating: i64) {
        backend
            .insert_review(&NewReview {
                post_id: post_id.to_string(),
                user_id: user_id.to_string(),
                rating: Rating::new(rating).unwrap(),
                review: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn feed_aggregates_review_stats() {
        let backend = backend_with_profiles(&[("ada", "Ada"), ("bo", "Bo"), ("cy", "Cy")]);
        let reviewed = seed_post(&backend, "ada", "reviewed").await;
        let quiet = seed_post(&backend, "ada", "quiet").await;
        review(&backend, &reviewed.post_id, "bo", 5).await;
        review(&backend, &reviewed.post_id, "cy", 4).await;

        let feed = PostFeed::new(backend.clone(), signed_in("bo"), PostLimits::default());
        let snapshot = feed.load(FeedFilter::All).await;
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.posts.len(), 2);

        assert_eq!(snapshot.posts[0].post.post_id, quiet.post_id);
        assert_eq!(snapshot.posts[0].reviews, ReviewStats::default());
        assert_eq!(snapshot.posts[1].reviews.count, 2);
        assert_eq!(snapshot.posts[1].reviews.average, 4.5);
        assert_eq!(snapshot.posts[1].author.full_name, "Ada");
        assert!(!snapshot.posts[1].is_mine);
    }

    #[tokio::test]
    async fn mine_filter_keeps_only_own_posts_with_author_join() {
        let backend = backend_with_profiles(&[("ada", "Ada"), ("bo", "Bo")]);
        seed_post(&backend, "ada", "a1").await;
        let own = seed_post(&backend, "bo", "b1").await;

        let feed = PostFeed::new(backend, signed_in("bo"), PostLimits::default());
        let snapshot = feed.load(FeedFilter::Mine).await;
        assert_eq!(snapshot.posts.len(), 1);
        assert_eq!(snapshot.posts[0].post.post_id, own.post_id);
        assert_eq!(snapshot.posts[0].author.full_name, "Bo");
        assert!(snapshot.posts[0].is_mine);
    }

    #[tokio::test]
    async fn mine_filter_needs_a_user() {
        let backend = backend_with_profiles(&[("ada", "Ada")]);
        let feed = PostFeed::new(backend, signed_out(), PostLimits::default());
        let snapshot = feed.load(FeedFilter::Mine).await;
        assert!(snapshot.posts.is_empty());
        assert!(matches!(snapshot.error, Some(AppError::Unauthenticated)));
    }

    #[tokio::test]
    async fn one_failing_stats_fetch_does_not_sink_the_feed() {
        let backend = backend_with_profiles(&[("ada", "Ada"), ("bo", "Bo")]);
        let broken = seed_post(&backend, "ada", "broken").await;
        let fine = seed_post(&backend, "ada", "fine").await;
        review(&backend, &broken.post_id, "bo", 5).await;
        review(&backend, &fine.post_id, "bo", 3).await;

        let flaky = Arc::new(Flaky {
            inner: backend,
            broken_ratings_for: Some(broken.post_id.clone()),
            list_fails: false,
        });
        let feed = PostFeed::new(flaky, signed_out(), PostLimits::default());
        let snapshot = feed.load(FeedFilter::All).await;

        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.posts.len(), 2);
        let by_id = |id: &str| {
            snapshot
                .posts
                .iter()
                .find(|p| p.post.post_id == id)
                .unwrap()
                .reviews
        };
        assert_eq!(by_id(&broken.post_id), ReviewStats::default());
        assert_eq!(by_id(&fine.post_id).average, 3.0);
    }

    #[tokio::test]
    async fn top_level_failure_yields_empty_retryable_snapshot() {
        let backend = backend_with_profiles(&[("ada", "Ada")]);
        seed_post(&backend, "ada", "a").await;
        let flaky = Arc::new(Flaky {
            inner: backend,
            broken_ratings_for: None,
            list_fails: true,
        });
        let feed = PostFeed::new(flaky, signed_out(), PostLimits::default());
        let snapshot = feed.load(FeedFilter::All).await;
        assert!(snapshot.posts.is_empty());
        assert!(snapshot.error.unwrap().is_retryable());
    }

    #[tokio::test]
    async fn create_post_validates_before_writing() {
        let backend = backend_with_profiles(&[("ada", "Ada")]);
        let feed = PostFeed::new(backend.clone(), signed_in("ada"), PostLimits::default());

        let too_many = PostDraft {
            images: ImageList::new(vec!["a".into(), "b".into(), "c".into(), "d".into()]),
            ..Default::default()
        };
        assert!(matches!(
            feed.create_post(too_many).await,
            Err(AppError::ImageLimitExceeded { max: 3 })
        ));

        let long_title = PostDraft {
            title: Some("x".repeat(41)),
            ..Default::default()
        };
        assert!(matches!(
            feed.create_post(long_title).await,
            Err(AppError::BadRequest(_))
        ));

        assert_eq!(backend.count_posts_by_user("ada").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_post_trims_and_stores() {
        let backend = backend_with_profiles(&[("ada", "Ada")]);
        let feed = PostFeed::new(backend.clone(), signed_in("ada"), PostLimits::default());

        let post = feed
            .create_post(PostDraft {
                title: Some("  Friday fit  ".into()),
                content: Some("   ".into()),
                images: ImageList::new(vec!["https://img/1.jpg".into()]),
                occasion: None,
            })
            .await
            .unwrap();
        assert_eq!(post.user_id, "ada");
        assert_eq!(post.title.as_deref(), Some("Friday fit"));
        assert_eq!(post.content, None);
        assert_eq!(backend.count_posts_by_user("ada").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn create_post_requires_sign_in() {
        let backend = backend_with_profiles(&[]);
        let feed = PostFeed::new(backend, signed_out(), PostLimits::default());
        assert!(matches!(
            feed.create_post(PostDraft::default()).await,
            Err(AppError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn only_the_author_deletes_a_post() {
        let backend = backend_with_profiles(&[("ada", "Ada"), ("bo", "Bo")]);
        let post = seed_post(&backend, "ada", "a").await;

        let as_bo = PostFeed::new(backend.clone(), signed_in("bo"), PostLimits::default());
        assert!(matches!(
            as_bo.delete_post(&post.post_id).await,
            Err(AppError::PermissionDenied(_))
        ));

        let as_ada = PostFeed::new(backend.clone(), signed_in("ada"), PostLimits::default());
        as_ada.delete_post(&post.post_id).await.unwrap();
        assert!(matches!(
            as_ada.delete_post(&post.post_id).await,
            Err(AppError::NotFound)
        ));
    }
}
