//! Review ledger: per-post star ratings with optional text.
//!
//! Rules enforced here regardless of what the UI allows:
//! - nobody reviews their own post;
//! - one review per user per post, checked against a fresh read;
//! - a review is deleted only by its author or by the post's owner.

use std::sync::Arc;

use crate::auth::SessionContext;
use crate::backend::{RemoteError, ReviewRepository};
use crate::db::models::{NewReview, Rating, Review};
use crate::error::{AppError, AppResult};
use crate::stats::ReviewStats;

/// Reviews on one post, newest first, with their running statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewList {
    pub reviews: Vec<Review>,
    pub stats: ReviewStats,
}

impl ReviewList {
    pub fn new(reviews: Vec<Review>) -> Self {
        let stats = ReviewStats::from_ratings(reviews.iter().map(|r| r.rating.value()));
        Self { reviews, stats }
    }

    /// Merge a confirmed insert.
    fn push_confirmed(&mut self, review: Review) {
        self.reviews.retain(|r| r.id != review.id);
        self.reviews.insert(0, review);
        self.recompute();
    }

    /// Drop a confirmed delete.
    fn remove_confirmed(&mut self, review_id: &str) {
        self.reviews.retain(|r| r.id != review_id);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.stats = ReviewStats::from_ratings(self.reviews.iter().map(|r| r.rating.value()));
    }
}

fn ledger_error(err: RemoteError) -> AppError {
    match err {
        RemoteError::NotFound(_) => AppError::NotFound,
        // The unique (post, user) constraint fired: someone got there first.
        RemoteError::Conflict(_) => AppError::AlreadyReviewed,
        other => AppError::LedgerUnavailable(other),
    }
}

pub struct ReviewLedger {
    reviews: Arc<dyn ReviewRepository>,
}

impl ReviewLedger {
    pub fn new(reviews: Arc<dyn ReviewRepository>) -> Self {
        Self { reviews }
    }

    pub async fn list_reviews(&self, post_id: &str) -> AppResult<ReviewList> {
        let reviews = self
            .reviews
            .list_reviews(post_id)
            .await
            .map_err(AppError::from_remote)?;
        Ok(ReviewList::new(reviews))
    }

    /// Add a review by `user_id` to a post owned by `post_owner_id`.
    pub async fn add_review(
        &self,
        post_id: &str,
        user_id: &str,
        post_owner_id: &str,
        rating: i64,
        body: Option<String>,
    ) -> AppResult<Review> {
        if user_id == post_owner_id {
            return Err(AppError::SelfReview);
        }
        let rating = Rating::new(rating).ok_or(AppError::InvalidRating(rating))?;

        let existing = self
            .reviews
            .find_review_by_author(post_id, user_id)
            .await
            .map_err(ledger_error)?;
        if existing.is_some() {
            return Err(AppError::AlreadyReviewed);
        }

        let new_review = NewReview {
            post_id: post_id.to_string(),
            user_id: user_id.to_string(),
            rating,
            review: body.map(|b| b.trim().to_string()).filter(|b| !b.is_empty()),
        };
        let review = self
            .reviews
            .insert_review(&new_review)
            .await
            .map_err(ledger_error)?;
        tracing::info!(
            "Review {} ({} stars) added to post {}",
            review.id,
            rating.value(),
            post_id
        );
        Ok(review)
    }

    /// Delete a review on `post_id`. Allowed for its author and for the
    /// owner of that post.
    pub async fn delete_review(
        &self,
        review_id: &str,
        post_id: &str,
        requester_id: &str,
        post_owner_id: &str,
    ) -> AppResult<()> {
        let review = self
            .reviews
            .get_review(review_id)
            .await
            .map_err(ledger_error)?
            .ok_or(AppError::NotFound)?;

        // Ownership of `post_id` says nothing about reviews on other posts.
        if review.post_id != post_id {
            return Err(AppError::NotFound);
        }

        if review.user_id != requester_id && post_owner_id != requester_id {
            return Err(AppError::PermissionDenied(
                "only the reviewer or the post owner can delete a review".into(),
            ));
        }

        if !self
            .reviews
            .delete_review(review_id)
            .await
            .map_err(ledger_error)?
        {
            return Err(AppError::NotFound);
        }
        tracing::info!("Review {} deleted by {}", review_id, requester_id);
        Ok(())
    }
}

/// The review section of one post as seen by the signed-in user.
///
/// Mutations are applied to the local list only after the backend confirms
/// them; a failed call leaves the list and its average untouched.
pub struct ReviewThread {
    ledger: Arc<ReviewLedger>,
    session: SessionContext,
    post_id: String,
    post_owner_id: String,
    current: ReviewList,
}

impl ReviewThread {
    pub async fn open(
        ledger: Arc<ReviewLedger>,
        session: SessionContext,
        post_id: impl Into<String>,
        post_owner_id: impl Into<String>,
    ) -> AppResult<Self> {
        let post_id = post_id.into();
        let current = ledger.list_reviews(&post_id).await?;
        Ok(Self {
            ledger,
            session,
            post_id,
            post_owner_id: post_owner_id.into(),
            current,
        })
    }

    pub fn reviews(&self) -> &[Review] {
        &self.current.reviews
    }

    pub fn stats(&self) -> ReviewStats {
        self.current.stats
    }

    /// Whether the signed-in user may still leave a review, judged on the
    /// last loaded list.
    pub fn can_review(&self) -> bool {
        match self.session.current_user() {
            Some(user) => {
                user.id != self.post_owner_id
                    && !self.current.reviews.iter().any(|r| r.user_id == user.id)
            }
            None => false,
        }
    }

    pub fn can_delete(&self, review: &Review) -> bool {
        self.session
            .current_user()
            .is_some_and(|u| u.id == review.user_id || u.id == self.post_owner_id)
    }

    pub async fn refresh(&mut self) -> AppResult<()> {
        self.current = self.ledger.list_reviews(&self.post_id).await?;
        Ok(())
    }

    pub async fn submit(&mut self, rating: i64, body: Option<String>) -> AppResult<&Review> {
        let user = self.session.require_user()?;
        let review = self
            .ledger
            .add_review(&self.post_id, &user.id, &self.post_owner_id, rating, body)
            .await?;
        self.current.push_confirmed(review);
        Ok(&self.current.reviews[0])
    }

    pub async fn remove(&mut self, review_id: &str) -> AppResult<()> {
        let user = self.session.require_user()?;
        self.ledger
            .delete_review(review_id, &self.post_id, &user.id, &self.post_owner_id)
            .await?;
        self.current.remove_confirmed(review_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalBackend;
    use crate::db::models::Post;
    use crate::test_helpers::{backend_with_profiles, seed_post, signed_in};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    async fn setup() -> (Arc<LocalBackend>, ReviewLedger, Post) {
        let backend = backend_with_profiles(&[
            ("owner", "Olive"),
            ("ada", "Ada"),
            ("bo", "Bo"),
            ("cy", "Cy"),
        ]);
        let post = seed_post(&backend, "owner", "look").await;
        let ledger = ReviewLedger::new(backend.clone());
        (backend, ledger, post)
    }

    #[tokio::test]
    async fn self_review_is_rejected() {
        let (_backend, ledger, post) = setup().await;
        for rating in 1..=5 {
            let err = ledger
                .add_review(&post.post_id, "owner", "owner", rating, Some("me".into()))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::SelfReview));
        }
        assert!(ledger.list_reviews(&post.post_id).await.unwrap().reviews.is_empty());
    }

    #[tokio::test]
    async fn rating_must_be_in_range() {
        let (_backend, ledger, post) = setup().await;
        for rating in [0, 6, -1] {
            let err = ledger
                .add_review(&post.post_id, "ada", "owner", rating, None)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidRating(r) if r == rating));
        }
    }

    #[tokio::test]
    async fn second_review_by_same_user_is_rejected() {
        let (backend, ledger, post) = setup().await;
        ledger
            .add_review(&post.post_id, "ada", "owner", 4, Some("nice".into()))
            .await
            .unwrap();
        let before = ledger.list_reviews(&post.post_id).await.unwrap();

        let err = ledger
            .add_review(&post.post_id, "ada", "owner", 1, Some("changed my mind".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AlreadyReviewed));

        let after = ledger.list_reviews(&post.post_id).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(backend.count_reviews_by_user("ada").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn average_follows_inserts_and_deletes() {
        let (_backend, ledger, post) = setup().await;
        ledger.add_review(&post.post_id, "ada", "owner", 5, None).await.unwrap();
        ledger.add_review(&post.post_id, "bo", "owner", 4, None).await.unwrap();
        let three = ledger
            .add_review(&post.post_id, "cy", "owner", 3, None)
            .await
            .unwrap();

        let list = ledger.list_reviews(&post.post_id).await.unwrap();
        assert_eq!(list.stats.count, 3);
        assert_eq!(list.stats.average, 4.0);
        assert_eq!(list.reviews[0].id, three.id);
        assert_eq!(list.reviews[0].author.full_name, "Cy");

        ledger.delete_review(&three.id, &post.post_id, "cy", "owner").await.unwrap();
        let list = ledger.list_reviews(&post.post_id).await.unwrap();
        assert_eq!(list.stats.average, 4.5);
    }

    #[tokio::test]
    async fn add_then_delete_restores_the_average() {
        let (_backend, ledger, post) = setup().await;
        ledger.add_review(&post.post_id, "ada", "owner", 5, None).await.unwrap();
        ledger.add_review(&post.post_id, "bo", "owner", 2, None).await.unwrap();
        let before = ledger.list_reviews(&post.post_id).await.unwrap().stats;

        let added = ledger
            .add_review(&post.post_id, "cy", "owner", 4, None)
            .await
            .unwrap();
        ledger.delete_review(&added.id, &post.post_id, "cy", "owner").await.unwrap();

        assert_eq!(ledger.list_reviews(&post.post_id).await.unwrap().stats, before);
    }

    #[tokio::test]
    async fn delete_permissions() {
        let (_backend, ledger, post) = setup().await;
        let by_ada = ledger
            .add_review(&post.post_id, "ada", "owner", 5, None)
            .await
            .unwrap();
        let by_bo = ledger
            .add_review(&post.post_id, "bo", "owner", 3, None)
            .await
            .unwrap();

        let err = ledger
            .delete_review(&by_ada.id, &post.post_id, "cy", "owner")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));

        // Author and post owner may both delete.
        ledger
            .delete_review(&by_ada.id, &post.post_id, "ada", "owner")
            .await
            .unwrap();
        ledger
            .delete_review(&by_bo.id, &post.post_id, "owner", "owner")
            .await
            .unwrap();

        let err = ledger
            .delete_review(&by_bo.id, &post.post_id, "owner", "owner")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn owning_one_post_does_not_allow_deleting_reviews_on_another() {
        let (backend, ledger, post) = setup().await;
        let ledger = Arc::new(ledger);
        let other = seed_post(&backend, "ada", "other").await;
        let on_owner_post = ledger
            .add_review(&post.post_id, "bo", "owner", 5, None)
            .await
            .unwrap();

        // Ada owns `other` but not `post`.
        let err = ledger
            .delete_review(&on_owner_post.id, &other.post_id, "ada", "ada")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound));

        let mut thread = ReviewThread::open(
            ledger.clone(),
            signed_in("ada"),
            other.post_id.clone(),
            "ada",
        )
        .await
        .unwrap();
        let err = thread.remove(&on_owner_post.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));

        let left = ledger.list_reviews(&post.post_id).await.unwrap();
        assert_eq!(left.stats.count, 1);
        assert_eq!(left.reviews[0].id, on_owner_post.id);
    }

    #[tokio::test]
    async fn blank_body_is_stored_as_none() {
        let (_backend, ledger, post) = setup().await;
        let review = ledger
            .add_review(&post.post_id, "ada", "owner", 5, Some("   ".into()))
            .await
            .unwrap();
        assert_eq!(review.review, None);
    }

    #[tokio::test]
    async fn duplicate_check_uses_a_fresh_read() {
        let (_backend, ledger, post) = setup().await;
        let ledger = Arc::new(ledger);
        let mut thread = ReviewThread::open(
            ledger.clone(),
            signed_in("ada"),
            post.post_id.clone(),
            "owner",
        )
        .await
        .unwrap();

        // Submitted elsewhere after the thread loaded its list.
        ledger
            .add_review(&post.post_id, "ada", "owner", 2, None)
            .await
            .unwrap();
        assert!(thread.can_review());

        let err = thread.submit(5, None).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyReviewed));
        assert!(thread.reviews().is_empty());
    }

    #[tokio::test]
    async fn thread_applies_confirmed_writes() {
        let (_backend, ledger, post) = setup().await;
        let ledger = Arc::new(ledger);
        ledger.add_review(&post.post_id, "bo", "owner", 3, None).await.unwrap();

        let mut thread = ReviewThread::open(
            ledger.clone(),
            signed_in("ada"),
            post.post_id.clone(),
            "owner",
        )
        .await
        .unwrap();
        assert_eq!(thread.stats().average, 3.0);

        let id = thread.submit(4, Some("sharp".into())).await.unwrap().id.clone();
        assert_eq!(thread.stats().count, 2);
        assert_eq!(thread.stats().average, 3.5);
        assert_eq!(thread.reviews()[0].id, id);
        assert!(!thread.can_review());
        assert!(thread.can_delete(&thread.reviews()[0].clone()));
        assert!(!thread.can_delete(&thread.reviews()[1].clone()));

        thread.remove(&id).await.unwrap();
        assert_eq!(thread.stats().average, 3.0);
        assert!(thread.can_review());
    }

    /// Reads succeed, writes fail.
    struct ReadOnly {
        inner: Arc<LocalBackend>,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl ReviewRepository for ReadOnly {
        async fn list_reviews(&self, post_id: &str) -> Result<Vec<Review>, RemoteError> {
            self.inner.list_reviews(post_id).await
        }
        async fn find_review_by_author(
            &self,
            post_id: &str,
            user_id: &str,
        ) -> Result<Option<Review>, RemoteError> {
            self.inner.find_review_by_author(post_id, user_id).await
        }
        async fn get_review(&self, review_id: &str) -> Result<Option<Review>, RemoteError> {
            self.inner.get_review(review_id).await
        }
        async fn insert_review(&self, review: &NewReview) -> Result<Review, RemoteError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RemoteError::Unavailable("store down".into()));
            }
            self.inner.insert_review(review).await
        }
        async fn delete_review(&self, review_id: &str) -> Result<bool, RemoteError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RemoteError::Unavailable("store down".into()));
            }
            self.inner.delete_review(review_id).await
        }
        async fn count_reviews_by_user(&self, user_id: &str) -> Result<u64, RemoteError> {
            self.inner.count_reviews_by_user(user_id).await
        }
    }

    #[tokio::test]
    async fn failed_writes_leave_the_thread_untouched() {
        let (backend, _ledger, post) = setup().await;
        let repo = Arc::new(ReadOnly {
            inner: backend,
            fail_writes: AtomicBool::new(false),
        });
        let ledger = Arc::new(ReviewLedger::new(repo.clone()));
        let existing = ledger
            .add_review(&post.post_id, "bo", "owner", 5, None)
            .await
            .unwrap();

        let mut thread =
            ReviewThread::open(ledger, signed_in("owner"), post.post_id.clone(), "owner")
                .await
                .unwrap();
        let before = (thread.reviews().to_vec(), thread.stats());

        repo.fail_writes.store(true, Ordering::SeqCst);
        let err = thread.remove(&existing.id).await.unwrap_err();
        assert!(matches!(err, AppError::LedgerUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!((thread.reviews().to_vec(), thread.stats()), before);
    }

    #[tokio::test]
    async fn failed_insert_is_ledger_unavailable() {
        let (backend, _ledger, post) = setup().await;
        let repo = Arc::new(ReadOnly {
            inner: backend,
            fail_writes: AtomicBool::new(true),
        });
        let ledger = Arc::new(ReviewLedger::new(repo));
        let mut thread =
            ReviewThread::open(ledger, signed_in("ada"), post.post_id.clone(), "owner")
                .await
                .unwrap();

        let err = thread.submit(5, None).await.unwrap_err();
        assert!(matches!(err, AppError::LedgerUnavailable(_)));
        assert!(thread.reviews().is_empty());
        assert_eq!(thread.stats(), ReviewStats::default());
    }
}
