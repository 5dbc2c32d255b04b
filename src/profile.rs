//! Profile screen: the user's record, engagement numbers and push token.

use std::sync::Arc;

use crate::auth::SessionContext;
use crate::backend::{PostRepository, ProfileRepository, ReviewRepository};
use crate::db::models::{Profile, ProfileUpdate};
use crate::error::{AppError, AppResult};
use crate::stats::UserStats;

pub struct ProfileService {
    profiles: Arc<dyn ProfileRepository>,
    posts: Arc<dyn PostRepository>,
    reviews: Arc<dyn ReviewRepository>,
    session: SessionContext,
}

impl ProfileService {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        posts: Arc<dyn PostRepository>,
        reviews: Arc<dyn ReviewRepository>,
        session: SessionContext,
    ) -> Self {
        Self {
            profiles,
            posts,
            reviews,
            session,
        }
    }

    pub async fn get_profile(&self, user_id: &str) -> AppResult<Profile> {
        self.profiles
            .get_profile(user_id)
            .await
            .map_err(AppError::from_remote)?
            .ok_or(AppError::NotFound)
    }

    /// Post and review counts plus the experience points derived from them.
    pub async fn get_stats(&self, user_id: &str) -> AppResult<UserStats> {
        let (posts, reviews) = tokio::try_join!(
            self.posts.count_posts_by_user(user_id),
            self.reviews.count_reviews_by_user(user_id),
        )?;
        Ok(UserStats::new(posts, reviews))
    }

    /// Update the signed-in user's own display name and avatar.
    pub async fn update_profile(&self, user_id: &str, update: ProfileUpdate) -> AppResult<Profile> {
        self.require_self(user_id, "profiles can only be edited by their owner")?;

        let update = ProfileUpdate {
            full_name: update
                .full_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            avatar_url: update.avatar_url.filter(|u| !u.trim().is_empty()),
        };
        if update.is_empty() {
            return Err(AppError::BadRequest("nothing to update".into()));
        }

        let profile = self
            .profiles
            .update_profile(user_id, &update)
            .await
            .map_err(AppError::from_remote)?;
        tracing::info!("Updated profile {}", user_id);
        Ok(profile)
    }

    /// Store the device push token on the signed-in user's profile.
    pub async fn save_push_token(&self, token: &str) -> AppResult<()> {
        let user = self.session.require_user()?;
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::BadRequest("push token is empty".into()));
        }
        self.profiles
            .save_push_token(&user.id, token)
            .await
            .map_err(AppError::from_remote)?;
        tracing::debug!("Saved push token for {}", user.id);
        Ok(())
    }

    fn require_self(&self, user_id: &str, reason: &str) -> AppResult<()> {
        let user = self.session.require_user()?;
        if user.id != user_id {
            return Err(AppError::PermissionDenied(reason.to_string()));
        }
        Ok(())
    }
}
