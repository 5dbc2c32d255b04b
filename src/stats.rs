//! Derived numbers shown next to posts and profiles. Never stored.

use serde::Serialize;

pub const XP_PER_POST: u64 = 10;
pub const XP_PER_REVIEW: u64 = 5;

/// Round to one decimal place, halves away from zero.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Engagement score: 10 per post plus 5 per review.
pub fn experience_points(post_count: u64, review_count: u64) -> u64 {
    post_count * XP_PER_POST + review_count * XP_PER_REVIEW
}

/// Count and rounded mean of a set of ratings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReviewStats {
    pub count: usize,
    pub average: f64,
}

impl ReviewStats {
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = u8>,
    {
        let (count, sum) = ratings
            .into_iter()
            .fold((0usize, 0u64), |(n, s), r| (n + 1, s + r as u64));
        if count == 0 {
            return Self::default();
        }
        Self {
            count,
            average: round_to_tenth(sum as f64 / count as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub post_count: u64,
    pub review_count: u64,
    pub xp: u64,
}

impl UserStats {
    pub fn new(post_count: u64, review_count: u64) -> Self {
        Self {
            post_count,
            review_count,
            xp: experience_points(post_count, review_count),
        }
    }
}
