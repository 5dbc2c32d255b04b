//! Plain-text rendering for the command line.

use chrono::{DateTime, Utc};

use crate::db::models::{AiFeedback, Occasion, Profile, Review};
use crate::feed::PostView;
use crate::stats::{ReviewStats, UserStats};

pub fn format_relative_time(dt: &DateTime<Utc>) -> String {
    format_relative_to(dt, Utc::now())
}

fn format_relative_to(dt: &DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    format_date(dt)
}

/// "Jan 15, 2025"
pub fn format_date(dt: &DateTime<Utc>) -> String {
    dt.format("%b %-d, %Y").to_string()
}

/// Relative time for a stored timestamp, or the raw text if it does not parse.
pub fn parse_and_format_time(stored: &str) -> String {
    DateTime::parse_from_rfc3339(stored)
        .map(|dt| format_relative_time(&dt.with_timezone(&Utc)))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(stored, "%Y-%m-%d %H:%M:%S")
                .map(|dt| format_relative_time(&dt.and_utc()))
        })
        .unwrap_or_else(|_| stored.to_string())
}

pub fn stars(rating: u8) -> String {
    let filled = rating.min(5) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}

pub fn review_summary(stats: &ReviewStats) -> String {
    match stats.count {
        0 => "no reviews".to_string(),
        1 => format!("{:.1} (1 review)", stats.average),
        n => format!("{:.1} ({} reviews)", stats.average, n),
    }
}

pub fn render_post(view: &PostView) -> String {
    let post = &view.post;
    let name = if view.author.full_name.is_empty() {
        "Unknown"
    } else {
        view.author.full_name.as_str()
    };
    let mut out = format!(
        "{}  {}{}  {}\n",
        post.post_id,
        name,
        if view.is_mine { " (you)" } else { "" },
        format_relative_time(&post.created_at)
    );
    if let Some(title) = &post.title {
        out.push_str(&format!("  {}\n", title));
    }
    if let Some(content) = &post.content {
        out.push_str(&format!("  {}\n", content));
    }
    for url in post.image_url.urls() {
        out.push_str(&format!("  [img] {}\n", url));
    }
    out.push_str(&format!("  {}\n", review_summary(&view.reviews)));
    out
}

pub fn render_review(review: &Review) -> String {
    let name = if review.author.full_name.is_empty() {
        "Unknown"
    } else {
        review.author.full_name.as_str()
    };
    let mut out = format!(
        "{}  {}  {}  {}",
        review.id,
        stars(review.rating.value()),
        name,
        format_date(&review.created_at)
    );
    if let Some(text) = &review.review {
        out.push_str(&format!("\n  {}", text));
    }
    out
}

pub fn render_profile(profile: &Profile, stats: &UserStats) -> String {
    format!(
        "{}\n  id: {}\n  avatar: {}\n  posts: {}  reviews: {}  xp: {}\n  joined: {}",
        profile.display_name(),
        profile.id,
        profile.avatar_or_placeholder(),
        stats.post_count,
        stats.review_count,
        stats.xp,
        format_date(&profile.created_at)
    )
}

pub fn render_feedback(feedback: &AiFeedback) -> String {
    let sections = [
        ("Fit & proportion", &feedback.fit_and_proportion),
        ("Color & pattern", &feedback.color_and_pattern),
        ("Style & occasion", &feedback.style_and_occasion),
        ("Accessories & details", &feedback.accessories_and_details),
        ("Grooming & presentation", &feedback.grooming_and_presentation),
    ];
    let mut out = format!("Style rating: {:.1}/5", feedback.rating);
    for (heading, body) in sections {
        if !body.is_empty() {
            out.push_str(&format!("\n\n{}\n  {}", heading, body));
        }
    }
    out
}

pub fn render_occasion(occasion: &Occasion) -> String {
    format!("{:>3}  {}", occasion.id, occasion.name)
}
