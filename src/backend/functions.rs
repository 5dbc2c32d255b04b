use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;

use super::rest::{check, RestClient};
use super::{FeedbackFunction, RemoteError};
use crate::db::models::AiFeedback;

pub const AI_FEEDBACK_FUNCTION: &str = "ai-feedback";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FeedbackRequest<'a> {
    image_urls: &'a [String],
}

/// Calls the hosted `ai-feedback` function.
pub struct HostedFeedback {
    client: RestClient,
}

impl HostedFeedback {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedbackFunction for HostedFeedback {
    async fn request_feedback(&self, image_urls: &[String]) -> Result<AiFeedback, RemoteError> {
        let resp = self
            .client
            .request(
                Method::POST,
                &format!("functions/v1/{}", AI_FEEDBACK_FUNCTION),
            )
            .await?
            .json(&FeedbackRequest { image_urls })
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }
}

/// Stand-in when no hosted project is configured.
pub struct NoFeedback;

#[async_trait]
impl FeedbackFunction for NoFeedback {
    async fn request_feedback(&self, _image_urls: &[String]) -> Result<AiFeedback, RemoteError> {
        Err(RemoteError::Unavailable(format!(
            "the {} function needs a configured remote project",
            AI_FEEDBACK_FUNCTION
        )))
    }
}
