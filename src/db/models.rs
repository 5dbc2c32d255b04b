use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Avatar shown for profiles that never set one.
pub const PLACEHOLDER_AVATAR_URL: &str =
    "https://www.gravatar.com/avatar/00000000000000000000000000000000?d=mp&f=y";

/// Ordered list of public image URLs, stored in the `image_url` column as
/// JSON text (`["https://...", ...]`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageList(Vec<String>);

impl ImageList {
    pub fn new(urls: Vec<String>) -> Self {
        Self(urls)
    }

    pub fn urls(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json_text(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Parse the column text. Blank text is an empty list.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text).map(Self)
    }
}

impl Serialize for ImageList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_json_text())
    }
}

impl<'de> Deserialize<'de> for ImageList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The column is text, but some clients write a real JSON array.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            List(Vec<String>),
        }

        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(Self::default()),
            Some(Repr::List(urls)) => Ok(Self(urls)),
            Some(Repr::Text(text)) => Self::parse(&text).map_err(serde::de::Error::custom),
        }
    }
}

/// Cached result of the `ai-feedback` function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiFeedback {
    pub rating: f64,
    #[serde(default)]
    pub fit_and_proportion: String,
    #[serde(default)]
    pub color_and_pattern: String,
    #[serde(default)]
    pub style_and_occasion: String,
    #[serde(default)]
    pub accessories_and_details: String,
    #[serde(default)]
    pub grooming_and_presentation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_url: ImageList,
    pub occasion: Option<i64>,
    pub ai_feedback: Option<AiFeedback>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPost {
    pub user_id: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub image_url: ImageList,
    pub occasion: Option<i64>,
}

/// Author fields joined from `profiles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub full_name: String,
    pub avatar_url: String,
}

impl Author {
    /// Stand-in for a missing or malformed profile join.
    pub fn unknown() -> Self {
        Self {
            full_name: String::new(),
            avatar_url: PLACEHOLDER_AVATAR_URL.to_string(),
        }
    }

    pub fn new(full_name: Option<String>, avatar_url: Option<String>) -> Self {
        Self {
            full_name: full_name.unwrap_or_default(),
            avatar_url: avatar_url
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| PLACEHOLDER_AVATAR_URL.to_string()),
        }
    }

    /// Normalize a joined `profiles` value, which may arrive as an object, an
    /// array holding one object, or be absent altogether.
    pub fn from_join(value: Option<&serde_json::Value>) -> Self {
        let object = match value {
            Some(serde_json::Value::Array(items)) => items.first(),
            Some(v @ serde_json::Value::Object(_)) => Some(v),
            _ => None,
        };

        match object {
            Some(obj) => Self::new(
                obj.get("full_name")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                obj.get("avatar_url")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            ),
            None => Self::unknown(),
        }
    }
}

/// A post together with its author.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub post: Post,
    pub author: Author,
}

/// Star rating, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn new(value: i64) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&value)
            .then_some(Self(value as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Rating::new(value).ok_or_else(|| format!("rating out of range: {}", value))
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> Self {
        rating.0 as i64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub rating: Rating,
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
    pub author: Author,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReview {
    pub post_id: String,
    pub user_id: String,
    pub rating: Rating,
    pub review: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or("")
    }

    pub fn avatar_or_placeholder(&self) -> &str {
        self.avatar_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(PLACEHOLDER_AVATAR_URL)
    }
}

/// Fields a profile owner may change. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.avatar_url.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occasion {
    pub id: i64,
    pub name: String,
}
