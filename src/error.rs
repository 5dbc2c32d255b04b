use crate::backend::RemoteError;

/// Broad category of an [`AppError`], used by callers to pick how the
/// failure is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller is not allowed to do this. Shown immediately, never retried.
    Permission,
    /// The request was rejected before any network call was made.
    Validation,
    /// The target row does not exist (any more).
    NotFound,
    /// The backend failed. Partial effects were not applied; a retry may work.
    Remote,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("You cannot review your own post")]
    SelfReview,

    #[error("You have already reviewed this post")]
    AlreadyReviewed,

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),

    #[error("Too many images: a post holds at most {max}")]
    ImageLimitExceeded { max: usize },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Review ledger unavailable: {0}")]
    LedgerUnavailable(#[source] RemoteError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Unauthenticated | AppError::PermissionDenied(_) | AppError::SelfReview => {
                ErrorKind::Permission
            }
            AppError::AlreadyReviewed
            | AppError::InvalidRating(_)
            | AppError::ImageLimitExceeded { .. }
            | AppError::BadRequest(_) => ErrorKind::Validation,
            AppError::NotFound => ErrorKind::NotFound,
            AppError::LedgerUnavailable(_) | AppError::Remote(_) | AppError::Io(_) => {
                ErrorKind::Remote
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Remote
    }

    /// Message suitable for showing to the person using the app. Remote
    /// failures collapse into a generic retry notice; callers log the
    /// details.
    pub fn user_message(&self) -> String {
        match self {
            AppError::LedgerUnavailable(_) => {
                "Reviews could not be updated. Please try again.".to_string()
            }
            AppError::Remote(_) | AppError::Io(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            AppError::NotFound => "That item no longer exists.".to_string(),
            other => other.to_string(),
        }
    }

    /// Converts a missing row reported by the backend into [`AppError::NotFound`]
    /// and a malformed ID token into [`AppError::BadRequest`].
    pub(crate) fn from_remote(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(_) => AppError::NotFound,
            RemoteError::InvalidToken(reason) => {
                AppError::BadRequest(format!("invalid ID token: {}", reason))
            }
            other => AppError::Remote(other),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
