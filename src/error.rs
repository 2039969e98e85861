use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// field name -> human readable message
pub type FieldErrors = BTreeMap<String, String>;

/// Bad alert criteria. Carries every offending field, never just the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid alert criteria: {}", .fields.keys().cloned().collect::<Vec<_>>().join(", "))]
pub struct ValidationError {
    pub fields: FieldErrors,
}

impl ValidationError {
    pub fn names_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("db error: {0}")]
    Db(#[from] mongodb::error::Error),

    #[error("store error: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Missing and foreign alerts are deliberately indistinguishable.
    #[error("alert not found")]
    NotFoundOrForbidden,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single raw listing was dropped from a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationSkip {
    #[error("listing is not a JSON object")]
    NotAnObject,

    #[error("listing has no id")]
    MissingId,

    #[error("listing {0} has no title")]
    MissingTitle(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink rejected job: {status} {body}")]
    Rejected { status: u16, body: String },

    #[error("sink call timed out after {0:?}")]
    Timeout(Duration),

    #[error("sink error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned {status}: {body}")]
    Status { status: u16, body: String },
}
