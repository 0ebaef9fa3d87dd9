use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AnalysisResult;
use crate::error::ValidationError;

/// User annotation on a saved record. The text may carry rich-text markup;
/// it is opaque here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Result<Self, ValidationError> {
        Self::at(text, Utc::now())
    }

    pub fn at(text: impl Into<String>, timestamp: DateTime<Utc>) -> Result<Self, ValidationError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::MissingField("text"));
        }
        Ok(Self { text, timestamp })
    }
}

/// A persisted analysis: image locator, normalized result, ordered comments.
/// `id` is assigned by the store and stable for the record's lifetime;
/// comments are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecord {
    pub id: Uuid,
    pub image_ref: String,
    pub analysis_result: AnalysisResult,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
}

impl SavedRecord {
    pub fn has_comments(&self) -> bool {
        !self.comments.is_empty()
    }
}
