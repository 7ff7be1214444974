/// Data models for blog-service
use chrono::{DateTime, Utc};
use label_counter::{split_labels, Label, ReconcileReport};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Post entity
///
/// `tag` and `category` hold comma-separated label lists. They are the
/// source of truth for which post carries which label.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub tag: Option<String>,
    pub category: String,
    pub author_id: Uuid,
    pub published: bool,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn tags(&self) -> Vec<String> {
        self.tag.as_deref().map(split_labels).unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<String> {
        split_labels(&self.category)
    }
}

/// Create post request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
    /// Comma-separated tags
    pub tag: Option<String>,
    /// Comma-separated categories, at least one
    #[validate(length(min = 1, max = 255))]
    pub category: String,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub is_public: bool,
}

/// Partial post update; label counts are not adjusted
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub content: Option<String>,
    pub tag: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    pub published: Option<bool>,
    pub is_public: Option<bool>,
}

/// Normalized partial update.
///
/// `tag` is `None` to keep the stored list, `Some(None)` to clear it.
#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub tag: Option<Option<String>>,
    pub slug: Option<String>,
    pub published: Option<bool>,
    pub is_public: Option<bool>,
}

/// Normalized row ready for insertion
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub tag: Option<String>,
    pub category: String,
    pub author_id: Uuid,
    pub published: bool,
    pub is_public: bool,
}

/// Label with its usage count, as listed to readers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSummary {
    pub name: String,
    pub count: i64,
}

impl From<Label> for LabelSummary {
    fn from(label: Label) -> Self {
        Self {
            name: label.name,
            count: label.count,
        }
    }
}

/// Result of reconciling both label tables
#[derive(Debug, Clone, Default, Serialize)]
pub struct LabelReconcileResponse {
    pub tags: ReconcileReport,
    pub categories: ReconcileReport,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListPostsQuery {
    #[serde(default)]
    pub public: bool,
}
