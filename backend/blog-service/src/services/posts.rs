/// Post service - business logic for post authoring and browsing
use crate::db::post_repo;
use crate::error::{AppError, Result};
use crate::models::{
    CreatePostRequest, LabelReconcileResponse, LabelSummary, NewPost, Post, PostPatch,
    UpdatePostRequest,
};
use crate::services::labels::LabelCounters;
use chrono::Utc;
use label_counter::{
    find_oversized_label, join_labels, normalize_label, split_labels, LabelKind, MAX_LABEL_CHARS,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

const PG_UNIQUE_VIOLATION: &str = "23505";

pub struct PostService {
    pool: PgPool,
    labels: Arc<LabelCounters>,
}

impl PostService {
    pub fn new(pool: PgPool, labels: Arc<LabelCounters>) -> Self {
        Self { pool, labels }
    }

    /// Save a new post, then count its categories and tags.
    ///
    /// Label counting happens after the post is stored, on a task that a
    /// dropped request cannot cancel. Its failures are only logged, so they
    /// never fail the save.
    pub async fn create_post(&self, author_id: Uuid, req: CreatePostRequest) -> Result<Post> {
        req.validate()?;

        let categories = split_labels(&req.category);
        if categories.is_empty() {
            return Err(AppError::ValidationError(
                "category must contain at least one non-blank entry".to_string(),
            ));
        }
        let tags = req.tag.as_deref().map(split_labels).unwrap_or_default();
        check_label_lengths(LabelKind::Category, &categories)?;
        check_label_lengths(LabelKind::Tag, &tags)?;

        let slug = match req.slug.as_deref().and_then(normalize_label) {
            Some(slug) => slug.to_string(),
            None => generate_slug(&req.title, Utc::now().timestamp_millis()),
        };

        let new_post = NewPost {
            title: req.title,
            slug,
            content: req.content,
            tag: tag_column(&tags),
            category: join_labels(&categories),
            author_id,
            published: req.published,
            is_public: req.is_public,
        };

        let post = post_repo::insert_post(&self.pool, &new_post)
            .await
            .map_err(slug_conflict)?;

        info!(post_id = post.id, author_id = %author_id, slug = %post.slug, "Post created");

        let counting = self
            .labels
            .spawn_record_post_labels(post.id, categories, tags);
        if let Err(e) = counting.await {
            error!(post_id = post.id, error = %e, "Label counting task failed");
        }

        Ok(post)
    }

    /// Update a post owned by `author_id`. Label counts are left as they are.
    ///
    /// A tag list that is blank after normalization clears the post's tags.
    pub async fn update_post(
        &self,
        author_id: Uuid,
        post_id: i64,
        req: UpdatePostRequest,
    ) -> Result<Post> {
        req.validate()?;

        let tag = match req.tag.as_deref() {
            Some(raw) => {
                let tags = split_labels(raw);
                check_label_lengths(LabelKind::Tag, &tags)?;
                Some(tag_column(&tags))
            }
            None => None,
        };

        let existing = post_repo::find_post_by_id(&self.pool, post_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("post {post_id}")))?;

        if existing.author_id != author_id {
            return Err(AppError::Forbidden(
                "only the author can edit this post".to_string(),
            ));
        }

        let patch = PostPatch {
            title: req.title,
            content: req.content,
            tag,
            slug: req.slug,
            published: req.published,
            is_public: req.is_public,
        };

        let post = post_repo::update_post(&self.pool, post_id, &patch)
            .await
            .map_err(slug_conflict)?
            .ok_or_else(|| AppError::NotFound(format!("post {post_id}")))?;

        debug!(post_id, "Post updated");
        Ok(post)
    }

    pub async fn get_post(&self, post_id: i64) -> Result<Option<Post>> {
        Ok(post_repo::find_post_by_id(&self.pool, post_id).await?)
    }

    pub async fn get_post_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        Ok(post_repo::find_post_by_slug(&self.pool, slug).await?)
    }

    pub async fn posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>> {
        Ok(post_repo::find_posts_by_author(&self.pool, author_id).await?)
    }

    pub async fn list_posts(&self, public_only: bool) -> Result<Vec<Post>> {
        Ok(post_repo::list_posts(&self.pool, public_only).await?)
    }

    pub async fn posts_with_label(&self, kind: LabelKind, name: &str) -> Result<Vec<Post>> {
        let name = normalize_label(name)
            .ok_or_else(|| AppError::BadRequest(format!("{kind} name must not be blank")))?;

        Ok(post_repo::find_posts_with_label(&self.pool, kind, name).await?)
    }

    pub async fn list_labels(&self, kind: LabelKind) -> Result<Vec<LabelSummary>> {
        let labels = self.labels.counter(kind).list().await?;
        Ok(labels.into_iter().map(LabelSummary::from).collect())
    }

    /// Recount both label tables from the lists stored on posts
    pub async fn reconcile_labels(&self) -> Result<LabelReconcileResponse> {
        let tag_lists = post_repo::all_label_lists(&self.pool, LabelKind::Tag).await?;
        let tags = self
            .labels
            .reconcile_from_lists(LabelKind::Tag, &tag_lists)
            .await?;

        let category_lists = post_repo::all_label_lists(&self.pool, LabelKind::Category).await?;
        let categories = self
            .labels
            .reconcile_from_lists(LabelKind::Category, &category_lists)
            .await?;

        Ok(LabelReconcileResponse { tags, categories })
    }
}

/// Build a URL slug from a title.
///
/// Lowercases, turns whitespace runs into `-`, drops anything outside
/// `[a-z0-9-]`, and appends `-<millis>` so repeated titles stay unique.
pub fn generate_slug(title: &str, millis: i64) -> String {
    let mut base = String::with_capacity(title.len());
    let mut in_whitespace = false;

    for ch in title.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() {
            if !in_whitespace {
                base.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' {
            base.push(ch);
        }
    }

    let base = base.trim_matches('-');
    if base.is_empty() {
        format!("post-{millis}")
    } else {
        format!("{base}-{millis}")
    }
}

/// Stored form of a post's tag list; no tags is NULL
fn tag_column(tags: &[String]) -> Option<String> {
    (!tags.is_empty()).then(|| join_labels(tags))
}

/// Reject entries the counter tables cannot hold
fn check_label_lengths(kind: LabelKind, labels: &[String]) -> Result<()> {
    match find_oversized_label(labels) {
        Some(label) => Err(AppError::ValidationError(format!(
            "{kind} '{label}' is longer than {MAX_LABEL_CHARS} characters"
        ))),
        None => Ok(()),
    }
}

fn slug_conflict(err: sqlx::Error) -> AppError {
    let unique_violation = err
        .as_database_error()
        .and_then(|db_err| db_err.code())
        .map(|code| code == PG_UNIQUE_VIOLATION)
        .unwrap_or(false);

    if unique_violation {
        AppError::Conflict("a post with this slug already exists".to_string())
    } else {
        AppError::from(err)
    }
}
