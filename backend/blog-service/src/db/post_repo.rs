use crate::models::{NewPost, Post, PostPatch};
use label_counter::LabelKind;
use sqlx::PgPool;
use uuid::Uuid;

const POST_COLUMNS: &str = "id, title, slug, content, tag, category, author_id, published, \
                            is_public, created_at, updated_at";

/// Post column holding the label list for `kind`
fn label_column(kind: LabelKind) -> &'static str {
    match kind {
        LabelKind::Tag => "tag",
        LabelKind::Category => "category",
    }
}

/// Insert a post and return the stored row
pub async fn insert_post(pool: &PgPool, post: &NewPost) -> Result<Post, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO posts (title, slug, content, tag, category, author_id, published, is_public)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {POST_COLUMNS}
        "#
    );

    sqlx::query_as::<_, Post>(&sql)
        .bind(&post.title)
        .bind(&post.slug)
        .bind(&post.content)
        .bind(&post.tag)
        .bind(&post.category)
        .bind(post.author_id)
        .bind(post.published)
        .bind(post.is_public)
        .fetch_one(pool)
        .await
}

/// Find a post by ID
pub async fn find_post_by_id(pool: &PgPool, post_id: i64) -> Result<Option<Post>, sqlx::Error> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");

    sqlx::query_as::<_, Post>(&sql)
        .bind(post_id)
        .fetch_optional(pool)
        .await
}

/// Find a post by slug
pub async fn find_post_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Post>, sqlx::Error> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = $1 LIMIT 1");

    sqlx::query_as::<_, Post>(&sql)
        .bind(slug)
        .fetch_optional(pool)
        .await
}

/// All posts by an author, newest first
pub async fn find_posts_by_author(pool: &PgPool, author_id: Uuid) -> Result<Vec<Post>, sqlx::Error> {
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts WHERE author_id = $1 ORDER BY created_at DESC"
    );

    sqlx::query_as::<_, Post>(&sql)
        .bind(author_id)
        .fetch_all(pool)
        .await
}

/// All posts (or only public ones), newest first
pub async fn list_posts(pool: &PgPool, public_only: bool) -> Result<Vec<Post>, sqlx::Error> {
    let sql = format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts
        WHERE ($1 = FALSE OR is_public)
        ORDER BY created_at DESC
        "#
    );

    sqlx::query_as::<_, Post>(&sql)
        .bind(public_only)
        .fetch_all(pool)
        .await
}

/// Posts whose tag or category list contains `name` as a whole entry
pub async fn find_posts_with_label(
    pool: &PgPool,
    kind: LabelKind,
    name: &str,
) -> Result<Vec<Post>, sqlx::Error> {
    let column = label_column(kind);
    let sql = format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts
        WHERE EXISTS (
            SELECT 1
            FROM unnest(string_to_array(COALESCE({column}, ''), ',')) AS entry(name)
            WHERE btrim(entry.name) = $1
        )
        ORDER BY created_at DESC
        "#
    );

    sqlx::query_as::<_, Post>(&sql)
        .bind(name)
        .fetch_all(pool)
        .await
}

/// Apply a partial update; `None` fields keep their value
pub async fn update_post(
    pool: &PgPool,
    post_id: i64,
    patch: &PostPatch,
) -> Result<Option<Post>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE posts
        SET title = COALESCE($2, title),
            content = COALESCE($3, content),
            tag = CASE WHEN $4 THEN $5 ELSE tag END,
            slug = COALESCE($6, slug),
            published = COALESCE($7, published),
            is_public = COALESCE($8, is_public),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {POST_COLUMNS}
        "#
    );

    sqlx::query_as::<_, Post>(&sql)
        .bind(post_id)
        .bind(&patch.title)
        .bind(&patch.content)
        .bind(patch.tag.is_some())
        .bind(patch.tag.clone().flatten())
        .bind(&patch.slug)
        .bind(patch.published)
        .bind(patch.is_public)
        .fetch_optional(pool)
        .await
}

/// Raw label list of every post, for recounting
pub async fn all_label_lists(pool: &PgPool, kind: LabelKind) -> Result<Vec<String>, sqlx::Error> {
    let column = label_column(kind);
    let sql = format!("SELECT {column} FROM posts WHERE {column} IS NOT NULL");

    let rows = sqlx::query_as::<_, (String,)>(&sql).fetch_all(pool).await?;

    Ok(rows.into_iter().map(|(list,)| list).collect())
}
