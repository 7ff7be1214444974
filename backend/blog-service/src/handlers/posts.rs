/// Post handlers - HTTP endpoints for post operations
use crate::error::Result;
use crate::middleware::UserId;
use crate::models::{CreatePostRequest, ListPostsQuery, UpdatePostRequest};
use crate::services::{LabelCounters, PostService};
use actix_web::{web, HttpResponse};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

fn post_service(pool: &web::Data<PgPool>, labels: &web::Data<Arc<LabelCounters>>) -> PostService {
    PostService::new(pool.get_ref().clone(), labels.get_ref().clone())
}

/// Create a new post and count its labels
pub async fn create_post(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    user_id: UserId,
    req: web::Json<CreatePostRequest>,
) -> Result<HttpResponse> {
    let post = post_service(&pool, &labels)
        .create_post(user_id.0, req.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(post))
}

/// List posts, optionally only the public ones
pub async fn list_posts(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    query: web::Query<ListPostsQuery>,
) -> Result<HttpResponse> {
    let posts = post_service(&pool, &labels).list_posts(query.public).await?;
    Ok(HttpResponse::Ok().json(posts))
}

/// Get a post by ID
pub async fn get_post(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    post_id: web::Path<i64>,
) -> Result<HttpResponse> {
    match post_service(&pool, &labels).get_post(*post_id).await? {
        Some(post) => Ok(HttpResponse::Ok().json(post)),
        None => Ok(HttpResponse::NotFound().finish()),
    }
}

/// Get a post by slug
pub async fn get_post_by_slug(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    slug: web::Path<String>,
) -> Result<HttpResponse> {
    match post_service(&pool, &labels).get_post_by_slug(&slug).await? {
        Some(post) => Ok(HttpResponse::Ok().json(post)),
        None => Ok(HttpResponse::NotFound().finish()),
    }
}

/// Get posts written by a user
pub async fn get_user_posts(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    user_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let posts = post_service(&pool, &labels)
        .posts_by_author(*user_id)
        .await?;
    Ok(HttpResponse::Ok().json(posts))
}

/// Update a post owned by the caller
pub async fn update_post(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    user_id: UserId,
    post_id: web::Path<i64>,
    req: web::Json<UpdatePostRequest>,
) -> Result<HttpResponse> {
    let post = post_service(&pool, &labels)
        .update_post(user_id.0, *post_id, req.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(post))
}
