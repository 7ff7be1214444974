/// Tag and category handlers
use crate::error::Result;
use crate::middleware::UserId;
use crate::services::{LabelCounters, PostService};
use actix_web::{web, HttpResponse};
use label_counter::LabelKind;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

async fn list_labels(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    kind: LabelKind,
) -> Result<HttpResponse> {
    let service = PostService::new(pool.get_ref().clone(), labels.get_ref().clone());
    Ok(HttpResponse::Ok().json(service.list_labels(kind).await?))
}

async fn posts_with_label(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    kind: LabelKind,
    name: &str,
) -> Result<HttpResponse> {
    let service = PostService::new(pool.get_ref().clone(), labels.get_ref().clone());
    Ok(HttpResponse::Ok().json(service.posts_with_label(kind, name).await?))
}

/// All tags with their counts, most used first
pub async fn list_tags(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
) -> Result<HttpResponse> {
    list_labels(pool, labels, LabelKind::Tag).await
}

/// All categories with their counts, most used first
pub async fn list_categories(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
) -> Result<HttpResponse> {
    list_labels(pool, labels, LabelKind::Category).await
}

pub async fn get_posts_by_tag(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    name: web::Path<String>,
) -> Result<HttpResponse> {
    posts_with_label(pool, labels, LabelKind::Tag, &name).await
}

pub async fn get_posts_by_category(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    name: web::Path<String>,
) -> Result<HttpResponse> {
    posts_with_label(pool, labels, LabelKind::Category, &name).await
}

/// Recount both label tables from stored posts
pub async fn reconcile_labels(
    pool: web::Data<PgPool>,
    labels: web::Data<Arc<LabelCounters>>,
    user_id: UserId,
) -> Result<HttpResponse> {
    info!(requested_by = %user_id.0, "Label reconciliation requested");

    let service = PostService::new(pool.get_ref().clone(), labels.get_ref().clone());
    let report = service.reconcile_labels().await?;

    Ok(HttpResponse::Ok().json(report))
}
