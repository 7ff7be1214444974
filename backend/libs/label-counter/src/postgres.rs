//! PostgreSQL label store
//!
//! Uses `INSERT ... ON CONFLICT (name) DO UPDATE` so every increment is a
//! single statement. Requires the `UNIQUE (name)` constraint from the
//! service migrations.

use crate::error::{LabelError, LabelResult};
use crate::model::{Label, LabelKind};
use crate::store::LabelStore;
use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

/// SQLx-backed label store for the `tags` or `categories` table
#[derive(Clone)]
pub struct PgLabelStore {
    pool: PgPool,
    kind: LabelKind,
}

impl PgLabelStore {
    pub fn new(pool: PgPool, kind: LabelKind) -> Self {
        Self { pool, kind }
    }

    pub fn kind(&self) -> LabelKind {
        self.kind
    }
}

#[async_trait]
impl LabelStore for PgLabelStore {
    async fn find_by_name(&self, name: &str) -> LabelResult<Vec<Label>> {
        let sql = format!(
            "SELECT id, name, count FROM {} WHERE name = $1 ORDER BY id ASC",
            self.kind.table()
        );

        let rows = sqlx::query_as::<_, Label>(&sql)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn insert(&self, name: &str, count: i64) -> LabelResult<Label> {
        let sql = format!(
            "INSERT INTO {} (name, count) VALUES ($1, $2) RETURNING id, name, count",
            self.kind.table()
        );

        sqlx::query_as::<_, Label>(&sql)
            .bind(name)
            .bind(count)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LabelError::from_sqlx(e, name))
    }

    async fn update_count(
        &self,
        id: i64,
        expected: i64,
        count: i64,
    ) -> LabelResult<Option<Label>> {
        let sql = format!(
            r#"
            UPDATE {}
            SET count = $3
            WHERE id = $1 AND count = $2
            RETURNING id, name, count
            "#,
            self.kind.table()
        );

        let row = sqlx::query_as::<_, Label>(&sql)
            .bind(id)
            .bind(expected)
            .bind(count)
            .fetch_optional(&self.pool)
            .await?;

        if row.is_none() {
            debug!(kind = %self.kind, id, expected, "Conditional label update matched no row");
        }

        Ok(row)
    }

    fn has_atomic_increment(&self) -> bool {
        true
    }

    async fn increment(&self, name: &str, by: i64) -> LabelResult<Label> {
        let table = self.kind.table();
        let sql = format!(
            r#"
            INSERT INTO {table} (name, count)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET count = {table}.count + EXCLUDED.count
            RETURNING id, name, count
            "#
        );

        let label = sqlx::query_as::<_, Label>(&sql)
            .bind(name)
            .bind(by)
            .fetch_one(&self.pool)
            .await?;

        Ok(label)
    }

    async fn list(&self) -> LabelResult<Vec<Label>> {
        let sql = format!(
            "SELECT id, name, count FROM {} ORDER BY count DESC, name ASC",
            self.kind.table()
        );

        let rows = sqlx::query_as::<_, Label>(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list {} labels", self.kind))?;

        Ok(rows)
    }
}
