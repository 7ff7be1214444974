//! Storage seam for label counters
//!
//! The counter only needs the generic calls a hosted relational backend
//! exposes: exact-match lookup, insert, and update by row id. Stores that can
//! do better advertise an atomic upsert-and-increment primitive.

use crate::error::{LabelError, LabelResult};
use crate::model::Label;
use async_trait::async_trait;

/// Persistence for one label table.
///
/// Implementations must be safe to share across tasks (`Arc<S>`).
#[async_trait]
pub trait LabelStore: Send + Sync {
    /// All rows whose name equals `name` exactly, lowest id first.
    ///
    /// An `Err` means the lookup failed. It must never be reported as an
    /// empty result.
    async fn find_by_name(&self, name: &str) -> LabelResult<Vec<Label>>;

    /// Insert a new row.
    ///
    /// Stores that enforce unique names return `LabelError::DuplicateKey`
    /// when `name` already exists.
    async fn insert(&self, name: &str, count: i64) -> LabelResult<Label>;

    /// Set `count` on row `id`, only if it still holds `expected`.
    ///
    /// Returns `Ok(None)` when the row changed or disappeared since it was
    /// read; nothing is written in that case.
    async fn update_count(&self, id: i64, expected: i64, count: i64)
        -> LabelResult<Option<Label>>;

    /// Whether `increment` is a single atomic server-side operation
    fn has_atomic_increment(&self) -> bool {
        false
    }

    /// Create `name` with `by`, or add `by` to its count, in one step
    async fn increment(&self, name: &str, by: i64) -> LabelResult<Label> {
        let _ = (name, by);
        Err(LabelError::Unsupported("atomic increment"))
    }

    /// Every row, highest count first, ties broken by name
    async fn list(&self) -> LabelResult<Vec<Label>>;
}
