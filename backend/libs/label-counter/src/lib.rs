//! # Label Counter Library
//!
//! Keeps a usage count per tag or category name. Every time a post is saved
//! with a label, that label's count goes up by exactly one, including when
//! many posts with the same new label are saved at the same time.
//!
//! ## Problem
//!
//! The naive "find the row, then insert or update it" sequence is two
//! separate round trips:
//! - **Lost creates**: two writers both see "not found" and both insert,
//!   splitting the count across duplicate rows
//! - **Lost increments**: two writers both read `count = C` and both write `C + 1`
//! - **Fabricated rows**: a failed lookup treated as "not found" inserts a
//!   duplicate on every transient error
//!
//! ## Solution
//!
//! - Stores with an atomic upsert (`PgLabelStore`) do the whole thing in one
//!   `INSERT ... ON CONFLICT DO UPDATE` statement
//! - Other stores go through a per-name lock, a conditional update
//!   (`WHERE count = <value read>`), and duplicate-key errors retried as updates
//! - Lookups return found, absent, or an error; errors are never read as absent
//! - Every store call has a timeout; a timed-out call is reported, never
//!   blindly retried
//!
//! ## Usage Example
//!
//! ```ignore
//! use label_counter::{LabelCounter, LabelKind, PgLabelStore};
//! use sqlx::PgPool;
//! use std::sync::Arc;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let tags = LabelCounter::new(Arc::new(PgLabelStore::new(pool, LabelKind::Tag)));
//!
//! tags.record_use("rust").await?;
//!
//! if let Err(e) = tags.record_uses(["rust", "async", "rust"]).await {
//!     // Everything except these labels was recorded
//!     for failure in &e.failures {
//!         eprintln!("{} x{}: {}", failure.name, failure.uses, failure.error);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Reconciliation
//!
//! Counts are never lowered when posts are edited or deleted. Call
//! [`LabelCounter::reconcile`] with counts recomputed from the posts to bring
//! the table back in line.

mod counter;
mod error;
pub mod memory;
mod model;
mod postgres;
mod store;

pub use counter::{CounterConfig, LabelCounter, ReconcileOutcome, ReconcileReport};
pub use error::{LabelError, LabelFailure, LabelResult, RecordUsesError, StoreOp};
pub use memory::{Fault, InMemoryLabelStore};
pub use model::{
    find_oversized_label, join_labels, normalize_label, split_labels, tally_labels, Label,
    LabelKind, MAX_LABEL_CHARS,
};
pub use postgres::PgLabelStore;
pub use store::LabelStore;
